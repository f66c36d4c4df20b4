use crate::config::Settings;
use crate::error::Result;
use crate::executor::ApplyCtx;
use crate::modules::Module;

pub const VNC_UNIT: &str = "vncserver-x11-serviced.service";

pub struct VncModule;

impl Module for VncModule {
    fn id(&self) -> &'static str {
        "vnc"
    }

    fn detect(&self, settings: &Settings) -> bool {
        settings.vnc.is_some()
    }

    fn apply(&self, settings: &Settings, ctx: &mut ApplyCtx) -> Result<()> {
        let Some(vnc) = settings.vnc else {
            return Ok(());
        };
        ctx.set_service(VNC_UNIT, vnc.enabled)
    }
}
