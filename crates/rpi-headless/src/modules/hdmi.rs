use tracing::warn;

use crate::config::Settings;
use crate::error::Result;
use crate::executor::ApplyCtx;
use crate::modules::Module;
use crate::patch::PatchOutcome;

pub struct HdmiModule;

impl Module for HdmiModule {
    fn id(&self) -> &'static str {
        "hdmi"
    }

    fn detect(&self, settings: &Settings) -> bool {
        settings.hdmi.is_some()
    }

    fn apply(&self, settings: &Settings, ctx: &mut ApplyCtx) -> Result<()> {
        let Some(resolution) = settings.hdmi else {
            return Ok(());
        };
        let config_txt = ctx.boot().config_txt();
        for (key, value) in resolution.assignments() {
            let outcome = ctx.set_config_value(&config_txt, key, value.as_deref())?;
            if value.is_some() && outcome == PatchOutcome::Untouched {
                warn!(
                    key,
                    path = %config_txt.display(),
                    "no '#{key}=' placeholder found; key left unset"
                );
            }
        }
        Ok(())
    }
}
