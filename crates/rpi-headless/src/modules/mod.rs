use crate::config::Settings;
use crate::error::Result;
use crate::executor::ApplyCtx;

pub mod hdmi;
pub mod ssh;
pub mod vnc;
pub mod wifi;

pub trait Module {
    fn id(&self) -> &'static str;
    fn detect(&self, settings: &Settings) -> bool;
    fn apply(&self, settings: &Settings, ctx: &mut ApplyCtx) -> Result<()>;
}

/// Modules in the order they run. `config.txt` goes first so a bad boot
/// partition fails before anything else is written.
pub fn builtin_modules() -> Vec<Box<dyn Module>> {
    vec![
        Box::new(hdmi::HdmiModule),
        Box::new(wifi::WifiModule),
        Box::new(ssh::SshModule),
        Box::new(vnc::VncModule),
    ]
}
