use crate::boot::Mode;
use crate::config::Settings;
use crate::error::Result;
use crate::executor::ApplyCtx;
use crate::modules::Module;
use crate::userconf::{self, USERCONF_FILE};

pub const SSH_MARKER_FILE: &str = "ssh";
pub const SSH_UNIT: &str = "ssh.service";

pub struct SshModule;

impl Module for SshModule {
    fn id(&self) -> &'static str {
        "ssh"
    }

    fn detect(&self, settings: &Settings) -> bool {
        settings.ssh.is_some()
    }

    fn apply(&self, settings: &Settings, ctx: &mut ApplyCtx) -> Result<()> {
        let Some(ssh) = settings.ssh.as_ref() else {
            return Ok(());
        };
        match ctx.mode() {
            Mode::Live => {
                settings.check_mode(Mode::Live)?;
                ctx.set_service(SSH_UNIT, ssh.enabled)
            }
            Mode::Card => {
                let marker = ctx.boot().file(SSH_MARKER_FILE);
                if ssh.enabled {
                    ctx.touch(&marker)?;
                } else {
                    ctx.remove(&marker)?;
                }
                if let Some(user) = &ssh.user {
                    let body = userconf::render(&user.name, user.password())?;
                    let dst = ctx.boot().file(USERCONF_FILE);
                    ctx.write_file(&dst, &body)?;
                }
                Ok(())
            }
        }
    }
}
