use std::path::{Path, PathBuf};

use tracing::info;

use crate::boot::{BootPartition, Mode};
use crate::config::Settings;
use crate::error::Result;
use crate::executor::ApplyCtx;
use crate::log_sanitize::sanitize_log_value;
use crate::modules::Module;
use crate::wifi::{LIVE_WPA_CONF_PATH, WPA_CONF_FILE};

/// Where the Wi-Fi config lives: on the card the OS moves it into /etc on first boot.
pub fn conf_path(boot: &BootPartition, mode: Mode, live_path: Option<&Path>) -> PathBuf {
    match mode {
        Mode::Card => boot.file(WPA_CONF_FILE),
        Mode::Live => live_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(LIVE_WPA_CONF_PATH)),
    }
}

pub struct WifiModule;

impl Module for WifiModule {
    fn id(&self) -> &'static str {
        "wifi"
    }

    fn detect(&self, settings: &Settings) -> bool {
        settings.wifi.is_some()
    }

    fn apply(&self, settings: &Settings, ctx: &mut ApplyCtx) -> Result<()> {
        let Some(wifi) = settings.wifi.as_ref() else {
            return Ok(());
        };
        let dst = conf_path(ctx.boot(), ctx.mode(), wifi.live_path.as_deref());
        info!(
            ssid = %sanitize_log_value(wifi.network.ssid()),
            country = wifi.network.country(),
            open = wifi.network.is_open(),
            "configuring Wi-Fi"
        );
        ctx.write_file(&dst, &wifi.network.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conf_path_follows_mode() {
        let tmp = tempfile::tempdir().expect("tempdir");
        std::fs::write(tmp.path().join("config.txt"), "").expect("config");
        std::fs::write(tmp.path().join("cmdline.txt"), "").expect("cmdline");
        let bp = BootPartition::open(tmp.path()).expect("boot");

        assert_eq!(conf_path(&bp, Mode::Card, None), tmp.path().join(WPA_CONF_FILE));
        assert_eq!(
            conf_path(&bp, Mode::Live, None),
            PathBuf::from(LIVE_WPA_CONF_PATH)
        );
        assert_eq!(
            conf_path(&bp, Mode::Live, Some(Path::new("/tmp/wpa.conf"))),
            PathBuf::from("/tmp/wpa.conf")
        );
    }
}
