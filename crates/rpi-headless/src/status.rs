use std::fmt::Write as _;

use serde::Serialize;
use tracing::warn;

use crate::boot::{BootPartition, Mode};
use crate::error::Result;
use crate::firstrun::{self, FirstRun};
use crate::hdmi::{KEY_FORCE_HOTPLUG, KEY_GROUP, KEY_MODE};
use crate::modules::ssh::SSH_MARKER_FILE;
use crate::patch;
use crate::userconf::{self, USERCONF_FILE};
use crate::util;
use crate::modules::wifi::conf_path;
use crate::wifi;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub boot: String,
    pub ssh_marker: bool,
    pub wifi_conf: String,
    pub first_user: Option<String>,
    pub wifi_ssid: Option<String>,
    pub wifi_country: Option<String>,
    pub hdmi_force_hotplug: Option<String>,
    pub hdmi_group: Option<String>,
    pub hdmi_mode: Option<String>,
    pub firstrun_script: bool,
    pub firstrun_commands: Vec<String>,
    pub cmdline_hooked: bool,
}

/// Reads what is currently configured on the boot partition. Writes nothing.
pub fn collect(boot: &BootPartition, mode: Mode, device_boot_path: &str) -> Result<StatusReport> {
    let wifi_conf = conf_path(boot, mode, None);
    let mut report = StatusReport {
        boot: boot.dir().display().to_string(),
        ssh_marker: boot.file(SSH_MARKER_FILE).is_file(),
        wifi_conf: wifi_conf.display().to_string(),
        ..Default::default()
    };

    if let Some(uc) = util::read_text_opt(&boot.file(USERCONF_FILE))? {
        report.first_user = userconf::user_of(&uc).map(str::to_string);
    }
    // /etc/wpa_supplicant is usually root-only; an unreadable file is reported as unknown.
    let conf = util::read_text_opt(&wifi_conf).unwrap_or_else(|e| {
        warn!(error = %e, "cannot read Wi-Fi config");
        None
    });
    if let Some(conf) = conf {
        let (ssid, country) = wifi::summarize_conf(&conf);
        report.wifi_ssid = ssid;
        report.wifi_country = country;
    }

    let config = util::read_text(&boot.config_txt())?;
    report.hdmi_force_hotplug = patch::active_value(&config, KEY_FORCE_HOTPLUG);
    report.hdmi_group = patch::active_value(&config, KEY_GROUP);
    report.hdmi_mode = patch::active_value(&config, KEY_MODE);

    if let Some(script) = util::read_text_opt(&boot.file(firstrun::SCRIPT_FILE))? {
        report.firstrun_script = true;
        report.firstrun_commands = FirstRun::parse(&script).commands().to_vec();
    }
    let cmdline = util::read_text(&boot.cmdline_txt())?;
    report.cmdline_hooked =
        firstrun::cmdline_runs(&cmdline, &firstrun::script_device_path(device_boot_path));

    Ok(report)
}

fn opt(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("-")
}

impl StatusReport {
    pub fn to_text(&self) -> String {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        let mut s = String::new();
        let _ = writeln!(s, "boot:               {}", self.boot);
        let _ = writeln!(s, "ssh enabled:        {}", yes_no(self.ssh_marker));
        let _ = writeln!(s, "first user:         {}", opt(&self.first_user));
        let _ = writeln!(s, "wifi config:        {}", self.wifi_conf);
        let _ = writeln!(s, "wifi ssid:          {}", opt(&self.wifi_ssid));
        let _ = writeln!(s, "wifi country:       {}", opt(&self.wifi_country));
        let _ = writeln!(s, "hdmi_force_hotplug: {}", opt(&self.hdmi_force_hotplug));
        let _ = writeln!(s, "hdmi_group:         {}", opt(&self.hdmi_group));
        let _ = writeln!(s, "hdmi_mode:          {}", opt(&self.hdmi_mode));
        let _ = writeln!(s, "firstrun.sh:        {}", yes_no(self.firstrun_script));
        for c in &self.firstrun_commands {
            let _ = writeln!(s, "  {c}");
        }
        let _ = writeln!(s, "cmdline hooked:     {}", yes_no(self.cmdline_hooked));
        s
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::Error::msg(format!("json encode error: {e}")))
    }
}
