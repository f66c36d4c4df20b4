use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::boot::Mode;
use crate::config::ProfileDoc;
use crate::error::{Error, Result};
use crate::firstrun::DEFAULT_DEVICE_BOOT_PATH;
use crate::hdmi::Resolution;
use crate::secret;
use crate::userconf;
use crate::wifi::{Credential, PskMode, WifiNetwork};

fn default_true() -> bool {
    true
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootSection {
    pub path: Option<String>,
    pub device_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WifiSection {
    pub ssid: String,
    pub password_file: Option<String>,
    pub open: bool,
    pub country: String,
    pub hidden: bool,
    pub plain_psk: bool,
    /// Where the config goes on a live system.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub user: Option<String>,
    pub password_file: Option<String>,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            enabled: true,
            user: None,
            password_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VncSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for VncSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HdmiSection {
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiSettings {
    pub network: WifiNetwork,
    pub live_path: Option<PathBuf>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct FirstUser {
    pub name: String,
    password: String,
}

impl FirstUser {
    pub fn new(name: &str, password: String) -> Result<Self> {
        userconf::validate_user_name(name)?;
        if password.is_empty() {
            return Err(Error::usage("user password must not be empty"));
        }
        Ok(Self {
            name: name.to_string(),
            password,
        })
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for FirstUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirstUser")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSettings {
    pub enabled: bool,
    pub user: Option<FirstUser>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VncSettings {
    pub enabled: bool,
}

/// Everything the modules need, validated up front. Nothing here changes once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub wifi: Option<WifiSettings>,
    pub ssh: Option<SshSettings>,
    pub vnc: Option<VncSettings>,
    pub hdmi: Option<Resolution>,
}

impl Settings {
    pub fn is_empty(&self) -> bool {
        self.wifi.is_none() && self.ssh.is_none() && self.vnc.is_none() && self.hdmi.is_none()
    }

    /// Rejects settings the target cannot take. Runs before anything is written.
    pub fn check_mode(&self, mode: Mode) -> Result<()> {
        if mode == Mode::Live && self.ssh.as_ref().is_some_and(|s| s.user.is_some()) {
            return Err(Error::precondition(
                "creating the first user is only supported on a boot partition (userconf.txt)",
            ));
        }
        Ok(())
    }

    /// Whether applying in `mode` queues commands for the first-boot script.
    pub fn queues_first_boot(&self, mode: Mode) -> bool {
        mode == Mode::Card && self.vnc.is_some()
    }
}

impl WifiSection {
    pub fn into_settings(self) -> Result<WifiSettings> {
        let ssid = self.ssid.as_str();
        if ssid.is_empty() {
            return Err(Error::usage("wifi.ssid is required"));
        }
        if self.country.trim().is_empty() {
            return Err(Error::usage("wifi.country is required"));
        }
        let password_file = non_empty(self.password_file.as_deref());
        let credential = match (self.open, password_file) {
            (true, Some(_)) => {
                return Err(Error::usage(
                    "wifi.open and wifi.password_file are mutually exclusive",
                ));
            }
            (true, None) => Credential::Open,
            (false, file) => {
                let secret = secret::obtain_secret(
                    file.map(Path::new),
                    &format!("Wi-Fi passphrase for '{ssid}'"),
                )?;
                Credential::from_secret(&secret)?
            }
        };
        let psk_mode = if self.plain_psk {
            PskMode::Plain
        } else {
            PskMode::Hashed
        };
        let network = WifiNetwork::new(ssid, credential, &self.country, self.hidden, psk_mode)?;
        Ok(WifiSettings {
            network,
            live_path: non_empty(self.path.as_deref()).map(PathBuf::from),
        })
    }
}

impl SshSection {
    pub fn into_settings(self) -> Result<SshSettings> {
        let user = match non_empty(self.user.as_deref()) {
            Some(name) => {
                if !self.enabled {
                    return Err(Error::usage("ssh.user requires SSH to be enabled"));
                }
                userconf::validate_user_name(name)?;
                let password = secret::obtain_secret(
                    non_empty(self.password_file.as_deref()).map(Path::new),
                    &format!("password for user '{name}'"),
                )?;
                Some(FirstUser::new(name, password)?)
            }
            None => {
                if non_empty(self.password_file.as_deref()).is_some() {
                    return Err(Error::usage("ssh.password_file requires ssh.user"));
                }
                None
            }
        };
        Ok(SshSettings {
            enabled: self.enabled,
            user,
        })
    }
}

impl VncSection {
    pub fn into_settings(self) -> VncSettings {
        VncSettings {
            enabled: self.enabled,
        }
    }
}

impl HdmiSection {
    pub fn into_settings(self) -> Result<Resolution> {
        Resolution::parse(&self.resolution)
    }
}

/// Where and how to apply, as opposed to what to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileOptions {
    pub boot: Option<PathBuf>,
    pub mode: Mode,
    pub device_boot_path: String,
    pub dry_run: bool,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            boot: None,
            mode: Mode::Card,
            device_boot_path: DEFAULT_DEVICE_BOOT_PATH.into(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Profile {
    pub options: ProfileOptions,
    pub settings: Settings,
}

impl Profile {
    pub fn from_doc(doc: &ProfileDoc) -> Result<Self> {
        let live = doc
            .deserialize_path::<bool>("live")?
            .unwrap_or(false);
        let dry_run = doc
            .deserialize_path::<bool>("dry_run")?
            .unwrap_or(false);
        let boot: BootSection = doc.deserialize_path("boot")?.unwrap_or_default();

        let options = ProfileOptions {
            boot: non_empty(boot.path.as_deref()).map(PathBuf::from),
            mode: if live { Mode::Live } else { Mode::Card },
            device_boot_path: non_empty(boot.device_path.as_deref())
                .unwrap_or(DEFAULT_DEVICE_BOOT_PATH)
                .to_string(),
            dry_run,
        };
        validate_device_boot_path(&options.device_boot_path)?;

        let hdmi = doc
            .deserialize_path::<HdmiSection>("hdmi")?
            .map(HdmiSection::into_settings)
            .transpose()?;
        let wifi = doc
            .deserialize_path::<WifiSection>("wifi")?
            .map(WifiSection::into_settings)
            .transpose()?;
        let ssh = doc
            .deserialize_path::<SshSection>("ssh")?
            .map(SshSection::into_settings)
            .transpose()?;
        let vnc = doc
            .deserialize_path::<VncSection>("vnc")?
            .map(VncSection::into_settings);

        let settings = Settings {
            wifi,
            ssh,
            vnc,
            hdmi,
        };
        if settings.is_empty() {
            return Err(Error::usage(format!(
                "profile {} configures nothing (add [wifi], [ssh], [vnc] or [hdmi])",
                doc.path.display()
            )));
        }
        Ok(Self { options, settings })
    }
}

/// The boot mount as seen from the Pi itself; it ends up inside a shell script.
pub fn validate_device_boot_path(p: &str) -> Result<()> {
    let ok = p.starts_with('/')
        && p
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.'));
    if !ok {
        return Err(Error::usage(format!(
            "invalid device boot path '{p}' (expected an absolute path like /boot/firmware)"
        )));
    }
    Ok(())
}
