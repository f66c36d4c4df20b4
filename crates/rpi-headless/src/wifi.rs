use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

use crate::error::{Error, Result};

pub const WPA_CONF_FILE: &str = "wpa_supplicant.conf";
pub const LIVE_WPA_CONF_PATH: &str = "/etc/wpa_supplicant/wpa_supplicant.conf";

const PSK_ITERATIONS: u32 = 4096;
const PSK_LEN: usize = 32;

/// WPA-PSK key derivation (IEEE 802.11i): PBKDF2-HMAC-SHA1 over the passphrase,
/// salted with the SSID, 4096 rounds, 256-bit output, lower-case hex.
pub fn derive_psk(passphrase: &str, ssid: &[u8]) -> String {
    let mut out = [0u8; PSK_LEN];
    pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), ssid, PSK_ITERATIONS, &mut out);
    hex::encode(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PskMode {
    /// Store the derived 64-hex-digit key; the passphrase never lands on disk.
    #[default]
    Hashed,
    /// Store the passphrase as a quoted string.
    Plain,
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Open,
    Passphrase(String),
    /// Pre-computed 64-hex-digit key.
    RawPsk(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Open => write!(f, "Open"),
            Credential::Passphrase(_) => write!(f, "Passphrase(<redacted>)"),
            Credential::RawPsk(_) => write!(f, "RawPsk(<redacted>)"),
        }
    }
}

impl Credential {
    /// A 64-character hex secret is taken as a raw PSK, anything else as a passphrase.
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.len() == 64 && secret.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Credential::RawPsk(secret.to_ascii_lowercase()));
        }
        let len = secret.len();
        if !(8..=63).contains(&len) {
            return Err(Error::usage(format!(
                "Wi-Fi passphrase must be 8..63 characters (got {len})"
            )));
        }
        if !secret.chars().all(|c| (' '..='~').contains(&c)) {
            return Err(Error::usage(
                "Wi-Fi passphrase may only contain printable ASCII characters",
            ));
        }
        Ok(Credential::Passphrase(secret.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiNetwork {
    ssid: String,
    credential: Credential,
    country: String,
    hidden: bool,
    psk_mode: PskMode,
}

impl WifiNetwork {
    pub fn new(
        ssid: &str,
        credential: Credential,
        country: &str,
        hidden: bool,
        psk_mode: PskMode,
    ) -> Result<Self> {
        if ssid.is_empty() || ssid.len() > 32 {
            return Err(Error::usage(format!(
                "SSID must be 1..32 bytes (got {})",
                ssid.len()
            )));
        }
        let country = country.trim();
        if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::usage(format!(
                "invalid Wi-Fi country '{country}' (expected an ISO 3166 alpha-2 code such as 'GB')"
            )));
        }
        if psk_mode == PskMode::Plain && matches!(credential, Credential::RawPsk(_)) {
            return Err(Error::usage(
                "a 64-hex-digit key cannot be stored as a plain passphrase",
            ));
        }
        Ok(Self {
            ssid: ssid.to_string(),
            credential,
            country: country.to_ascii_uppercase(),
            hidden,
            psk_mode,
        })
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn is_open(&self) -> bool {
        self.credential == Credential::Open
    }

    /// `ssid=` right-hand side: quoted when safe, hex otherwise.
    fn ssid_field(&self) -> String {
        let plain = self
            .ssid
            .chars()
            .all(|c| (' '..='~').contains(&c) && c != '"');
        if plain {
            format!("\"{}\"", self.ssid)
        } else {
            hex::encode(self.ssid.as_bytes())
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("ctrl_interface=DIR=/var/run/wpa_supplicant GROUP=netdev\n");
        out.push_str("update_config=1\n");
        out.push_str(&format!("country={}\n", self.country));
        out.push('\n');
        out.push_str("network={\n");
        out.push_str(&format!("\tssid={}\n", self.ssid_field()));
        if self.hidden {
            out.push_str("\tscan_ssid=1\n");
        }
        match (&self.credential, self.psk_mode) {
            (Credential::Open, _) => out.push_str("\tkey_mgmt=NONE\n"),
            (Credential::RawPsk(psk), _) => out.push_str(&format!("\tpsk={psk}\n")),
            (Credential::Passphrase(p), PskMode::Hashed) => {
                out.push_str(&format!("\tpsk={}\n", derive_psk(p, self.ssid.as_bytes())))
            }
            (Credential::Passphrase(p), PskMode::Plain) => {
                out.push_str(&format!("\tpsk=\"{p}\"\n"))
            }
        }
        out.push_str("}\n");
        out
    }
}

/// SSID and country from an existing `wpa_supplicant.conf` (first network block only).
pub fn summarize_conf(content: &str) -> (Option<String>, Option<String>) {
    let mut ssid = None;
    let mut country = None;
    for line in content.lines().map(str::trim) {
        if let Some(c) = line.strip_prefix("country=") {
            country.get_or_insert_with(|| c.trim().to_string());
        } else if let Some(s) = line.strip_prefix("ssid=") {
            if ssid.is_some() {
                continue;
            }
            let s = s.trim();
            ssid = Some(match s.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
                Some(quoted) => quoted.to_string(),
                None => hex::decode(s)
                    .ok()
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .unwrap_or_else(|| s.to_string()),
            });
        }
    }
    (ssid, country)
}
