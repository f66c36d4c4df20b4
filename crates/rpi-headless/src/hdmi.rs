use std::fmt;

use crate::error::{Error, Result};

pub const KEY_FORCE_HOTPLUG: &str = "hdmi_force_hotplug";
pub const KEY_GROUP: &str = "hdmi_group";
pub const KEY_MODE: &str = "hdmi_mode";

/// Highest CEA (TV) mode accepted for `hdmi_group=1`.
pub const CEA_MAX_MODE: u32 = 107;
/// Highest DMT (monitor) mode accepted for `hdmi_group=2`.
pub const DMT_MAX_MODE: u32 = 86;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdmiGroup {
    Cea,
    Dmt,
}

impl HdmiGroup {
    fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(HdmiGroup::Cea),
            2 => Some(HdmiGroup::Dmt),
            _ => None,
        }
    }

    pub fn number(self) -> u32 {
        match self {
            HdmiGroup::Cea => 1,
            HdmiGroup::Dmt => 2,
        }
    }

    pub fn max_mode(self) -> u32 {
        match self {
            HdmiGroup::Cea => CEA_MAX_MODE,
            HdmiGroup::Dmt => DMT_MAX_MODE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Let the firmware pick from EDID (`hdmi_group=0`).
    Auto,
    Fixed { group: HdmiGroup, mode: u32 },
}

impl Resolution {
    /// Accepts `0` or `GROUP/MODE` with both numbers written without leading zeros.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw == "0" {
            return Ok(Resolution::Auto);
        }

        let (g, m) = raw
            .split_once('/')
            .filter(|(g, m)| is_positive_number(g) && is_positive_number(m))
            .ok_or_else(|| {
                Error::usage(format!(
                    "invalid resolution '{raw}' (expected '0' or 'GROUP/MODE', e.g. '2/82')"
                ))
            })?;

        let group = g
            .parse::<u32>()
            .ok()
            .and_then(HdmiGroup::from_number)
            .ok_or_else(|| {
                Error::usage(format!(
                    "invalid HDMI group '{g}' (expected 1 for CEA or 2 for DMT)"
                ))
            })?;
        let mode = m
            .parse::<u32>()
            .ok()
            .filter(|mode| (1..=group.max_mode()).contains(mode))
            .ok_or_else(|| {
                Error::usage(format!(
                    "HDMI mode {m} is out of range for group {} (1..={})",
                    group.number(),
                    group.max_mode()
                ))
            })?;

        Ok(Resolution::Fixed { group, mode })
    }

    /// `config.txt` assignments in the order they are applied. `None` disables the key.
    pub fn assignments(&self) -> Vec<(&'static str, Option<String>)> {
        match self {
            Resolution::Auto => vec![
                (KEY_FORCE_HOTPLUG, None),
                (KEY_GROUP, Some("0".into())),
                (KEY_MODE, None),
            ],
            Resolution::Fixed { group, mode } => vec![
                (KEY_FORCE_HOTPLUG, Some("1".into())),
                (KEY_GROUP, Some(group.number().to_string())),
                (KEY_MODE, Some(mode.to_string())),
            ],
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Auto => write!(f, "0"),
            Resolution::Fixed { group, mode } => write!(f, "{}/{}", group.number(), mode),
        }
    }
}

fn is_positive_number(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some('1'..='9')) && chars.all(|c| c.is_ascii_digit())
}
