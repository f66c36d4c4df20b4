//! Self-deleting first-boot script and the `cmdline.txt` hook that runs it.
//!
//! The script is run once by systemd (`systemd.run=`) on the first boot of the
//! card, removes itself and strips the hook from `cmdline.txt` again. Commands
//! live between two marker lines so that repeated runs of the tool merge into
//! the same script instead of clobbering each other.

use crate::boot::CMDLINE_FILE;

pub const SCRIPT_FILE: &str = "firstrun.sh";
pub const DEFAULT_DEVICE_BOOT_PATH: &str = "/boot/firmware";

const BEGIN: &str = "# rpi-headless: begin";
const END: &str = "# rpi-headless: end";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstRun {
    commands: Vec<String>,
}

impl FirstRun {
    pub fn from_commands<I: IntoIterator<Item = String>>(commands: I) -> Self {
        let mut out = Self::default();
        for c in commands {
            out.push(c);
        }
        out
    }

    /// Commands found in the marked block of an existing script.
    pub fn parse(script: &str) -> Self {
        let mut inside = false;
        let mut commands = Vec::new();
        for line in script.lines().map(str::trim) {
            if line == BEGIN {
                inside = true;
                continue;
            }
            if line == END {
                inside = false;
                continue;
            }
            if inside && !line.is_empty() {
                commands.push(line.to_string());
            }
        }
        Self::from_commands(commands)
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Appends `cmd`, dropping an earlier command for the same slot.
    pub fn push(&mut self, cmd: String) {
        let slot = command_slot(&cmd);
        self.commands.retain(|c| command_slot(c) != slot);
        self.commands.push(cmd);
    }

    pub fn push_service(&mut self, unit: &str, enabled: bool) {
        let verb = if enabled { "enable" } else { "disable" };
        self.push(format!("systemctl {verb} {unit}"));
    }

    /// Earlier commands first, then ours; ours win on conflicts.
    pub fn merged_into(&self, existing: &FirstRun) -> FirstRun {
        let mut out = existing.clone();
        for c in &self.commands {
            out.push(c.clone());
        }
        out
    }

    pub fn render(&self, device_boot_path: &str) -> String {
        let base = device_boot_path.trim_end_matches('/');
        let mut out = String::new();
        out.push_str("#!/bin/bash\n\n");
        out.push_str("set +e\n\n");
        out.push_str(BEGIN);
        out.push('\n');
        for c in &self.commands {
            out.push_str(c);
            out.push('\n');
        }
        out.push_str(END);
        out.push_str("\n\n");
        out.push_str(&format!("rm -f {base}/{SCRIPT_FILE}\n"));
        out.push_str(&format!(
            "sed -i 's| systemd.run.*||g' {base}/{CMDLINE_FILE}\n"
        ));
        out.push_str("exit 0\n");
        out
    }
}

// `systemctl <verb> [flags] <unit>` commands share a slot per unit.
fn command_slot(cmd: &str) -> String {
    let mut words = cmd.split_whitespace();
    if words.next() == Some("systemctl") {
        if let Some(unit) = words.last() {
            return format!("systemctl:{unit}");
        }
    }
    cmd.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn script_device_path(device_boot_path: &str) -> String {
    format!(
        "{}/{SCRIPT_FILE}",
        device_boot_path.trim_end_matches('/')
    )
}

fn is_hook_token(tok: &str) -> bool {
    tok.starts_with("systemd.run=")
        || tok.starts_with("systemd.run_success_action=")
        || tok == "systemd.unit=kernel-command-line.target"
}

/// Rewrites the kernel command line so it runs `script` once on next boot.
///
/// Any previous hook is removed first; the new one goes last because the
/// script's own cleanup cuts everything from ` systemd.run` to the end.
pub fn hook_cmdline(cmdline: &str, script: &str) -> String {
    let mut tokens: Vec<&str> = cmdline
        .split_whitespace()
        .filter(|t| !is_hook_token(t))
        .collect();
    let run = format!("systemd.run={script}");
    tokens.push(&run);
    tokens.push("systemd.run_success_action=reboot");
    tokens.push("systemd.unit=kernel-command-line.target");
    let mut out = tokens.join(" ");
    if cmdline.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Whether `script` carries our marked block.
pub fn is_managed(script: &str) -> bool {
    script.lines().any(|l| l.trim() == BEGIN)
}

/// Script an existing `systemd.run=` hook points at.
pub fn cmdline_run_target(cmdline: &str) -> Option<&str> {
    cmdline
        .split_whitespace()
        .find_map(|t| t.strip_prefix("systemd.run="))
}

pub fn cmdline_runs(cmdline: &str, script: &str) -> bool {
    let want = format!("systemd.run={script}");
    cmdline.split_whitespace().any(|t| t == want)
}
