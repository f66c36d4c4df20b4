use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "config.txt";
pub const CMDLINE_FILE: &str = "cmdline.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Boot partition of a card mounted on another machine.
    Card,
    /// The boot partition of the Pi we are running on.
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPartition {
    dir: PathBuf,
}

impl BootPartition {
    /// Checks that `dir` looks like a Raspberry Pi boot partition.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::precondition(format!(
                "boot partition {} is not a directory",
                dir.display()
            )));
        }
        let missing: Vec<&str> = [CONFIG_FILE, CMDLINE_FILE]
            .into_iter()
            .filter(|f| !dir.join(f).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(Error::precondition(format!(
                "{} is not a Raspberry Pi boot partition (missing {})",
                dir.display(),
                missing.join(", ")
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn config_txt(&self) -> PathBuf {
        self.file(CONFIG_FILE)
    }

    pub fn cmdline_txt(&self) -> PathBuf {
        self.file(CMDLINE_FILE)
    }

    /// Creates and drops a temp file to prove we can write here.
    pub fn ensure_writable(&self) -> Result<()> {
        tempfile::tempfile_in(&self.dir).map_err(|e| {
            Error::precondition(format!(
                "boot partition {} is not writable: {e}",
                self.dir.display()
            ))
        })?;
        Ok(())
    }
}

/// Where we look when no boot partition was named.
pub fn candidates(mode: Mode) -> Vec<PathBuf> {
    match mode {
        Mode::Live => vec![PathBuf::from("/boot/firmware"), PathBuf::from("/boot")],
        Mode::Card => {
            let mut out = Vec::new();
            if let Some(user) = std::env::var_os("USER").filter(|u| !u.is_empty()) {
                for base in ["/media", "/run/media"] {
                    let base = Path::new(base).join(&user);
                    out.push(base.join("bootfs"));
                    out.push(base.join("boot"));
                }
            }
            out.push(PathBuf::from("/Volumes/bootfs"));
            out.push(PathBuf::from("/Volumes/boot"));
            out
        }
    }
}

/// Resolves the boot partition: `explicit` when given, otherwise the first recognized candidate.
pub fn locate(explicit: Option<&Path>, mode: Mode) -> Result<BootPartition> {
    if let Some(dir) = explicit {
        return BootPartition::open(dir);
    }
    let probed = candidates(mode);
    for dir in &probed {
        match BootPartition::open(dir) {
            Ok(bp) => {
                debug!(path = %dir.display(), "found boot partition");
                return Ok(bp);
            }
            Err(e) => debug!(path = %dir.display(), reason = %e, "skipping candidate"),
        }
    }
    let listed = probed
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::precondition(format!(
        "no Raspberry Pi boot partition found (looked in: {listed}); pass --boot <DIR>"
    )))
}

/// Toggling services on a live system needs root.
#[cfg(unix)]
pub fn require_root() -> Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        return Err(Error::precondition(
            "changing a running system requires root (try sudo)",
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn require_root() -> Result<()> {
    Err(Error::precondition(
        "live mode is only supported on a Raspberry Pi",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    #[test]
    fn recognizes_dir_with_config_and_cmdline() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("config.txt"), "").expect("config");
        fs::write(tmp.path().join("cmdline.txt"), "").expect("cmdline");
        let bp = locate(Some(tmp.path()), Mode::Card).expect("boot partition");
        assert_eq!(bp.config_txt(), tmp.path().join("config.txt"));
        bp.ensure_writable().expect("writable");
    }

    #[test]
    fn rejects_dir_missing_cmdline() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("config.txt"), "").expect("config");
        let err = BootPartition::open(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().contains("cmdline.txt"), "{err}");
    }

    #[test]
    fn live_candidates_prefer_firmware_mount() {
        assert_eq!(
            candidates(Mode::Live),
            vec![PathBuf::from("/boot/firmware"), PathBuf::from("/boot")]
        );
    }
}
