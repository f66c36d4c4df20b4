use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use toml::Value;

use crate::error::{Error, Result};

pub mod settings;

pub use settings::{
    BootSection, FirstUser, HdmiSection, Profile, ProfileOptions, Settings, SshSection,
    SshSettings, VncSection, VncSettings, WifiSection, WifiSettings, validate_device_boot_path,
};

/// Top-level keys a profile may carry once `extends`/`imports` are resolved.
const PROFILE_KEYS: &[&str] = &["live", "dry_run", "boot", "wifi", "ssh", "vnc", "hdmi"];

#[derive(Debug, Clone)]
pub struct ProfileDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl ProfileDoc {
    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }

        let mut cur = &self.value;
        for seg in path.split('.') {
            let tbl = cur.as_table()?;
            cur = tbl.get(seg)?;
        }
        Some(cur)
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let parsed = v
            .clone()
            .try_into()
            .map_err(|e| Error::usage(format!("invalid profile value at '{}': {e}", path)))?;
        Ok(Some(parsed))
    }

    fn check_top_level(&self) -> Result<()> {
        let Some(tbl) = self.value.as_table() else {
            return Ok(());
        };
        for key in tbl.keys() {
            if !PROFILE_KEYS.contains(&key.as_str()) {
                return Err(Error::usage(format!(
                    "unknown profile key '{}' in {} (known: {})",
                    key,
                    self.path.display(),
                    PROFILE_KEYS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn take_imports(path: &Path, value: &mut Value) -> Result<Vec<String>> {
    let Some(tbl) = value.as_table_mut() else {
        return Ok(Vec::new());
    };
    let Some(raw) = tbl.remove("imports") else {
        return Ok(Vec::new());
    };
    let Some(arr) = raw.as_array() else {
        return Err(Error::usage(format!(
            "'imports' in {} must be an array of paths",
            path.display()
        )));
    };
    let mut out = Vec::new();
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(Error::usage(format!(
                "invalid imports entry in {} (expected string)",
                path.display()
            )));
        };
        let s = s.trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

// Rebases `*_file` / `path` strings onto the directory of the file that wrote
// them, so a value keeps pointing at the same file after being merged into a
// profile that lives elsewhere.
fn rebase_paths(file: &Path, value: &mut Value) {
    let Value::Table(tbl) = value else {
        return;
    };
    for (k, v) in tbl.iter_mut() {
        if v.is_table() {
            rebase_paths(file, v);
            continue;
        }
        if !(k.ends_with("_file") || k == "path") {
            continue;
        }
        if let Value::String(s) = v {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                *s = resolve_ref_path(file, trimmed).display().to_string();
            }
        }
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::usage(format!(
            "profile import cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path).map_err(|e| {
        Error::precondition(format!("failed to read profile {}: {e}", path.display()))
    })?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::usage(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(tbl) = value.as_table_mut() {
        if let Some(ext) = tbl.remove("extends") {
            let Some(ext) = ext.as_str() else {
                return Err(Error::usage(format!(
                    "'extends' in {} must be a path",
                    path.display()
                )));
            };
            out = load_value_inner(&resolve_ref_path(path, ext.trim()), stack)?;
        }
    }

    for imp in take_imports(path, &mut value)? {
        let loaded = load_value_inner(&resolve_ref_path(path, &imp), stack)?;
        merge_values(&mut out, loaded);
    }

    rebase_paths(path, &mut value);
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

/// Loads a profile: `extends` parent first, then `imports` in order, then the file's own keys.
pub fn load(path: &Path) -> Result<ProfileDoc> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    let doc = ProfileDoc {
        path: path.to_path_buf(),
        value,
    };
    doc.check_top_level()?;
    Ok(doc)
}
