use std::collections::BTreeMap;
use std::env as process_env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::env::{Environment, SETTINGS_FILE_KEY};

pub fn home_dir() -> Option<PathBuf> {
    process_env::var_os("HOME").map(PathBuf::from)
}

/// Platform-resolved path of the user settings file, `$HOME/<settings_file>`.
pub fn rc_path(env: &Environment) -> Option<PathBuf> {
    let name = env.get(SETTINGS_FILE_KEY)?;
    home_dir().map(|h| h.join(name))
}

/// Read `key=value` pairs from the given file. An absent file is not an
/// error and yields an empty mapping. Blank lines and lines whose first
/// non-whitespace character is `#` are skipped; remaining lines split at the
/// first `=` (a line without one becomes a key with an empty value). Later
/// duplicates win.
pub fn load_settings(path: &Path) -> BTreeMap<String, String> {
    let mut settings = BTreeMap::new();
    let Ok(content) = fs::read_to_string(path) else {
        return settings;
    };
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let (key, value) = match trimmed.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (trimmed, ""),
        };
        if key.is_empty() {
            continue;
        }
        settings.insert(key.to_string(), value.to_string());
    }
    settings
}
