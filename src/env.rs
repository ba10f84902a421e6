use std::collections::BTreeMap;

pub const SETTINGS_FILE_KEY: &str = "settings_file";
pub const VERSION_KEY: &str = "version";

/// Shared configuration mapping, seeded with built-in defaults and overlaid
/// with the user settings file. Constructed once in `app::run` and passed by
/// reference to everything that needs value interpolation.
#[derive(Debug, Clone)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(VERSION_KEY.to_string(), env!("CARGO_PKG_VERSION").to_string());
        vars.insert(SETTINGS_FILE_KEY.to_string(), ".fabricrc".to_string());
        Environment { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Value of the first key with a non-empty entry, if any.
    pub fn first_non_empty(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.is_empty())
    }

    pub fn merge(&mut self, mapping: BTreeMap<String, String>) {
        self.vars.extend(mapping);
    }

    /// `%`-style mapping substitution: `%(key)s` is replaced with the entry
    /// for `key`, `%%` with a literal percent. Unknown keys and stray `%`
    /// sequences are left verbatim; interpolation never fails.
    pub fn interpolate(&self, template: &str) -> String {
        let chars: Vec<char> = template.chars().collect();
        let mut out = String::with_capacity(template.len());
        let mut i = 0;
        while i < chars.len() {
            if chars[i] != '%' {
                out.push(chars[i]);
                i += 1;
                continue;
            }
            match chars.get(i + 1) {
                Some('%') => {
                    out.push('%');
                    i += 2;
                }
                Some('(') => {
                    let rest = &chars[i + 2..];
                    match rest.iter().position(|&c| c == ')') {
                        // A conversion char must follow the closing paren.
                        Some(close) if i + close + 3 < chars.len() => {
                            let key: String = rest[..close].iter().collect();
                            let end = i + close + 4;
                            match self.get(key.trim()) {
                                Some(v) => out.push_str(v),
                                None => out.extend(&chars[i..end]),
                            }
                            i = end;
                        }
                        _ => {
                            out.push('%');
                            i += 1;
                        }
                    }
                }
                _ => {
                    out.push('%');
                    i += 1;
                }
            }
        }
        out
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_defaults_present() {
        let env = Environment::new();
        assert_eq!(env.get(SETTINGS_FILE_KEY), Some(".fabricrc"));
        assert_eq!(env.get(VERSION_KEY), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn first_non_empty_skips_blank_entries() {
        let mut env = Environment::new();
        env.set("a", "");
        env.set("b", "beta");
        assert_eq!(env.first_non_empty(&["missing", "a", "b"]), Some("beta"));
        assert_eq!(env.first_non_empty(&["missing", "a"]), None);
    }

    #[test]
    fn interpolate_substitutes_known_keys() {
        let mut env = Environment::new();
        env.set("user", "deploy");
        assert_eq!(env.interpolate("run as %(user)s"), "run as deploy");
        assert_eq!(env.interpolate("100%% done"), "100% done");
    }

    #[test]
    fn interpolate_leaves_unknown_and_malformed_verbatim() {
        let env = Environment::new();
        assert_eq!(env.interpolate("%(missing)s"), "%(missing)s");
        assert_eq!(env.interpolate("50% off"), "50% off");
        assert_eq!(env.interpolate("%(unterminated"), "%(unterminated");
    }

    #[test]
    fn merge_overrides_defaults() {
        let mut env = Environment::new();
        let mut m = BTreeMap::new();
        m.insert(SETTINGS_FILE_KEY.to_string(), ".otherrc".to_string());
        env.merge(m);
        assert_eq!(env.get(SETTINGS_FILE_KEY), Some(".otherrc"));
    }
}
