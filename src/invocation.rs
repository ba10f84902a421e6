use std::collections::BTreeMap;

use crate::env::Environment;

/// One parsed command-line task reference: `name:arg1,key=val,host=h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub name: String,
    pub args: Vec<String>,
    pub kwargs: BTreeMap<String, String>,
    pub hosts: Vec<String>,
}

impl Invocation {
    fn bare(name: &str) -> Self {
        Invocation {
            name: name.to_string(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            hosts: Vec::new(),
        }
    }

    /// Serialize back to command-line token form: positional args in order,
    /// then keyword args, then any host overrides. Re-parsing the result
    /// yields an equivalent record.
    pub fn to_token(&self) -> String {
        let mut parts: Vec<String> = self.args.clone();
        for (key, value) in &self.kwargs {
            parts.push(format!("{key}={value}"));
        }
        if !self.hosts.is_empty() {
            parts.push(format!("hosts={}", self.hosts.join(";")));
        }
        if parts.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, parts.join(","))
        }
    }
}

/// Parse the raw argument tokens into invocation records, in token order.
///
/// Grammar per token: `name[:argspec[,argspec...]]` where an argspec is
/// either a bareword (positional) or `key=value` (keyword). The reserved
/// keys `host` and `hosts` (exact match) become the per-invocation host
/// override instead of keyword arguments; `hosts` splits its value on `;`
/// and a later `host`/`hosts` argspec fully replaces an earlier one.
/// Keyword values are interpolated against the environment. Task names are
/// not validated here; that belongs to the dispatcher.
pub fn parse_invocations(tokens: &[String], env: &Environment) -> Vec<Invocation> {
    let mut invocations = Vec::with_capacity(tokens.len());
    for token in tokens {
        let Some((name, argspecs)) = token.split_once(':') else {
            invocations.push(Invocation::bare(token.trim()));
            continue;
        };
        let mut inv = Invocation::bare(name.trim());
        for argspec in argspecs.split(',') {
            let argspec = argspec.trim();
            if argspec.is_empty() {
                continue;
            }
            let Some((key, value)) = argspec.split_once('=') else {
                inv.args.push(argspec.to_string());
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                "host" => inv.hosts = vec![value.to_string()],
                "hosts" => inv.hosts = value.split(';').map(|h| h.trim().to_string()).collect(),
                _ => {
                    inv.kwargs.insert(key.to_string(), env.interpolate(value));
                }
            }
        }
        invocations.push(inv);
    }
    invocations
}
