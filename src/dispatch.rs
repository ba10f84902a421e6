use std::collections::BTreeMap;
use std::process::Command;

use crate::app::{APP_NAME, abort};
use crate::env::Environment;
use crate::fabfile::{TaskDef, TaskRegistry};
use crate::invocation::Invocation;

/// Print the registry as `Available commands:` with names padded to the
/// longest and each task's first doc line alongside.
pub fn print_command_list(registry: &TaskRegistry) {
    println!("Available commands:");
    println!();
    let width = registry.keys().map(String::len).max().unwrap_or(0);
    for (name, task) in registry {
        let mut line = format!("  {name:<width$}");
        if let Some(first) = task
            .doc
            .as_deref()
            .and_then(|d| d.lines().find(|l| !l.trim().is_empty()))
        {
            line.push_str("  ");
            line.push_str(first.trim());
        }
        println!("{}", line.trim_end());
    }
}

pub fn print_command_list_json(registry: &TaskRegistry) -> i32 {
    match serde_json::to_string_pretty(registry) {
        Ok(s) => {
            println!("{s}");
            0
        }
        Err(e) => {
            eprintln!("{APP_NAME} list: failed to render JSON: {e}");
            1
        }
    }
}

/// Bind an invocation's arguments to the task's parameter names: positional
/// args in declaration order, then keyword args by name (keywords win on
/// overlap, extras are allowed as additional substitution values). Every
/// declared parameter must end up bound.
fn bind_arguments(task: &TaskDef, inv: &Invocation) -> Result<BTreeMap<String, String>, String> {
    if inv.args.len() > task.params.len() {
        return Err(format!(
            "task '{}' takes {} positional argument(s), got {}",
            task.name,
            task.params.len(),
            inv.args.len()
        ));
    }
    let mut bound: BTreeMap<String, String> = task
        .params
        .iter()
        .zip(&inv.args)
        .map(|(p, v)| (p.clone(), v.clone()))
        .collect();
    for (key, value) in &inv.kwargs {
        bound.insert(key.clone(), value.clone());
    }
    for param in &task.params {
        if !bound.contains_key(param) {
            return Err(format!(
                "task '{}' missing argument '{}'",
                task.name, param
            ));
        }
    }
    Ok(bound)
}

fn substitute(line: &str, bound: &BTreeMap<String, String>) -> String {
    let mut out = line.to_string();
    for (key, value) in bound {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

// Ok(true): command succeeded. Ok(false): command ran and failed.
// Err: the command could not be parsed or spawned at all.
fn run_line(line: &str, host: Option<&str>) -> Result<bool, String> {
    let words =
        shell_words::split(line).map_err(|e| format!("cannot parse command '{line}': {e}"))?;
    let Some((program, args)) = words.split_first() else {
        return Ok(true);
    };
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(host) = host {
        cmd.env("FAB_HOST", host);
    }
    let status = cmd
        .status()
        .map_err(|e| format!("failed to run '{program}': {e}"))?;
    Ok(status.success())
}

// Per-invocation overrides supersede the global target list from the
// environment (`hosts` or `host` setting, `;`-separated) entirely.
fn target_hosts(inv: &Invocation, env: &Environment) -> Vec<String> {
    if !inv.hosts.is_empty() {
        return inv.hosts.clone();
    }
    env.first_non_empty(&["hosts", "host"])
        .map(|v| v.split(';').map(|h| h.trim().to_string()).collect())
        .unwrap_or_default()
}

/// Run the parsed invocations in order against the registry. Unknown names,
/// unbindable arguments, and failing task commands are abort paths; a
/// command that cannot be spawned is an unhandled failure (exit 1). With
/// target hosts the body runs once per host, `FAB_HOST` exported.
pub fn dispatch_all(invocations: &[Invocation], registry: &TaskRegistry, env: &Environment) -> i32 {
    for inv in invocations {
        let Some(task) = registry.get(&inv.name) else {
            return abort(&format!("Command not found: {}", inv.name));
        };
        let bound = match bind_arguments(task, inv) {
            Ok(b) => b,
            Err(msg) => return abort(&msg),
        };
        let targets = target_hosts(inv, env);
        let hosts: Vec<Option<&str>> = if targets.is_empty() {
            vec![None]
        } else {
            targets.iter().map(|h| Some(h.as_str())).collect()
        };
        for host in hosts {
            for line in &task.body {
                let rendered = substitute(line, &bound);
                match run_line(&rendered, host) {
                    Ok(true) => {}
                    Ok(false) => {
                        return abort(&format!("task '{}' failed: {rendered}", inv.to_token()));
                    }
                    Err(msg) => {
                        eprintln!("{APP_NAME}: {msg}");
                        return 1;
                    }
                }
            }
        }
    }
    0
}
