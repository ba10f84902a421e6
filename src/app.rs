use std::env as process_env;
use std::path::PathBuf;

use crate::dispatch::{dispatch_all, print_command_list, print_command_list_json};
use crate::env::{Environment, VERSION_KEY};
use crate::fabfile::{find_fabfile, load_fabfile};
use crate::invocation::parse_invocations;
use crate::settings::{load_settings, rc_path};

pub const APP_NAME: &str = "fabrs";
const APP_DESC: &str = "command-line task runner";

fn print_usage() {
    eprintln!(
        "Usage: {APP_NAME} [options] <command>[:arg1,arg2=val2,host=foo,hosts='h1;h2',...] ..."
    );
}

fn print_help() {
    println!("{APP_NAME} - {APP_DESC}");
    println!();
    println!(
        "Usage: {APP_NAME} [options] <command>[:arg1,arg2=val2,host=foo,hosts='h1;h2',...] ..."
    );
    println!();
    println!("Options:");
    println!("  -V, --version        Show program's version number and exit");
    println!("  -l, --list           Print list of possible commands and exit");
    println!("      --json           With --list, print the registry as JSON");
    println!("  -f, --rcfile PATH    Load settings from PATH instead of ~/.fabricrc");
    println!("  -s, --set KEY=VALUE  Override a settings entry (repeatable)");
    println!("  -h, --help           Print this help");
    println!();
    println!("Commands come from the nearest 'fabfile' (or 'Fabfile') found in the");
    println!("current directory or any parent. Keyword values may reference settings");
    println!("with %(key)s interpolation; 'host'/'hosts' keywords set the target host");
    println!("list for that single command.");
}

/// Explicit abort: print the message and have the process exit zero. Only
/// interruptions and unhandled failures exit non-zero.
pub fn abort(message: &str) -> i32 {
    eprintln!("Fatal error: {message}");
    0
}

#[derive(Debug, Default)]
struct CliOptions {
    show_version: bool,
    list_commands: bool,
    list_json: bool,
    show_help: bool,
    rcfile: Option<PathBuf>,
    overrides: Vec<(String, String)>,
    tokens: Vec<String>,
}

fn parse_flags(args: &[String]) -> Result<CliOptions, String> {
    let mut opts = CliOptions::default();
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => opts.show_help = true,
            "-V" | "--version" => opts.show_version = true,
            "-l" | "--list" => opts.list_commands = true,
            "--json" => opts.list_json = true,
            "-f" | "--rcfile" => {
                let Some(path) = args.get(i + 1) else {
                    return Err("option -f/--rcfile requires a path".to_string());
                };
                opts.rcfile = Some(PathBuf::from(path));
                i += 1;
            }
            "-s" | "--set" => {
                let Some(pair) = args.get(i + 1) else {
                    return Err("option -s/--set requires KEY=VALUE".to_string());
                };
                let Some((key, value)) = pair.split_once('=') else {
                    return Err(format!("invalid -s/--set argument '{pair}' (want KEY=VALUE)"));
                };
                opts.overrides
                    .push((key.trim().to_string(), value.trim().to_string()));
                i += 1;
            }
            "--" => {
                opts.tokens.extend(args[i + 1..].iter().cloned());
                break;
            }
            other if other.starts_with('-') && other.len() > 1 => {
                return Err(format!("unknown option '{other}'"));
            }
            token => opts.tokens.push(token.to_string()),
        }
        i += 1;
    }
    Ok(opts)
}

pub fn run() -> i32 {
    let args: Vec<String> = process_env::args().skip(1).collect();
    run_with(&args)
}

pub fn run_with(args: &[String]) -> i32 {
    let opts = match parse_flags(args) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("{APP_NAME}: {msg}");
            print_usage();
            return 2;
        }
    };
    if opts.show_help {
        print_help();
        return 0;
    }

    let mut env = Environment::new();
    if opts.show_version {
        println!("{APP_NAME} {}", env.get(VERSION_KEY).unwrap_or_default());
        return 0;
    }

    // Settings overlay the built-in defaults; -s overrides come last.
    let settings_path = opts.rcfile.clone().or_else(|| rc_path(&env));
    if let Some(path) = settings_path {
        env.merge(load_settings(&path));
    }
    for (key, value) in &opts.overrides {
        env.set(key.clone(), value.clone());
    }

    let Some(fabfile_path) = find_fabfile() else {
        return abort("Couldn't find any fabfiles!");
    };
    let registry = match load_fabfile(&fabfile_path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{APP_NAME}: {e}");
            return 1;
        }
    };
    if registry.is_empty() {
        return abort("Fabfile didn't contain any commands!");
    }

    if opts.list_commands {
        if opts.list_json {
            return print_command_list_json(&registry);
        }
        print_command_list(&registry);
        return 0;
    }

    if opts.tokens.is_empty() {
        eprintln!("{APP_NAME}: no commands specified");
        print_usage();
        return 2;
    }

    let invocations = parse_invocations(&opts.tokens, &env);
    dispatch_all(&invocations, &registry, &env)
}
