use serde::Serialize;
use std::collections::BTreeMap;
use std::env as process_env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::error::{FabError, FabResult};

// Lowercase first: within a directory the lowercase name wins.
const FABFILE_NAMES: [&str; 2] = ["fabfile", "Fabfile"];

/// One named task from a fabfile: parameter names in declaration order and
/// the shell command lines of the body. `{param}` placeholders in body lines
/// are bound at dispatch time.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDef {
    pub name: String,
    pub params: Vec<String>,
    pub doc: Option<String>,
    pub body: Vec<String>,
}

pub type TaskRegistry = BTreeMap<String, TaskDef>;

/// Locate a fabfile in the current directory or its parents.
pub fn find_fabfile() -> Option<PathBuf> {
    let cwd = process_env::current_dir().ok()?;
    find_fabfile_from(&cwd)
}

/// Walk from `start` up to the filesystem root, probing the candidate names
/// at each level. The shallowest match wins; no caching, never errors.
pub fn find_fabfile_from(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        for name in FABFILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn include_search_path() -> &'static Mutex<Vec<PathBuf>> {
    static STACK: OnceLock<Mutex<Vec<PathBuf>>> = OnceLock::new();
    STACK.get_or_init(|| Mutex::new(Vec::new()))
}

/// Scoped entry on the include search path: pushed while a fabfile is being
/// loaded, removed again on every exit path.
struct SearchPathGuard {
    added: Option<PathBuf>,
}

impl SearchPathGuard {
    fn push(dir: &Path) -> Self {
        let mut added = None;
        if let Ok(mut stack) = include_search_path().lock()
            && !stack.iter().any(|p| p == dir)
        {
            stack.push(dir.to_path_buf());
            added = Some(dir.to_path_buf());
        }
        SearchPathGuard { added }
    }
}

impl Drop for SearchPathGuard {
    fn drop(&mut self) {
        if let Some(dir) = self.added.take()
            && let Ok(mut stack) = include_search_path().lock()
            && let Some(pos) = stack.iter().rposition(|p| p == &dir)
        {
            stack.remove(pos);
        }
    }
}

fn resolve_include(operand: &str) -> Option<PathBuf> {
    let direct = Path::new(operand);
    if direct.is_absolute() {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    if let Ok(stack) = include_search_path().lock() {
        for dir in stack.iter().rev() {
            let candidate = dir.join(operand);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    direct.is_file().then(|| direct.to_path_buf())
}

/// Load a fabfile into a task registry.
///
/// Line format: `# comment` lines immediately above a header become the
/// task's doc; a header is `name [param...]:`; indented lines form the body;
/// `include <file>` loads another fabfile through the search path, later
/// definitions overriding earlier ones. Parse failures are fatal and surface
/// as [`FabError::Fabfile`]; re-loading the same path re-parses from scratch.
pub fn load_fabfile(path: &Path) -> FabResult<TaskRegistry> {
    let mut registry = TaskRegistry::new();
    let mut active = Vec::new();
    load_into(path, &mut registry, &mut active)?;
    Ok(registry)
}

fn load_into(path: &Path, registry: &mut TaskRegistry, active: &mut Vec<PathBuf>) -> FabResult<()> {
    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if active.contains(&canonical) {
        return Err(FabError::fabfile(
            path,
            0,
            format!("include cycle through {}", canonical.display()),
        ));
    }
    let content = fs::read_to_string(path)
        .map_err(|e| FabError::io(format!("cannot read {}", path.display()), e))?;
    let dir = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    // Held for the whole parse so nested includes resolve relative to this
    // file; dropped on success and on error alike.
    let _guard = SearchPathGuard::push(&dir);
    active.push(canonical);
    let result = parse_into(path, &content, registry, active);
    active.pop();
    result
}

fn parse_into(
    path: &Path,
    content: &str,
    registry: &mut TaskRegistry,
    active: &mut Vec<PathBuf>,
) -> FabResult<()> {
    let mut pending_doc: Vec<String> = Vec::new();
    let mut current: Option<TaskDef> = None;

    for (idx, raw) in content.lines().enumerate() {
        let lineno = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            pending_doc.clear();
            continue;
        }
        let indented = raw.starts_with(' ') || raw.starts_with('\t');
        if indented {
            if trimmed.starts_with('#') {
                continue;
            }
            let Some(task) = current.as_mut() else {
                return Err(FabError::fabfile(
                    path,
                    lineno,
                    format!("indented line outside a task: '{trimmed}'"),
                ));
            };
            task.body.push(trimmed.to_string());
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            pending_doc.push(comment.trim().to_string());
            continue;
        }
        if let Some(operand) = trimmed.strip_prefix("include ") {
            flush(registry, &mut current);
            pending_doc.clear();
            let operand = operand.trim();
            let Some(target) = resolve_include(operand) else {
                return Err(FabError::fabfile(
                    path,
                    lineno,
                    format!("cannot resolve include '{operand}'"),
                ));
            };
            load_into(&target, registry, active)?;
            continue;
        }
        let Some(header) = trimmed.strip_suffix(':') else {
            return Err(FabError::fabfile(
                path,
                lineno,
                format!("expected 'name [params...]:' header, got '{trimmed}'"),
            ));
        };
        flush(registry, &mut current);
        let mut words = header.split_whitespace();
        let Some(name) = words.next() else {
            return Err(FabError::fabfile(path, lineno, "task header has no name"));
        };
        if name.contains([':', ',']) {
            return Err(FabError::fabfile(
                path,
                lineno,
                format!("task name '{name}' may not contain ':' or ','"),
            ));
        }
        let doc = if pending_doc.is_empty() {
            None
        } else {
            Some(pending_doc.join("\n"))
        };
        pending_doc.clear();
        current = Some(TaskDef {
            name: name.to_string(),
            params: words.map(str::to_string).collect(),
            doc,
            body: Vec::new(),
        });
    }
    flush(registry, &mut current);
    Ok(())
}

fn flush(registry: &mut TaskRegistry, current: &mut Option<TaskDef>) {
    if let Some(task) = current.take() {
        registry.insert(task.name.clone(), task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, content).expect("write fabfile fixture");
        p
    }

    #[test]
    fn locator_prefers_lowercase_in_same_directory() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        write(tmp.path(), "Fabfile", "upper:\n");
        write(tmp.path(), "fabfile", "lower:\n");
        let found = find_fabfile_from(tmp.path()).expect("fabfile found");
        assert_eq!(found.file_name().and_then(|s| s.to_str()), Some("fabfile"));
    }

    #[test]
    fn locator_walks_parent_directories() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        write(tmp.path(), "fabfile", "top:\n");
        let nested = tmp.path().join("a").join("b");
        fs::create_dir_all(&nested).expect("create nested dirs");
        let found = find_fabfile_from(&nested).expect("fabfile found");
        assert_eq!(found, tmp.path().join("fabfile"));
    }

    #[test]
    fn locator_prefers_shallower_directory() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        write(tmp.path(), "fabfile", "top:\n");
        let nested = tmp.path().join("sub");
        fs::create_dir_all(&nested).expect("create subdir");
        write(&nested, "fabfile", "inner:\n");
        let found = find_fabfile_from(&nested).expect("fabfile found");
        assert_eq!(found, nested.join("fabfile"));
    }

    #[test]
    fn locator_returns_none_when_nothing_matches() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let nested = tmp.path().join("empty");
        fs::create_dir_all(&nested).expect("create empty dir");
        assert_eq!(find_fabfile_from(&nested), None);
    }

    #[test]
    fn parses_docs_params_and_bodies() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = write(
            tmp.path(),
            "fabfile",
            "# Deploy the given release.\ndeploy target env:\n    echo {target} {env}\n    touch done\n\nping:\n",
        );
        let registry = load_fabfile(&path).expect("load fabfile");
        let deploy = registry.get("deploy").expect("deploy task");
        assert_eq!(deploy.params, vec!["target", "env"]);
        assert_eq!(deploy.doc.as_deref(), Some("Deploy the given release."));
        assert_eq!(deploy.body, vec!["echo {target} {env}", "touch done"]);
        let ping = registry.get("ping").expect("ping task");
        assert!(ping.params.is_empty());
        assert!(ping.doc.is_none());
        assert!(ping.body.is_empty());
    }

    #[test]
    fn blank_line_detaches_doc_comment() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = write(tmp.path(), "fabfile", "# stale comment\n\nping:\n");
        let registry = load_fabfile(&path).expect("load fabfile");
        assert!(registry.get("ping").expect("ping task").doc.is_none());
    }

    #[test]
    fn header_without_colon_is_an_error() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = write(tmp.path(), "fabfile", "deploy\n");
        let err = load_fabfile(&path).expect_err("parse failure");
        assert!(matches!(err, FabError::Fabfile { line: 1, .. }));
    }

    #[test]
    fn indented_line_outside_task_is_an_error() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = write(tmp.path(), "fabfile", "    echo orphan\n");
        assert!(load_fabfile(&path).is_err());
    }

    #[test]
    fn include_merges_with_later_definition_winning() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        write(tmp.path(), "common_tasks", "shared:\n    echo base\nping:\n    echo pong\n");
        let path = write(
            tmp.path(),
            "fabfile",
            "include common_tasks\n\nshared:\n    echo override\n",
        );
        let registry = load_fabfile(&path).expect("load fabfile");
        assert_eq!(registry.get("shared").expect("shared").body, vec!["echo override"]);
        assert_eq!(registry.get("ping").expect("ping").body, vec!["echo pong"]);
    }

    #[test]
    fn missing_include_is_an_error_and_load_recovers() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let bad = write(tmp.path(), "fabfile", "include does-not-exist-anywhere\n");
        assert!(load_fabfile(&bad).is_err());
        // Search-path entry from the failed load must be gone.
        let other = tempfile::TempDir::new().expect("tempdir");
        write(other.path(), "recovery_tasks", "ok:\n");
        let good = write(other.path(), "fabfile", "include recovery_tasks\n");
        assert!(load_fabfile(&good).is_ok());
    }

    #[test]
    fn include_cycle_is_an_error() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = write(tmp.path(), "cyclic_tasks", "include cyclic_tasks\n");
        assert!(load_fabfile(&path).is_err());
    }

    #[test]
    fn reloading_reparses_without_caching() {
        let tmp = tempfile::TempDir::new().expect("tempdir");
        let path = write(tmp.path(), "fabfile", "ping:\n    echo one\n");
        assert_eq!(load_fabfile(&path).expect("first load").len(), 1);
        write(tmp.path(), "fabfile", "ping:\n    echo one\npong:\n");
        assert_eq!(load_fabfile(&path).expect("second load").len(), 2);
    }
}
