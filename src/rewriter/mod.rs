// Config rewriter - points the host at the proxy instead of the real server
//
// The host's MCP config is a JSON document with a top-level `mcpServers`
// map. `install` rewrites one entry so the host launches this binary's
// `proxy` subcommand with the real command preserved behind
// `--target-command` / `--target-args`; `restore` copies the backup over the
// live file. Install is idempotent: a recursion guard refuses to wrap an
// entry that already launches the runner.

use crate::error::{AuditError, Result};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// File-stem of the proxy runner binary; the recursion guard keys on it.
const RUNNER_STEM: &str = "mcpspy";

/// The runner's subcommand selector: `args[0]` of every proxied entry.
const RUNNER_SELECTOR: &str = "proxy";

/// Default host config location: `<home>/.cursor/mcp.json`, preferring a
/// project-level `.cursor/mcp.json` when one exists.
pub fn default_config_path() -> PathBuf {
    let project = PathBuf::from(".cursor").join("mcp.json");
    if project.exists() {
        return project;
    }
    dirs::home_dir()
        .map(|p| p.join(".cursor").join("mcp.json"))
        .unwrap_or(project)
}

/// Result of unwrapping a (possibly nested) proxied entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Unwrapped {
    pub command: String,
    pub args: Vec<String>,
    /// Number of proxy layers peeled.
    pub depth: usize,
}

/// Rewrite `server_name`'s entry so the host launches the proxy.
///
/// Backs up the current file to `<file>.backup` first and writes the new
/// document atomically (temp file + rename). Fails with `NotFound` when the
/// server entry is absent and `AlreadyProxied` when the guard trips; in the
/// latter case the file is untouched.
pub fn install(config_path: &Path, server_name: &str) -> Result<()> {
    let contents = std::fs::read_to_string(config_path)
        .map_err(|e| AuditError::io(config_path, e))?;
    let mut document: Value = serde_json::from_str(&contents)
        .map_err(|e| AuditError::Parse(format!("host config: {e}")))?;

    let entry = document
        .get("mcpServers")
        .and_then(|s| s.get(server_name))
        .ok_or_else(|| AuditError::NotFound(server_name.to_string()))?;

    if is_proxied(entry) {
        return Err(AuditError::AlreadyProxied(server_name.to_string()));
    }

    let original_command = entry
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let original_args: Vec<String> = entry
        .get("args")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let original_cwd = entry
        .get("cwd")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| {
            std::env::current_dir()
                .ok()
                .map(|p| p.display().to_string())
        })
        .unwrap_or_default();

    // Backup before touching anything
    let backup = backup_path(config_path);
    std::fs::copy(config_path, &backup).map_err(|e| AuditError::io(&backup, e))?;

    let mut args = vec![
        RUNNER_SELECTOR.to_string(),
        "--target-command".to_string(),
        original_command,
        "--target-args".to_string(),
    ];
    args.extend(original_args);

    // Preserve any env the original entry carried
    let mut env = entry
        .get("env")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);
    env.insert("MCP_TARGET_CWD".to_string(), json!(original_cwd));
    env.insert("MCP_SERVER_NAME".to_string(), json!(server_name));

    let rewritten = json!({
        "command": runner_command(),
        "args": args,
        "cwd": original_cwd,
        "env": env,
    });

    document["mcpServers"][server_name] = rewritten;
    write_atomic(config_path, &document)?;

    tracing::info!(
        "proxied server `{}` in {}",
        server_name,
        config_path.display()
    );
    Ok(())
}

/// Copy the backup over the live config.
pub fn restore(config_path: &Path) -> Result<()> {
    let backup = backup_path(config_path);
    if !backup.exists() {
        return Err(AuditError::NotFound(format!(
            "backup {}",
            backup.display()
        )));
    }
    std::fs::copy(&backup, config_path).map_err(|e| AuditError::io(config_path, e))?;
    tracing::info!("restored {}", config_path.display());
    Ok(())
}

/// Peel nested proxy wrappings of arbitrary depth from one entry's
/// command/args, returning the original command.
///
/// A config that was installed over k times unwraps after exactly k
/// peelings; a clean entry comes back with depth 0.
pub fn unwrap_recursive(command: &str, args: &[String]) -> Unwrapped {
    let mut command = command.to_string();
    let mut args = args.to_vec();
    let mut depth = 0;

    while is_runner_command(&command) && args.first().map(String::as_str) == Some(RUNNER_SELECTOR) {
        let Some(cmd_idx) = args.iter().position(|a| a == "--target-command") else {
            break; // malformed wrapping, stop peeling
        };
        let Some(args_idx) = args.iter().position(|a| a == "--target-args") else {
            break;
        };
        let Some(inner_command) = args.get(cmd_idx + 1).cloned() else {
            break;
        };

        depth += 1;
        command = inner_command;
        args = args[args_idx + 1..].to_vec();
    }

    Unwrapped {
        command,
        args,
        depth,
    }
}

/// Self-healing pass over a whole document: replace every recursively
/// proxied entry with its unwrapped original.
pub fn unwrap_document(document: &mut Value) -> usize {
    let Some(servers) = document
        .get_mut("mcpServers")
        .and_then(Value::as_object_mut)
    else {
        return 0;
    };

    let mut peeled = 0;
    for (name, entry) in servers.iter_mut() {
        let command = entry
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let args: Vec<String> = entry
            .get("args")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let unwrapped = unwrap_recursive(&command, &args);
        if unwrapped.depth > 0 {
            tracing::info!(
                "unwrapping `{}`: {} proxy layer(s) removed",
                name,
                unwrapped.depth
            );
            *entry = json!({
                "command": unwrapped.command,
                "args": unwrapped.args,
            });
            peeled += unwrapped.depth;
        }
    }
    peeled
}

/// An entry is already proxied iff its command is the runner binary and its
/// first argument is the runner selector.
fn is_proxied(entry: &Value) -> bool {
    let command = entry
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let first_arg = entry
        .get("args")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(Value::as_str);

    is_runner_command(command) && first_arg == Some(RUNNER_SELECTOR)
}

fn is_runner_command(command: &str) -> bool {
    Path::new(command)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| stem == RUNNER_STEM)
        .unwrap_or(false)
}

/// Absolute path of the running binary; falls back to the bare name so a
/// PATH-installed runner still resolves.
fn runner_command() -> String {
    std::env::current_exe()
        .ok()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| RUNNER_STEM.to_string())
}

fn backup_path(config_path: &Path) -> PathBuf {
    let mut name = config_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mcp.json".to_string());
    name.push_str(".backup");
    config_path.with_file_name(name)
}

/// Write the document next to the target, then rename over it.
fn write_atomic(config_path: &Path, document: &Value) -> Result<()> {
    let pretty = serde_json::to_string_pretty(document)
        .map_err(|e| AuditError::Parse(format!("serialize host config: {e}")))?;
    let tmp = config_path.with_extension("json.tmp");
    std::fs::write(&tmp, pretty).map_err(|e| AuditError::io(&tmp, e))?;
    std::fs::rename(&tmp, config_path).map_err(|e| AuditError::io(config_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, document: &Value) -> PathBuf {
        let path = dir.join("mcp.json");
        std::fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
        path
    }

    fn sample_config() -> Value {
        json!({
            "mcpServers": {
                "weather": {
                    "command": "node",
                    "args": ["server.js", "--port", "0"],
                    "cwd": "/srv/weather"
                }
            }
        })
    }

    #[test]
    fn install_wraps_entry_and_preserves_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &sample_config());

        install(&path, "weather").unwrap();

        let doc: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &doc["mcpServers"]["weather"];

        let args: Vec<&str> = entry["args"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(args[0], "proxy");
        assert_eq!(args[1], "--target-command");
        assert_eq!(args[2], "node");
        assert_eq!(args[3], "--target-args");
        assert_eq!(&args[4..], ["server.js", "--port", "0"]);

        assert_eq!(entry["cwd"], "/srv/weather");
        assert_eq!(entry["env"]["MCP_TARGET_CWD"], "/srv/weather");
        assert_eq!(entry["env"]["MCP_SERVER_NAME"], "weather");
    }

    #[test]
    fn install_missing_server_fails_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &sample_config());

        let err = install(&path, "no-such-server").unwrap_err();
        assert!(matches!(err, AuditError::NotFound(_)));
    }

    #[test]
    fn second_install_trips_guard_and_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &sample_config());

        install(&path, "weather").unwrap();
        let after_first = std::fs::read_to_string(&path).unwrap();

        let err = install(&path, "weather").unwrap_err();
        assert!(matches!(err, AuditError::AlreadyProxied(_)));

        let after_second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn guard_trips_on_hand_written_proxy_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            &json!({
                "mcpServers": {
                    "weather": {
                        "command": "/usr/local/bin/mcpspy",
                        "args": ["proxy", "--target-command", "node", "--target-args", "server.js"]
                    }
                }
            }),
        );

        let err = install(&path, "weather").unwrap_err();
        assert!(matches!(err, AuditError::AlreadyProxied(_)));
    }

    #[test]
    fn install_then_restore_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &sample_config());
        let original = std::fs::read_to_string(&path).unwrap();

        install(&path, "weather").unwrap();
        assert_ne!(original, std::fs::read_to_string(&path).unwrap());

        restore(&path).unwrap();
        assert_eq!(original, std::fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn restore_without_backup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), &sample_config());
        let err = restore(&path).unwrap_err();
        assert!(matches!(err, AuditError::NotFound(_)));
    }

    #[test]
    fn unwrap_clean_entry_is_depth_zero() {
        let unwrapped = unwrap_recursive("node", &["server.js".to_string()]);
        assert_eq!(unwrapped.depth, 0);
        assert_eq!(unwrapped.command, "node");
        assert_eq!(unwrapped.args, vec!["server.js"]);
    }

    #[test]
    fn unwrap_peels_exactly_k_layers() {
        // Build a depth-3 nesting the way repeated installs would
        let mut command = "node".to_string();
        let mut args = vec!["server.js".to_string()];
        for _ in 0..3 {
            let mut wrapped = vec![
                "proxy".to_string(),
                "--target-command".to_string(),
                command,
                "--target-args".to_string(),
            ];
            wrapped.extend(args);
            command = "/usr/local/bin/mcpspy".to_string();
            args = wrapped;
        }

        let unwrapped = unwrap_recursive(&command, &args);
        assert_eq!(unwrapped.depth, 3);
        assert_eq!(unwrapped.command, "node");
        assert_eq!(unwrapped.args, vec!["server.js"]);
    }

    #[test]
    fn unwrap_document_heals_nested_entries() {
        let mut doc = json!({
            "mcpServers": {
                "weather": {
                    "command": "mcpspy",
                    "args": ["proxy", "--target-command", "node", "--target-args", "server.js"]
                },
                "clean": {
                    "command": "python3",
                    "args": ["-m", "weather_server"]
                }
            }
        });

        let peeled = unwrap_document(&mut doc);
        assert_eq!(peeled, 1);
        assert_eq!(doc["mcpServers"]["weather"]["command"], "node");
        assert_eq!(doc["mcpServers"]["clean"]["command"], "python3");
    }
}
