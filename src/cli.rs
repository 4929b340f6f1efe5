// CLI module - command-line argument parsing and the config handlers
//
// Subcommands:
// - proxy:   run the stdio interception proxy (what the rewritten host
//            config launches)
// - install / restore / unwrap: manage the host's MCP config
// - report:  print the usability report as JSON for external formatters
// - export:  run the telemetry export loop in the foreground
// - config:  --show / --reset / --edit / --update / --path

use crate::config::{Config, VERSION};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command as ProcessCommand;

/// Cognitive observability proxy for MCP servers
#[derive(Parser)]
#[command(name = "mcpspy")]
#[command(version = VERSION)]
#[command(about = "Cognitive observability proxy for MCP servers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the stdio interception proxy in front of a target server
    Proxy {
        /// The real server executable
        #[arg(long)]
        target_command: String,

        /// Arguments for the real server (everything after this flag)
        #[arg(long, num_args = 0.., allow_hyphen_values = true)]
        target_args: Vec<String>,

        /// Logical server name (defaults to $MCP_SERVER_NAME)
        #[arg(long)]
        server_name: Option<String>,

        /// Working directory for the target (defaults to $MCP_TARGET_CWD)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },

    /// Rewrite a host server entry so the host launches the proxy
    Install {
        /// Server name in the host's mcpServers map
        server: String,

        /// Host config file (defaults to the .cursor/mcp.json convention)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Restore the host config from its backup
    Restore {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Peel recursive proxy wrappings out of the host config
    Unwrap {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the usability report as JSON
    Report {
        /// Server filter: exact name, comma-separated list, or "all"
        #[arg(long, default_value = "all")]
        server: String,

        /// Analysis window in hours
        #[arg(long, default_value_t = 24.0)]
        since_hours: f64,
    },

    /// Run the telemetry export loop until interrupted
    Export {
        /// Seconds between export iterations (overrides config)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Open config file in $EDITOR
        #[arg(long)]
        edit: bool,

        /// Update config with new defaults (preserves user values)
        #[arg(long)]
        update: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

/// Handle the `config` subcommand.
pub fn handle_config(show: bool, reset: bool, edit: bool, update: bool, path: bool) {
    if path {
        handle_config_path();
    } else if show {
        handle_config_show();
    } else if reset {
        handle_config_reset();
    } else if edit {
        handle_config_edit();
    } else if update {
        handle_config_update();
    } else {
        println!("Usage: mcpspy config [--show|--reset|--edit|--update|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --edit    Open config file in $EDITOR");
        println!("  --update  Update config with new defaults (preserves user values)");
        println!("  --path    Show config file path");
    }
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = Config::from_env();

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_reset() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    // Confirm if file exists
    if path.exists() {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        let _ = std::io::stderr().flush();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err() {
            eprintln!("Aborted.");
            return;
        }
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return;
        }
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Error creating directory: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = std::fs::write(&path, Config::default().to_toml()) {
        eprintln!("Error writing config: {}", e);
        std::process::exit(1);
    }

    println!("Config reset to defaults: {}", path.display());
}

fn handle_config_edit() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    if !path.exists() {
        Config::ensure_config_exists();
        println!("Created new config file: {}", path.display());
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| {
            if cfg!(windows) {
                "notepad".to_string()
            } else {
                "nano".to_string()
            }
        });

    println!("Opening {} with {}", path.display(), editor);

    let status = ProcessCommand::new(&editor).arg(&path).status();

    match status {
        Ok(s) if s.success() => {}
        Ok(s) => {
            eprintln!("Editor exited with status: {}", s);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to launch editor '{}': {}", editor, e);
            eprintln!("Set $EDITOR environment variable to your preferred editor");
            std::process::exit(1);
        }
    }
}

fn handle_config_update() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    if !path.exists() {
        Config::ensure_config_exists();
        println!("Created new config file: {}", path.display());
        return;
    }

    // Re-serialize the effective config so new sections appear while user
    // values survive
    let existing = Config::from_env();
    let updated = existing.to_toml();

    let backup_path = path.with_extension("toml.bak");
    if let Err(e) = std::fs::copy(&path, &backup_path) {
        eprintln!("Warning: Could not create backup: {}", e);
    } else {
        println!("Backup created: {}", backup_path.display());
    }

    if let Err(e) = std::fs::write(&path, updated) {
        eprintln!("Error writing config: {}", e);
        std::process::exit(1);
    }

    println!("Config updated with latest structure: {}", path.display());
    println!("Your values have been preserved.");
}
