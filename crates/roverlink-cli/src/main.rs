//! `roverlink` – ground-station mission bridge.
//!
//! Starts the mission listener on TCP port 5005 and forwards every mission
//! it receives to the rover's `Mission` action server.
//!
//! 1. Initialises tracing (see `roverlink_runtime::telemetry`).
//! 2. Loads `~/.roverlink/config.toml` (defaults when absent) and applies
//!    `ROVERLINK_*` overrides.
//! 3. Picks the action backend: `rosbridge` (a real rover) or `sim`.
//! 4. Intercepts **Ctrl-C** to stop the accept loop and release the socket.
//!
//! Subcommands:
//!
//! | Command | Effect |
//! |---|---|
//! | *(none)* | Run the bridge. |
//! | `schema` | Print the JSON Schema of the mission payload. |
//! | `init-config` | Write the default config file. |

mod config;

use std::process::ExitCode;

use colored::Colorize;
use roverlink_middleware::{ActionClient, RosbridgeActionClient, SimActionClient};
use roverlink_runtime::Bridge;
use roverlink_types::{BridgeError, MissionRequest};
use tokio::sync::watch;
use tracing::{error, info, warn};

use config::{ActionBackend, Config};

fn main() -> ExitCode {
    match std::env::args().nth(1).as_deref() {
        None => {}
        Some("schema") => return print_schema(),
        Some("init-config") => return init_config(),
        Some("help" | "-h" | "--help") => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Some(other) => {
            eprintln!("{}: unknown command '{other}'", "error".red().bold());
            print_usage();
            return ExitCode::from(2);
        }
    }

    // Before any Tokio runtime exists; see telemetry::build_provider.
    let _guard = roverlink_runtime::init_tracing("roverlink");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            info!(path = %config::config_path().display(), "config loaded");
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            warn!(error = %e, "config unusable; falling back to defaults");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    match run(cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bridge terminated");
            eprintln!("{}: {e}", "fatal".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: Config) -> Result<(), BridgeError> {
    let bridge_cfg = cfg.to_bridge_config()?;

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping mission bridge …".yellow().bold());
        let _ = stop_tx.send(true);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; shutdown on Ctrl-C will not be graceful");
    }

    let client: Box<dyn ActionClient> = match cfg.action_backend {
        ActionBackend::Rosbridge => Box::new(
            RosbridgeActionClient::new(&cfg.rosbridge_url, &cfg.action_name, &cfg.action_type)
                .with_poll_interval(cfg.server_poll_interval()),
        ),
        ActionBackend::Sim => Box::new(SimActionClient::new(&cfg.action_name)),
    };
    info!(
        backend = %cfg.action_backend,
        rosbridge_url = %cfg.rosbridge_url,
        action = %cfg.action_name,
        "action backend selected"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| BridgeError::Config(format!("cannot start async runtime: {e}")))?;

    runtime.block_on(async move {
        let bridge = Bridge::bind(&bridge_cfg, client).await?;
        bridge.run(stop_rx).await
    })?;

    println!("{}", "  ✓ Mission bridge stopped.".green());
    Ok(())
}

fn print_schema() -> ExitCode {
    let schema = schemars::schema_for!(MissionRequest);
    match serde_json::to_string_pretty(&schema) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_config() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return ExitCode::SUCCESS;
    }
    match config::save(&Config::default()) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    println!("usage: roverlink [schema | init-config | help]");
}

fn print_banner() {
    println!();
    println!("  {} {}",
        "roverlink".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Ground-station mission bridge");
    println!();
}
