// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::Parser;
use etap_config::{EtapConfig, LogFormat, load_config, merge_configs, validate_config};
use etap_daemon::{AppState, build_app};
use etap_runtime::{RunnerSettings, TapManager, TapRegistry, http_client, http_peers};
use etap_script::ScriptLimits;
use etap_store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "etap-daemon", version, about = "Event tap daemon")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, e.g. `0.0.0.0:6677` or `:6677`.
    #[arg(long)]
    bind: Option<String>,

    /// SQLite state file.
    #[arg(long)]
    state_file: Option<String>,

    /// Base URL of the upstream event service.
    #[arg(long)]
    event_source_url: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Print the configuration JSON schema and exit.
    #[arg(long)]
    print_config_schema: bool,
}

impl Args {
    fn overlay(&self) -> EtapConfig {
        EtapConfig {
            bind: self.bind.clone(),
            state_file: self.state_file.clone(),
            event_source_url: self.event_source_url.clone(),
            log_level: self.debug.then(|| "debug".to_string()),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config_schema {
        let schema = serde_json::to_string_pretty(&etap_config::config_schema())?;
        println!("{schema}");
        return Ok(());
    }

    let file_config = load_config(args.config.as_deref()).context("load config")?;
    let config = merge_configs(file_config, args.overlay());
    let warnings = validate_config(&config).context("invalid config")?;

    init_tracing(&config);
    for w in &warnings {
        warn!(target: "etap.daemon", "{w}");
    }

    let bind = config.bind_addr()?;
    let state_file = config.state_file_or_default();
    let store = Store::open(state_file).with_context(|| format!("open state file {state_file}"))?;
    let registry = TapRegistry::new(store);
    registry.init().context("initialise tap registry")?;

    let client = http_client(config.http_timeout()).context("build http client")?;
    let peers = http_peers(client, config.event_source_url_or_default());
    let settings = RunnerSettings {
        retry_delay: config.retry_delay(),
        idle_poll_interval: config.idle_poll_interval(),
    };
    let mut limits = ScriptLimits::default();
    if let Some(n) = config.script.loop_iteration_limit {
        limits.loop_iteration_limit = n;
    }
    if let Some(n) = config.script.recursion_limit {
        limits.recursion_limit = n;
    }

    let manager = Arc::new(TapManager::new(registry, peers, settings, limits));
    let recovered = manager.recover().await.context("start persisted taps")?;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(
        target: "etap.daemon",
        bind = %bind,
        state_file = %state_file,
        event_source_url = %config.event_source_url_or_default(),
        recovered,
        "etap-daemon listening"
    );

    let app = build_app(AppState::new(Arc::clone(&manager)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    info!(target: "etap.daemon", "shutting down");
    manager.shutdown(config.shutdown_grace()).await;
    Ok(())
}

fn init_tracing(config: &EtapConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,etap={}", config.log_level_or_default()))
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format_or_default() {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(target: "etap.daemon", error = %e, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(target: "etap.daemon", error = %e, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
