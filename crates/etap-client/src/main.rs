// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Args, Parser, Subcommand};
use etap_client::format::{OutputFormat, render_details, render_entries};
use etap_client::{DEFAULT_SERVER_URL, EtapClient};
use etap_core::TapOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "etap", version, about = "Control an event-tap daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the daemon.
    #[arg(long, env = "EVENT_TAP_SERVER_URL", default_value = DEFAULT_SERVER_URL, global = true)]
    server_url: String,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    output: OutputFormat,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a tap.
    Create(CreateArgs),

    /// List all taps.
    Ls,

    /// Show one tap.
    Get {
        /// Tap id.
        id: String,
    },

    /// Delete a tap.
    Delete {
        /// Tap id.
        id: String,
    },
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("script").required(true).args(["code", "code_file"])))]
struct CreateArgs {
    /// Human label.
    #[arg(long)]
    name: String,

    /// Where transformed batches are posted.
    #[arg(long)]
    webhook_url: String,

    /// Script source defining `mapEvents`.
    #[arg(long)]
    code: Option<String>,

    /// Read the script source from a file.
    #[arg(long)]
    code_file: Option<PathBuf>,

    /// Maximum events per poll.
    #[arg(long, default_value_t = 100)]
    batch_limit: usize,
}

impl CreateArgs {
    fn into_options(self) -> Result<TapOptions> {
        let code = match (self.code, self.code_file) {
            (Some(code), _) => code,
            (None, Some(path)) => std::fs::read_to_string(&path)
                .with_context(|| format!("read {}", path.display()))?,
            (None, None) => bail!("one of --code or --code-file is required"),
        };
        Ok(TapOptions {
            name: self.name,
            code,
            webhook_url: self.webhook_url,
            batch_limit: self.batch_limit,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("etap=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let client = EtapClient::new(&cli.server_url).context("could not create client")?;

    match cli.command {
        Commands::Create(args) => {
            let options = args.into_options()?;
            let id = client.create(&options).await.context("could not create tap")?;
            println!("created {id}");
        }
        Commands::Ls => {
            let entries = client.list().await.context("could not list taps")?;
            println!("{}", render_entries(&entries, cli.output)?);
        }
        Commands::Get { id } => {
            let Some(details) = client.get(&id).await.context("could not get tap")? else {
                bail!("tap {id} not found");
            };
            println!("{}", render_details(&details, cli.output)?);
        }
        Commands::Delete { id } => {
            client.delete(&id).await.context("could not delete tap")?;
            println!("deleted {id}");
        }
    }
    Ok(())
}
