mod config;
mod report;
mod selection;

use std::{io, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{ChannelCatalog, DeletionEngine, RunOutcome, Session};
use shared::domain::{ChannelId, GuildId};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{config::Settings, report::ConsoleObserver, selection::Selection};

/// Deletes the messages your account authored in DMs and guilds.
#[derive(Parser, Debug)]
#[command(name = "purge", version)]
struct Cli {
    /// Account token; falls back to the config file.
    #[arg(long, global = true, env = "PURGE_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the token and print the account it belongs to.
    Whoami,
    /// Print the DMs and guilds that can be purged.
    List,
    /// Delete your messages from the selected DMs and guilds.
    Run {
        #[arg(long = "dm", value_name = "CHANNEL_ID")]
        dms: Vec<u64>,
        #[arg(long = "guild", value_name = "GUILD_ID")]
        guilds: Vec<u64>,
        #[arg(long)]
        all_dms: bool,
        #[arg(long)]
        all_guilds: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
    let cli = Cli::parse();

    let settings = config::load_settings(&cli.config)?;
    let credential = settings.credential(cli.token)?;
    let mut session = Session::new(&settings.client_config(), credential)
        .context("failed to build API client")?;
    let identity = session
        .login()
        .await
        .context("could not log in with the given token")?
        .clone();

    let code = match cli.command {
        Command::Whoami => {
            println!("Logged in as {} (user_id={})", identity.display_name, identity.id);
            ExitCode::SUCCESS
        }
        Command::List => {
            let (dms, guilds) = ChannelCatalog::new(&session)
                .build_catalog()
                .await
                .into_parts();
            report::write_catalog(&mut io::stdout().lock(), &dms, &guilds)
                .context("failed to print catalog")?;
            ExitCode::SUCCESS
        }
        Command::Run {
            dms,
            guilds,
            all_dms,
            all_guilds,
        } => {
            let selection = Selection {
                dms: dms.into_iter().map(ChannelId).collect(),
                guilds: guilds.into_iter().map(GuildId).collect(),
                all_dms,
                all_guilds,
            };
            run(&session, &settings, &selection).await?
        }
    };

    session.logout();
    Ok(code)
}

async fn run(session: &Session, settings: &Settings, selection: &Selection) -> Result<ExitCode> {
    let catalog = ChannelCatalog::new(session).build_catalog().await;
    let targets = selection::select_targets(&catalog, selection)?;

    let engine = DeletionEngine::new(session, settings.engine_options());
    let Some(mut handle) = engine.start_run(targets) else {
        anyhow::bail!("a deletion run is already active");
    };

    let cancel = handle.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping at the next checkpoint");
            cancel.cancel();
        }
    });

    let mut observer = ConsoleObserver::new(io::stdout());
    handle.observe(&mut observer).await;

    Ok(match handle.wait().await {
        RunOutcome::Completed(_) => ExitCode::SUCCESS,
        RunOutcome::Cancelled => {
            info!("run cancelled before all targets were processed");
            ExitCode::from(130)
        }
        RunOutcome::Aborted => ExitCode::FAILURE,
    })
}
