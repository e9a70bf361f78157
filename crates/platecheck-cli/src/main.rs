mod check;
mod session;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use platecheck_client::build_lookup;
use platecheck_core::candidate::{CandidateProducer, TypedText};
use platecheck_core::config::Settings;
use platecheck_core::lookup::TracingLookupReporter;
use platecheck_core::report::{format_detail, format_summary};

#[derive(Parser)]
#[command(
    name = "platecheck",
    version,
    about = "Check license plates against community sighting trackers"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look a plate up in every source
    Lookup {
        /// License plate (spaces, hyphens and dots are ignored)
        plate: String,

        /// Also fetch the full sighting details for any match
        #[arg(short, long, default_value_t = false)]
        details: bool,
    },

    /// Interactive session reading /plate, /details, /help and /quit from stdin
    Session,

    /// Check every live source with a plate known to be listed
    Check {
        /// Known plate (reads from CHECK_PLATE env var if not provided)
        #[arg(env = "CHECK_PLATE")]
        plate: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("platecheck=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Lookup { plate, details } => cmd_lookup(&settings, &plate, details).await?,
        Commands::Session => cmd_session(&settings).await?,
        Commands::Check { plate } => {
            let code = check::run(&settings, plate).await?;
            return Ok(ExitCode::from(code));
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn cmd_lookup(settings: &Settings, plate: &str, details: bool) -> Result<()> {
    let candidates = TypedText
        .produce(plate)
        .await
        .with_context(|| format!("Invalid plate {plate:?}"))?;
    let lookup = build_lookup(settings)
        .await
        .context("Failed to set up sources")?;
    let reporter = TracingLookupReporter;

    for candidate in candidates {
        let summary = lookup.search(candidate, &reporter).await;
        println!("{}", format_summary(&summary));

        if details
            && let Some(interaction) = summary.interaction
            && let Some(report) = lookup.expand(interaction, &reporter).await
        {
            println!("\n{}", format_detail(&report));
        }
    }
    Ok(())
}

async fn cmd_session(settings: &Settings) -> Result<()> {
    let lookup = build_lookup(settings)
        .await
        .context("Failed to set up sources")?;
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    session::run(&lookup, &TracingLookupReporter, stdin, &mut stdout).await
}
