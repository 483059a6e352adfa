use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wca_gateway::{GatewayConfig, Service, WcaGatewayLocalClient};
use wca_gateway_sdk::{
    DetailLevel, GatewayError, ResourceIdentity, RoundSelector, ShapingPolicy, WcaGatewayClient,
};

/// WCA gateway - fetch one WCA resource and print its shaped view
#[derive(Parser)]
#[command(name = "wca-gateway")]
#[command(about = "Fetch one WCA resource and print its shaped view as JSON")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log verbosity level (-v info, -vv debug, -vvv trace); `RUST_LOG` wins when set
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    #[command(flatten)]
    shaping: ShapingArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Detail {
    Summary,
    Full,
}

#[derive(Args, Debug)]
struct ShapingArgs {
    /// Rounds to keep: `final-only`, `all`, or a round name such as "Semi Final"
    #[arg(long, default_value = "all", global = true)]
    round: String,

    /// Maximum number of entries to keep (0 = unbounded)
    #[arg(long, default_value_t = 0, global = true)]
    max_entries: usize,

    /// Per-entry detail level
    #[arg(long, value_enum, default_value_t = Detail::Full, global = true)]
    detail: Detail,
}

impl ShapingArgs {
    fn policy(&self) -> ShapingPolicy {
        let detail = match self.detail {
            Detail::Summary => DetailLevel::Summary,
            Detail::Full => DetailLevel::Full,
        };
        ShapingPolicy::default()
            .with_round(RoundSelector::parse(&self.round))
            .with_max_entries(self.max_entries)
            .with_detail(detail)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// All WCA events
    Events,
    /// All countries
    Countries,
    /// All continents
    Continents,
    /// One competition
    Competition { id: String },
    /// Competitions held on a date
    CompetitionsByDate { year: u32, month: u32, day: u32 },
    /// Competitions featuring an event
    CompetitionsByEvent {
        event: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Results of a competition, optionally of one event
    Results {
        competition: String,
        #[arg(long)]
        event: Option<String>,
    },
    /// A person's profile and results
    Person {
        wca_id: String,
        /// Keep only the results of this competition
        #[arg(long)]
        competition: Option<String>,
    },
    /// A ranking: region (`world`, a continent or a country), type (`single` or `average`), event
    Ranking {
        region: String,
        #[arg(value_name = "TYPE")]
        ranking_type: String,
        event: String,
    },
    /// All championships
    Championships {
        /// Keep only championships of this region
        #[arg(long)]
        region: Option<String>,
    },
    /// One championship
    Championship { id: String },
}

impl Command {
    fn identity(&self) -> Result<ResourceIdentity, GatewayError> {
        match self {
            Self::Events => Ok(ResourceIdentity::events()),
            Self::Countries => Ok(ResourceIdentity::countries()),
            Self::Continents => Ok(ResourceIdentity::continents()),
            Self::Competition { id } => ResourceIdentity::competition(id),
            Self::CompetitionsByDate { year, month, day } => {
                ResourceIdentity::competitions_by_date(*year, *month, *day)
            }
            Self::CompetitionsByEvent { event, page } => {
                ResourceIdentity::competitions_by_event(event, *page)
            }
            Self::Results {
                competition,
                event: Some(event),
            } => ResourceIdentity::competition_event_results(competition, event),
            Self::Results {
                competition,
                event: None,
            } => ResourceIdentity::competition_results(competition),
            Self::Person {
                wca_id,
                competition,
            } => {
                let identity = ResourceIdentity::person(wca_id)?;
                match competition {
                    Some(competition) => identity.with_filter("competition", competition),
                    None => Ok(identity),
                }
            }
            Self::Ranking {
                region,
                ranking_type,
                event,
            } => ResourceIdentity::ranking(region, ranking_type, event),
            Self::Championships { region } => {
                let identity = ResourceIdentity::championships();
                match region {
                    Some(region) => identity.with_filter("region", region),
                    None => Ok(identity),
                }
            }
            Self::Championship { id } => ResourceIdentity::championship(id),
        }
    }
}

fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. Logs go to stderr so stdout carries only the result.
fn init_logging(verbose: u8, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    installed.context("failed to install log subscriber")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format)?;

    if let Some(path) = &cli.config
        && !path.is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }

    // Layered config: defaults -> YAML (if provided) -> env (WCA_*)
    let config =
        GatewayConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let Some(command) = &cli.command else {
        anyhow::bail!("no resource given; run with --help to list resources");
    };
    let identity = command.identity()?;
    let policy = cli.shaping.policy();

    let service = Arc::new(Service::from_config(&config)?);
    let client = WcaGatewayLocalClient::new(service);

    tracing::info!(identity = %identity, policy = %policy, "resolving resource");
    let shaped = client
        .resolve(&identity, identity.class(), &policy)
        .await?;

    println!("{}", serde_json::to_string_pretty(&shaped)?);
    Ok(())
}
