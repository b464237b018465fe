use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use packet_tracker::utils::now_nanos;
use packet_tracker::{ChainTip, ConfiguredTracker, PacketEvent, PacketKey, PacketTable, TrackerConfig};

#[derive(Parser)]
#[command(name = "packet-tracker")]
#[command(about = "IBC packet lifecycle tracker for relayers")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/tracker.toml")]
    pub config: String,

    /// Log level (overrides `global.log_level` from the config file)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clear every claim flag (run before starting relay workers)
    Reset,
    /// Ingest a JSON array of packet events observed on one chain
    Ingest {
        /// Chain the events were observed on
        #[arg(long)]
        chain: String,
        /// JSON file with the events
        file: PathBuf,
    },
    /// Print relay candidates as JSON
    Candidates {
        /// Record set: send, timeout or write_ack
        #[arg(long, default_value = "send")]
        set: String,
        /// Chain to query for (destination for send, origin otherwise)
        #[arg(long)]
        chain: String,
        /// Reference height on the destination chain
        #[arg(long, default_value_t = 0)]
        height: u64,
        /// Reference timestamp in nanoseconds (defaults to now)
        #[arg(long)]
        timestamp: Option<u64>,
    },
    /// Release a claim after a failed relay
    Release {
        /// Record set: send, timeout or write_ack
        #[arg(long)]
        set: String,
        #[arg(long)]
        chain: String,
        #[arg(long)]
        connection: String,
        #[arg(long)]
        channel: String,
        #[arg(long)]
        sequence: u64,
    },
    /// Show record counts
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = TrackerConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?
        .one_shot();

    // Initialize logging
    let log_level = config.log_level(cli.log_level.as_deref());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}={}", env!("CARGO_CRATE_NAME"), log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Loaded configuration from: {}", cli.config);

    let tracker = ConfiguredTracker::from_config(&config)?;

    match cli.command {
        Commands::Reset => {
            let cleared = tracker.startup_reset()?;
            println!("Cleared {} claims", cleared);
        }
        Commands::Ingest { chain, file } => {
            ingest_file(&tracker, &chain, &file).await?;
        }
        Commands::Candidates {
            set,
            chain,
            height,
            timestamp,
        } => {
            let tip = ChainTip::new(height, timestamp.unwrap_or_else(now_nanos));
            print_candidates(&tracker, &config, &set, &chain, tip)?;
        }
        Commands::Release {
            set,
            chain,
            connection,
            channel,
            sequence,
        } => {
            let table = parse_set(&set)?;
            let key = PacketKey::new(&chain, &connection, &channel, sequence);
            if tracker.release(table, &key)? {
                println!("Released {} packet {}/{}/{}", table, chain, channel, sequence);
            } else {
                println!("No claim held on {} packet {}/{}/{}", table, chain, channel, sequence);
            }
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&tracker.stats()?)?);
        }
    }

    Ok(())
}

fn parse_set(set: &str) -> anyhow::Result<PacketTable> {
    match PacketTable::parse(set) {
        Some(table) => Ok(table),
        None => bail!("unknown record set '{}' (expected send, timeout or write_ack)", set),
    }
}

async fn ingest_file(tracker: &ConfiguredTracker, chain: &str, file: &PathBuf) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let events: Vec<PacketEvent> = serde_json::from_str(&content)?;
    info!("Ingesting {} events for {}", events.len(), chain);

    let summary = tracker.ingest(chain, &events).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_candidates(
    tracker: &ConfiguredTracker,
    config: &TrackerConfig,
    set: &str,
    chain: &str,
    tip: ChainTip,
) -> anyhow::Result<()> {
    let chain_config = match config.get_chain(chain) {
        Some(chain_config) => chain_config,
        None => bail!("chain {} is not configured", chain),
    };
    let filter = &chain_config.packet_filter;

    let json = match parse_set(set)? {
        PacketTable::Send => {
            let counterparties = config.counterparty_fee_filters(chain);
            serde_json::to_string_pretty(&tracker.send_candidates(chain, tip, &counterparties, filter)?)?
        }
        PacketTable::Timeout => {
            let counterparties = config.counterparty_chain_ids(chain);
            serde_json::to_string_pretty(&tracker.timeout_candidates(
                chain,
                tip,
                &counterparties,
                &chain_config.fee_filter,
                filter,
            )?)?
        }
        PacketTable::WriteAck => {
            let counterparties = config.counterparty_chain_ids(chain);
            serde_json::to_string_pretty(&tracker.write_ack_candidates(
                chain,
                &counterparties,
                &chain_config.fee_filter,
                filter,
            )?)?
        }
    };
    println!("{}", json);
    Ok(())
}
