//! chronik-tail command-line tool.

use anyhow::Result;
use chronik_tail::TimeoutConfig;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::*;

/// Tail and inspect topics on Kafka-compatible clusters
#[derive(Parser, Debug)]
#[command(name = "chronik-tail")]
#[command(version, about, long_about = None)]
struct Cli {
    /// ZooKeeper host used for topology discovery
    #[arg(short, long, global = true, env = "CHRONIK_TAIL_ZOOKEEPER", default_value = "")]
    zookeeper: String,

    /// Cluster name (ZooKeeper chroot)
    #[arg(short, long, global = true, env = "CHRONIK_TAIL_CLUSTER", default_value = "cluster")]
    cluster: String,

    /// ZooKeeper connect and read timeout in seconds [default: 10]
    #[arg(long, global = true, env = "CHRONIK_TAIL_ZOOKEEPER_TIMEOUT")]
    zookeeper_timeout: Option<u64>,

    /// Broker dial and read timeout in seconds [default: 10]
    #[arg(long, global = true, env = "CHRONIK_TAIL_KAFKA_TIMEOUT")]
    kafka_timeout: Option<u64>,

    /// Consumer group assignment timeout in seconds [default: 30]
    #[arg(long, global = true, env = "CHRONIK_TAIL_GROUP_TIMEOUT")]
    group_timeout: Option<u64>,

    /// Verbose logging on stderr
    #[arg(short, long, global = true, env = "CHRONIK_TAIL_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Tail records from a topic
    Tail(TailCommand),

    /// Show topic list
    TopicList(TopicListCommand),

    /// Show registered brokers and their endpoints
    BrokerList(BrokerListCommand),

    /// Print the version number
    Version,
}

/// Output format
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Options shared by every command.
pub struct GlobalOptions {
    pub zookeeper: String,
    pub cluster: String,
    pub timeouts: TimeoutConfig,
}

impl Cli {
    /// Timeout flags over `TimeoutConfig::from_env`.
    fn timeouts(&self) -> TimeoutConfig {
        let mut timeouts = TimeoutConfig::from_env();
        if let Some(secs) = self.zookeeper_timeout {
            timeouts.coordination_timeout_secs = secs;
        }
        if let Some(secs) = self.kafka_timeout {
            timeouts.dial_timeout_secs = secs;
            timeouts.read_timeout_secs = secs;
        }
        if let Some(secs) = self.group_timeout {
            timeouts.group_join_timeout_secs = secs;
        }
        timeouts
    }
}

/// Usage errors exit 1 like every other failure; help and version exit 0.
fn parse_exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries record values only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(parse_exit_code(&e));
        }
    };
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let options = GlobalOptions {
        timeouts: cli.timeouts(),
        zookeeper: cli.zookeeper,
        cluster: cli.cluster,
    };

    match cli.command {
        Commands::Tail(cmd) => cmd.execute(&options).await,
        Commands::TopicList(cmd) => cmd.execute(&options).await,
        Commands::BrokerList(cmd) => cmd.execute(&options).await,
        Commands::Version => {
            println!("chronik-tail v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_subcommand() {
        let cli = Cli::try_parse_from(["chronik-tail", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
        assert_eq!(cli.cluster, "cluster");
        assert_eq!(cli.zookeeper_timeout, None);
    }

    #[test]
    fn test_timeout_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "chronik-tail",
            "topic-list",
            "--zookeeper-timeout",
            "4",
            "--kafka-timeout",
            "6",
        ])
        .unwrap();
        let timeouts = cli.timeouts();
        assert_eq!(timeouts.coordination_timeout_secs, 4);
        assert_eq!(timeouts.dial_timeout_secs, 6);
        assert_eq!(timeouts.read_timeout_secs, 6);
    }

    #[test]
    fn test_usage_error_exits_one() {
        let err = Cli::try_parse_from(["chronik-tail", "tail", "--bogus"]).unwrap_err();
        assert_eq!(parse_exit_code(&err), 1);

        let err = Cli::try_parse_from(["chronik-tail", "--help"]).unwrap_err();
        assert_eq!(parse_exit_code(&err), 0);

        let err = Cli::try_parse_from(["chronik-tail", "--version"]).unwrap_err();
        assert_eq!(parse_exit_code(&err), 0);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "chronik-tail",
            "topic-list",
            "--zookeeper",
            "zk-0:2181",
            "--cluster",
            "prod",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::TopicList(_)));
        assert_eq!(cli.zookeeper, "zk-0:2181");
        assert_eq!(cli.cluster, "prod");
    }

    #[test]
    fn test_tail_requires_topic() {
        assert!(Cli::try_parse_from(["chronik-tail", "tail", "--user", "alice"]).is_err());
    }

    #[test]
    fn test_broker_list_output_format() {
        let cli =
            Cli::try_parse_from(["chronik-tail", "broker-list", "--output", "json"]).unwrap();
        assert!(matches!(cli.command, Commands::BrokerList(_)));
    }
}
