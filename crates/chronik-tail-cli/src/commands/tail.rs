//! Tail command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chronik_tail::config::{DEFAULT_LISTENER, DEFAULT_TAIL_COUNT};
use chronik_tail::{
    CancellationToken, ClusterSource, ClusterTopology, LineSink, TailConfig, TailSession,
    TlsMaterial,
};
use tracing::info;

use crate::GlobalOptions;

/// Tail records from a topic
#[derive(Debug, clap::Args)]
pub struct TailCommand {
    /// Topic to tail
    #[arg(short, long, env = "CHRONIK_TAIL_TOPIC")]
    topic: String,

    /// Number of most recent records to replay
    #[arg(short = 'n', long = "tail", env = "CHRONIK_TAIL_TAIL", default_value_t = DEFAULT_TAIL_COUNT)]
    tail: u64,

    /// Keep reading new records after the replay
    #[arg(short, long, env = "CHRONIK_TAIL_FOLLOW")]
    follow: bool,

    /// Listener name used to pick broker endpoints from ZooKeeper
    #[arg(short, long, env = "CHRONIK_TAIL_LISTENER", default_value = DEFAULT_LISTENER)]
    listener: String,

    /// Comma-separated broker list; skips ZooKeeper discovery
    #[arg(long, env = "CHRONIK_TAIL_KAFKA_BROKERS")]
    kafka_brokers: Option<String>,

    /// CA certificate file (PEM)
    #[arg(long, env = "CHRONIK_TAIL_BROKER_CA")]
    broker_ca: Option<PathBuf>,

    /// Client certificate file (PEM)
    #[arg(long = "broker-tls-cert", env = "CHRONIK_TAIL_BROKER_CERT")]
    broker_cert: Option<PathBuf>,

    /// Client private key file (PEM)
    #[arg(long = "broker-tls-key", env = "CHRONIK_TAIL_BROKER_KEY")]
    broker_key: Option<PathBuf>,

    /// Identity used to derive the consumer group id (defaults to $USER)
    #[arg(long, env = "CHRONIK_TAIL_USER")]
    user: Option<String>,
}

impl TailCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let tls = load_tls(
            self.broker_ca.as_deref(),
            self.broker_cert.as_deref(),
            self.broker_key.as_deref(),
        )?;

        let actor = self
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_default();

        let config = TailConfig::new(&self.topic, actor)
            .with_tail_count(self.tail)
            .with_follow(self.follow)
            .with_listener(&self.listener)
            .with_timeouts(options.timeouts.clone())
            .with_tls(tls);

        let topology = self.topology(options).await?;
        let session = TailSession::kafka(config, &topology)
            .with_context(|| format!("preparing tail of {} via listener {}", self.topic, self.listener))?;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });

        let mut sink = LineSink::new(std::io::stdout());
        let summary = session
            .run(&mut sink, &cancel)
            .await
            .with_context(|| format!("tailing topic {}", self.topic))?;

        info!(
            topic = %self.topic,
            emitted = summary.cursor.emitted,
            cancelled = summary.cursor.cancelled,
            "Tail finished"
        );
        Ok(())
    }

    async fn topology(&self, options: &GlobalOptions) -> Result<ClusterTopology> {
        let source = match &self.kafka_brokers {
            Some(list) => ClusterSource::from_broker_list(list)?,
            None => ClusterSource::ZooKeeper {
                hosts: options.zookeeper.clone(),
                cluster: options.cluster.clone(),
            },
        };

        match source {
            ClusterSource::Static(brokers) => Ok(ClusterTopology::from_static(brokers)),
            ClusterSource::ZooKeeper { hosts, cluster } => {
                let directory = super::directory(&hosts, &cluster, &options.timeouts).await?;
                Ok(directory.topology().await.context("listing brokers")?)
            }
        }
    }
}

fn read_pem(path: Option<&Path>, what: &str) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p).with_context(|| format!("reading {} file {}", what, p.display()))
    })
    .transpose()
}

/// Load TLS material; all paths absent means plaintext.
pub fn load_tls(
    ca: Option<&Path>,
    cert: Option<&Path>,
    key: Option<&Path>,
) -> Result<Option<TlsMaterial>> {
    let ca = read_pem(ca, "CA")?;
    let cert = read_pem(cert, "certificate")?;
    let key = read_pem(key, "private key")?;
    Ok(TlsMaterial::new(ca, cert, key)?)
}
