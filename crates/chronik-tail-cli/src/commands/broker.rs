//! Broker listing command.

use anyhow::{Context, Result};
use chronik_tail::BrokerRecord;
use tabled::Tabled;

use crate::output::{format_json, print_table, print_warning};
use crate::{GlobalOptions, OutputFormat};

/// Show registered brokers and their endpoints
#[derive(Debug, clap::Args)]
pub struct BrokerListCommand {
    /// Only show endpoints for this listener
    #[arg(short, long, env = "CHRONIK_TAIL_LISTENER")]
    listener: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, env = "CHRONIK_TAIL_OUTPUT", default_value = "table")]
    output: OutputFormat,
}

#[derive(Tabled)]
struct BrokerTable {
    #[tabled(rename = "ID")]
    id: i32,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Endpoints")]
    endpoints: String,
}

impl BrokerListCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let directory = super::directory(&options.zookeeper, &options.cluster, &options.timeouts).await?;
        let brokers = directory.list_brokers().await.context("listing brokers")?;

        if let Some(listener) = &self.listener {
            let missing: Vec<String> = brokers
                .iter()
                .filter(|b| b.endpoint(listener).is_none())
                .map(|b| b.id.to_string())
                .collect();
            if !missing.is_empty() {
                print_warning(&format!(
                    "brokers without a {} listener: {}",
                    listener,
                    missing.join(", ")
                ));
            }
        }

        match self.output {
            OutputFormat::Table => {
                let rows = brokers
                    .iter()
                    .map(|b| broker_row(b, self.listener.as_deref()))
                    .collect();
                print_table::<BrokerTable>(rows);
            }
            OutputFormat::Json => {
                println!("{}", format_json(&brokers)?);
            }
        }
        Ok(())
    }
}

fn broker_row(broker: &BrokerRecord, listener: Option<&str>) -> BrokerTable {
    let endpoints = match listener {
        Some(name) => broker.endpoint(name).unwrap_or("-").to_string(),
        None => broker
            .endpoints
            .iter()
            .map(|(name, address)| format!("{}={}", name, address))
            .collect::<Vec<_>>()
            .join(", "),
    };

    BrokerTable {
        id: broker.id,
        host: broker.host.clone().unwrap_or_else(|| "-".to_string()),
        endpoints,
    }
}
