//! Topic listing command.

use anyhow::{Context, Result};

use crate::GlobalOptions;

/// Show topic list
#[derive(Debug, clap::Args)]
pub struct TopicListCommand {}

impl TopicListCommand {
    pub async fn execute(&self, options: &GlobalOptions) -> Result<()> {
        let directory = super::directory(&options.zookeeper, &options.cluster, &options.timeouts).await?;
        let topics = directory.list_topics().await.context("listing topics")?;

        for topic in topics {
            println!("{}", topic);
        }
        Ok(())
    }
}
