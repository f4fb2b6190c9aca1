use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use engagement_server::startup;
use engagement_sync::{Config, SyncOutcome, SyncPipeline, SyncStatus};

#[derive(Parser)]
#[command(
    name = "engagement-server",
    about = "Sync Mailchimp email engagement into Regal"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve {
        /// Sync the configured campaign once, in the background, after binding
        #[arg(long)]
        trigger_on_start: bool,
    },
    /// Sync one campaign and exit
    SyncCampaign {
        /// Defaults to MAILCHIMP_CAMPAIGN_ID
        #[arg(long)]
        campaign_id: Option<String>,
    },
    /// Sync every campaign sent to a list within the lookback window and exit
    SyncList {
        /// Defaults to MAILCHIMP_LIST_ID
        #[arg(long)]
        list_id: Option<String>,
        /// Defaults to LOOKBACK_HOURS
        #[arg(long)]
        since_hours: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    startup::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let pipeline = Arc::new(SyncPipeline::from_config(&config)?);

    match cli.command.unwrap_or(Command::Serve {
        trigger_on_start: false,
    }) {
        Command::Serve { trigger_on_start } => {
            let addr = format!("{}:{}", config.web_host, config.web_port);
            startup::serve(pipeline, &addr, trigger_on_start).await
        }
        Command::SyncCampaign { campaign_id } => {
            let Some(campaign_id) = campaign_id.or(config.mailchimp_campaign_id.clone()) else {
                bail!("--campaign-id or MAILCHIMP_CAMPAIGN_ID is required");
            };
            report(pipeline.sync_campaign(&campaign_id, None).await)
        }
        Command::SyncList {
            list_id,
            since_hours,
        } => {
            let Some(list_id) = list_id.or(config.mailchimp_list_id.clone()) else {
                bail!("--list-id or MAILCHIMP_LIST_ID is required");
            };
            let since = pipeline.lookback_since(Utc::now(), since_hours)?;
            report(pipeline.sync_list(&list_id, Some(since)).await)
        }
    }
}

fn report(outcome: SyncOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if outcome.status == SyncStatus::Error {
        bail!(outcome.message);
    }
    Ok(())
}
