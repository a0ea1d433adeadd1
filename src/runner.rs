use crate::api_client::{ApiClient, ReportingApi};
use crate::config::{Config, SinkKind};
use crate::database::SqliteSink;
use crate::error::Error;
use crate::history::{active_ids, summarize, HistoricalAggregator};
use crate::model::{EntityType, Level};
use crate::sink::{FileSink, PersistenceSink};
use datafusion::arrow::util::pretty::pretty_format_batches;
use datafusion::prelude::SessionContext;
use log::{error, info};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

const HISTORY_DATASET: &str = "campaigns_historical_data";

/// Runs one extraction: entity status, account insights, then the history of
/// every active campaign.
///
/// # Returns
/// The number of history rows handed to the sink.
pub async fn run_pipeline(
    api: &dyn ReportingApi,
    account_id: &str,
    level: Level,
    sink: &mut dyn PersistenceSink,
) -> Result<usize, Error> {
    let campaigns = api
        .fetch_entity_status(account_id, EntityType::Campaign)
        .await?;
    sink.write_documents("campaign_status", &serde_json::to_value(&campaigns)?)?;

    let adsets = api
        .fetch_entity_status(account_id, EntityType::AdSet)
        .await?;
    sink.write_documents("adset_status", &serde_json::to_value(&adsets)?)?;

    let insights = api.fetch_insights(account_id, level).await?;
    sink.write_documents(
        &format!("{}_insights", level.as_str()),
        &serde_json::to_value(&insights)?,
    )?;

    let campaign_ids = active_ids(&campaigns);
    if campaign_ids.is_empty() {
        info!("No active campaigns in account {}, skipping history", account_id);
        return Ok(0);
    }

    let history = HistoricalAggregator::new(api)
        .build_history(&campaign_ids)
        .await?;
    sink.write_history(HISTORY_DATASET, &history)?;

    let ctx = SessionContext::new();
    let summary = summarize(&ctx, &history).await?.collect().await?;
    info!(
        "History summary ({} backend):\n{}",
        sink.backend_type(),
        pretty_format_batches(&summary)?
    );

    Ok(history.len())
}

fn open_sink(config: &Config) -> Result<Box<dyn PersistenceSink>, Error> {
    Ok(match config.sink {
        SinkKind::Files => Box::new(FileSink::new(config)),
        SinkKind::Database => Box::new(SqliteSink::open(&config.database_path)?),
    })
}

pub async fn run_once(config: &Config) -> Result<(), Error> {
    let api = ApiClient::new(config)?;
    let mut sink = open_sink(config)?;

    let rows = run_pipeline(&api, &config.account_id, config.level, sink.as_mut()).await?;
    info!("Run finished, {} history rows saved", rows);
    Ok(())
}

/// Runs the pipeline every `every`, forever. A failed run is logged and the
/// next tick proceeds as usual.
pub async fn schedule(config: Config, every: Duration) -> Result<(), Error> {
    info!("Scheduling pipeline every {}s", every.as_secs());

    let mut timer = interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        if let Err(err) = run_once(&config).await {
            error!("Scheduled run failed ({:?}): {}", err.kind(), err);
        }
    }
}
