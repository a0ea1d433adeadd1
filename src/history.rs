use crate::api_client::ReportingApi;
use crate::error::Error;
use crate::model::{Entity, InsightRecord, TimeSeries};
use chrono::{NaiveDate, NaiveDateTime};
use datafusion::arrow::array::{
    Date32Builder, Float64Builder, Int64Builder, RecordBatch, StringBuilder,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::functions_aggregate::average::avg;
use datafusion::functions_aggregate::count::count;
use datafusion::functions_aggregate::sum::sum;
use datafusion::prelude::{col, DataFrame, SessionContext};
use log::{debug, info};
use std::sync::Arc;

/// One history row tagged with the entity it was fetched for.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub entity_id: String,
    pub record: InsightRecord,
}

/// Rows of several time series, in input-id order then chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryTable {
    rows: Vec<HistoryRow>,
}

impl HistoryTable {
    pub fn append(&mut self, series: TimeSeries) {
        let TimeSeries {
            entity_id,
            records,
        } = series;

        self.rows.extend(records.into_iter().map(|record| HistoryRow {
            entity_id: entity_id.clone(),
            record,
        }));
    }

    pub fn rows(&self) -> &[HistoryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Converts the table into a single Arrow batch with [`history_schema`].
    pub fn to_record_batch(&self) -> Result<RecordBatch, Error> {
        let n = self.rows.len();

        let mut entity_id = StringBuilder::new();
        let mut date_start = Date32Builder::with_capacity(n);
        let mut date_stop = Date32Builder::with_capacity(n);
        let mut campaign_id = StringBuilder::new();
        let mut campaign_name = StringBuilder::new();
        let mut adset_id = StringBuilder::new();
        let mut adset_name = StringBuilder::new();
        let mut ad_id = StringBuilder::new();
        let mut ad_name = StringBuilder::new();
        let mut objective = StringBuilder::new();
        let mut spend = Float64Builder::with_capacity(n);
        let mut cpc = Float64Builder::with_capacity(n);
        let mut cpm = Float64Builder::with_capacity(n);
        let mut frequency = Float64Builder::with_capacity(n);
        let mut clicks = Int64Builder::with_capacity(n);
        let mut conversion = Float64Builder::with_capacity(n);
        let mut conversion_value = Float64Builder::with_capacity(n);

        for row in &self.rows {
            let r = &row.record;
            entity_id.append_value(&row.entity_id);
            date_start.append_option(r.date_start.map(days_since_epoch));
            date_stop.append_option(r.date_stop.map(days_since_epoch));
            campaign_id.append_option(r.campaign_id.as_deref());
            campaign_name.append_option(r.campaign_name.as_deref());
            adset_id.append_option(r.adset_id.as_deref());
            adset_name.append_option(r.adset_name.as_deref());
            ad_id.append_option(r.ad_id.as_deref());
            ad_name.append_option(r.ad_name.as_deref());
            objective.append_option(r.objective.as_deref());
            spend.append_value(r.spend);
            cpc.append_value(r.cpc);
            cpm.append_value(r.cpm);
            frequency.append_value(r.frequency);
            clicks.append_value(r.clicks);
            conversion.append_option(r.conversion);
            conversion_value.append_option(r.conversion_value);
        }

        let batch = RecordBatch::try_new(
            history_schema(),
            vec![
                Arc::new(entity_id.finish()),
                Arc::new(date_start.finish()),
                Arc::new(date_stop.finish()),
                Arc::new(campaign_id.finish()),
                Arc::new(campaign_name.finish()),
                Arc::new(adset_id.finish()),
                Arc::new(adset_name.finish()),
                Arc::new(ad_id.finish()),
                Arc::new(ad_name.finish()),
                Arc::new(objective.finish()),
                Arc::new(spend.finish()),
                Arc::new(cpc.finish()),
                Arc::new(cpm.finish()),
                Arc::new(frequency.finish()),
                Arc::new(clicks.finish()),
                Arc::new(conversion.finish()),
                Arc::new(conversion_value.finish()),
            ],
        )?;

        Ok(batch)
    }
}

/// Creates the schema of the historical table.
///
/// # Returns
/// A [`SchemaRef`] with the entity id, the reporting window, the entity
/// identifiers and names, and the coerced metrics.
pub fn history_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("entity_id", DataType::Utf8, false),
        Field::new("date_start", DataType::Date32, true),
        Field::new("date_stop", DataType::Date32, true),
        Field::new("campaign_id", DataType::Utf8, true),
        Field::new("campaign_name", DataType::Utf8, true),
        Field::new("adset_id", DataType::Utf8, true),
        Field::new("adset_name", DataType::Utf8, true),
        Field::new("ad_id", DataType::Utf8, true),
        Field::new("ad_name", DataType::Utf8, true),
        Field::new("objective", DataType::Utf8, true),
        Field::new("spend", DataType::Float64, false),
        Field::new("cpc", DataType::Float64, false),
        Field::new("cpm", DataType::Float64, false),
        Field::new("frequency", DataType::Float64, false),
        Field::new("clicks", DataType::Int64, false),
        Field::new("conversion", DataType::Float64, true),
        Field::new("conversion_value", DataType::Float64, true),
    ]))
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - NaiveDateTime::UNIX_EPOCH.date()).num_days() as i32
}

/// Ids of the entities whose status is exactly `ACTIVE`, in listing order.
pub fn active_ids(entities: &[Entity]) -> Vec<String> {
    entities
        .iter()
        .filter(|entity| entity.is_active())
        .map(|entity| entity.id.clone())
        .collect()
}

pub struct HistoricalAggregator<'a, A: ReportingApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: ReportingApi + ?Sized> HistoricalAggregator<'a, A> {
    pub fn new(api: &'a A) -> Self {
        HistoricalAggregator { api }
    }

    /// Fetches the time series of every entity, one at a time, into one table.
    ///
    /// The first entity that fails aborts the whole aggregation; rows already
    /// fetched for earlier entities are discarded.
    pub async fn build_history(&self, entity_ids: &[String]) -> Result<HistoryTable, Error> {
        let mut table = HistoryTable::default();

        for entity_id in entity_ids {
            let series = self
                .api
                .fetch_time_series(entity_id)
                .await
                .map_err(|source| Error::EntityFailed {
                    entity_id: entity_id.clone(),
                    source: Box::new(source),
                })?;

            debug!("appending {} rows for {}", series.records.len(), entity_id);
            table.append(series);
        }

        info!(
            "Built history of {} rows for {} entities",
            table.len(),
            entity_ids.len()
        );
        Ok(table)
    }
}

/// Per-entity totals over the history table: days covered, total spend and
/// clicks, average cpc and cpm.
pub async fn summarize(ctx: &SessionContext, table: &HistoryTable) -> Result<DataFrame, Error> {
    let df = ctx.read_batch(table.to_record_batch()?)?;

    let summary = df
        .aggregate(
            vec![col("entity_id")],
            vec![
                count(col("spend")).alias("days"),
                sum(col("spend")).alias("total_spend"),
                sum(col("clicks")).alias("total_clicks"),
                avg(col("cpc")).alias("avg_cpc"),
                avg(col("cpm")).alias("avg_cpm"),
            ],
        )?
        .sort(vec![col("entity_id").sort(true, false)])?;

    Ok(summary)
}
