use crate::config::Config;
use crate::error::Error;
use crate::model::{Entity, EntityType, InsightRecord, Level, TimeSeries};
use log::{debug, info};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

/// Insight fields requested from every insights endpoint.
pub const INSIGHT_FIELDS: [&str; 14] = [
    "spend",
    "cpc",
    "cpm",
    "objective",
    "adset_name",
    "adset_id",
    "clicks",
    "campaign_name",
    "campaign_id",
    "conversions",
    "frequency",
    "conversion_values",
    "ad_name",
    "ad_id",
];

const HISTORY_DATE_PRESET: &str = "last_30d";
const HISTORY_TIME_INCREMENT: &str = "1";

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReportingApi: Send + Sync + 'static {
    /// Fetches account-wide insights aggregated at `level`.
    /// # Arguments
    /// * `account_id` - The ad account, without the `act_` prefix.
    /// * `level` - Aggregation level of the returned rows.
    /// # Returns
    /// A Result containing the normalized records or an Error.
    async fn fetch_insights(&self, account_id: &str, level: Level)
        -> Result<Vec<InsightRecord>, Error>;

    /// Fetches id, name and status of every entity of `entity_type` in the account.
    /// Campaigns carry their ad sets as children.
    async fn fetch_entity_status(
        &self,
        account_id: &str,
        entity_type: EntityType,
    ) -> Result<Vec<Entity>, Error>;

    /// Fetches the trailing 30 days of daily insights for one entity.
    async fn fetch_time_series(&self, entity_id: &str) -> Result<TimeSeries, Error>;
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
pub(crate) struct Page<T> {
    pub(crate) data: Vec<T>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct RemoteFailure {
    error: RemoteFailureDetail,
}

#[derive(Deserialize)]
struct RemoteFailureDetail {
    message: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|source| Error::Transport {
                url: config.api_url.clone(),
                source,
            })?;

        Ok(ApiClient {
            client,
            base_url: config.api_url.to_string(),
            token: config.access_token.to_string(),
        })
    }

    pub(crate) fn insights_url(&self, account_id: &str, level: Level) -> Result<Url, Error> {
        let account = format!("act_{}", account_id);
        let mut url = self.endpoint(&[account.as_str(), "insights"])?;
        url.query_pairs_mut()
            .append_pair("level", level.as_str())
            .append_pair("fields", &INSIGHT_FIELDS.join(","));
        Ok(self.authorize(url))
    }

    pub(crate) fn entity_status_url(
        &self,
        account_id: &str,
        entity_type: EntityType,
    ) -> Result<Url, Error> {
        let account = format!("act_{}", account_id);
        let mut url = self.endpoint(&[account.as_str(), entity_type.edge()])?;
        url.query_pairs_mut()
            .append_pair("fields", entity_type.fields());
        Ok(self.authorize(url))
    }

    pub(crate) fn time_series_url(&self, entity_id: &str) -> Result<Url, Error> {
        let mut url = self.endpoint(&[entity_id, "insights"])?;
        url.query_pairs_mut()
            .append_pair("fields", &INSIGHT_FIELDS.join(","))
            .append_pair("date_preset", HISTORY_DATE_PRESET)
            .append_pair("time_increment", HISTORY_TIME_INCREMENT);
        Ok(self.authorize(url))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // The token always goes last so it can be stripped from anything logged.
    fn authorize(&self, mut url: Url) -> Url {
        url.query_pairs_mut().append_pair("access_token", &self.token);
        url
    }

    /// Follows `paging.next` links until exhausted, concatenating every page.
    async fn get_pages<T: DeserializeOwned + Send>(&self, url: Url) -> Result<Vec<T>, Error> {
        let mut rows = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let page: Page<T> = self.get_json(url).await?;
            debug!("received page with {} rows", page.data.len());
            rows.extend(page.data);

            next = page
                .paging
                .and_then(|paging| paging.next)
                .map(|link| Url::parse(&link))
                .transpose()?;
        }

        Ok(rows)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        let target = redacted(&url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| Error::Transport {
                url: target.clone(),
                source: source.without_url(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|source| Error::Transport {
            url: target.clone(),
            source: source.without_url(),
        })?;

        if !status.is_success() {
            return Err(Error::Remote {
                status: status.as_u16(),
                message: remote_message(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait::async_trait]
impl ReportingApi for ApiClient {
    async fn fetch_insights(
        &self,
        account_id: &str,
        level: Level,
    ) -> Result<Vec<InsightRecord>, Error> {
        let url = self.insights_url(account_id, level)?;
        let records: Vec<InsightRecord> = self.get_pages(url).await?;

        info!(
            "Fetched {} {} insight rows for account {}",
            records.len(),
            level.as_str(),
            account_id
        );
        Ok(records)
    }

    async fn fetch_entity_status(
        &self,
        account_id: &str,
        entity_type: EntityType,
    ) -> Result<Vec<Entity>, Error> {
        let url = self.entity_status_url(account_id, entity_type)?;
        let entities: Vec<Entity> = self.get_pages(url).await?;

        info!(
            "Fetched status of {} {} for account {}",
            entities.len(),
            entity_type.edge(),
            account_id
        );
        Ok(entities)
    }

    async fn fetch_time_series(&self, entity_id: &str) -> Result<TimeSeries, Error> {
        let url = self.time_series_url(entity_id)?;
        let records: Vec<InsightRecord> = self.get_pages(url).await?;

        info!("Fetched {} daily rows for entity {}", records.len(), entity_id);
        Ok(TimeSeries::new(entity_id, records))
    }
}

fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

fn remote_message(body: &str) -> String {
    match serde_json::from_str::<RemoteFailure>(body) {
        Ok(failure) => failure.error.message,
        Err(_) => body.trim().to_string(),
    }
}
