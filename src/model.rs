use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

/// Aggregation level of an account-wide insights query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Level {
    Campaign,
    #[value(name = "adset")]
    AdSet,
    Ad,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Campaign => "campaign",
            Level::AdSet => "adset",
            Level::Ad => "ad",
        }
    }
}

/// Entity collections that expose a status listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityType {
    Campaign,
    AdSet,
}

impl EntityType {
    pub fn edge(&self) -> &'static str {
        match self {
            EntityType::Campaign => "campaigns",
            EntityType::AdSet => "adsets",
        }
    }

    pub fn fields(&self) -> &'static str {
        match self {
            EntityType::Campaign => "name,status,adsets{name,id}",
            EntityType::AdSet => "name,status,id",
        }
    }
}

/// Lifecycle status; values without a dedicated variant keep their raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityStatus {
    Active,
    Paused,
    Deleted,
    Archived,
    Other(String),
}

impl EntityStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EntityStatus::Active => "ACTIVE",
            EntityStatus::Paused => "PAUSED",
            EntityStatus::Deleted => "DELETED",
            EntityStatus::Archived => "ARCHIVED",
            EntityStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for EntityStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ACTIVE" => EntityStatus::Active,
            "PAUSED" => EntityStatus::Paused,
            "DELETED" => EntityStatus::Deleted,
            "ARCHIVED" => EntityStatus::Archived,
            _ => EntityStatus::Other(raw),
        }
    }
}

impl From<EntityStatus> for String {
    fn from(status: EntityStatus) -> Self {
        match status {
            EntityStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// A campaign, ad set or ad as returned by a status listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
    #[serde(
        default,
        rename = "adsets",
        with = "edge",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub children: Vec<Entity>,
    /// Any other field the listing returned, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity {
    pub fn is_active(&self) -> bool {
        self.status == Some(EntityStatus::Active)
    }
}

/// Nested entities arrive wrapped in their own `{"data": [...]}` edge.
mod edge {
    use super::Entity;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct EdgeRef<'a> {
        data: &'a [Entity],
    }

    #[derive(Deserialize)]
    struct Edge {
        data: Vec<Entity>,
    }

    pub fn serialize<S: Serializer>(children: &[Entity], serializer: S) -> Result<S::Ok, S::Error> {
        EdgeRef { data: children }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Entity>, D::Error> {
        Edge::deserialize(deserializer).map(|edge| edge.data)
    }
}

/// One row of metrics for one entity over one reporting window.
///
/// Numeric metrics arrive as strings from the API and are coerced while
/// deserializing; a record missing any of them is rejected. The action lists
/// and unmodelled fields are kept as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireInsight")]
pub struct InsightRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adset_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    pub spend: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub clicks: i64,
    pub frequency: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_stop: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion_value: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conversions: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conversion_values: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accepts both the API shape (`conversions: [{value}]`) and the flattened
/// shape this crate writes back out (`conversion: <number>`).
#[derive(Deserialize)]
struct WireInsight {
    #[serde(default)]
    campaign_id: Option<String>,
    #[serde(default)]
    campaign_name: Option<String>,
    #[serde(default)]
    adset_id: Option<String>,
    #[serde(default)]
    adset_name: Option<String>,
    #[serde(default)]
    ad_id: Option<String>,
    #[serde(default)]
    ad_name: Option<String>,
    #[serde(default)]
    objective: Option<String>,
    #[serde(deserialize_with = "decimal")]
    spend: f64,
    #[serde(deserialize_with = "decimal")]
    cpc: f64,
    #[serde(deserialize_with = "decimal")]
    cpm: f64,
    #[serde(deserialize_with = "count")]
    clicks: i64,
    #[serde(deserialize_with = "decimal")]
    frequency: f64,
    #[serde(default)]
    date_start: Option<NaiveDate>,
    #[serde(default)]
    date_stop: Option<NaiveDate>,
    #[serde(default)]
    conversions: Vec<Value>,
    #[serde(default)]
    conversion_values: Vec<Value>,
    #[serde(default)]
    conversion: Option<f64>,
    #[serde(default)]
    conversion_value: Option<f64>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct ActionValue {
    #[serde(deserialize_with = "decimal")]
    value: f64,
}

/// Numeric `value` of the first action in a list, if the list has one.
fn first_action_value(actions: &[Value], field: &str) -> Result<Option<f64>, String> {
    match actions.first() {
        None => Ok(None),
        Some(action) => serde_json::from_value::<ActionValue>(action.clone())
            .map(|a| Some(a.value))
            .map_err(|e| format!("invalid {}[0]: {}", field, e)),
    }
}

impl TryFrom<WireInsight> for InsightRecord {
    type Error = String;

    fn try_from(wire: WireInsight) -> Result<Self, Self::Error> {
        let conversion =
            first_action_value(&wire.conversions, "conversions")?.or(wire.conversion);
        let conversion_value =
            first_action_value(&wire.conversion_values, "conversion_values")?
                .or(wire.conversion_value);

        Ok(InsightRecord {
            campaign_id: wire.campaign_id,
            campaign_name: wire.campaign_name,
            adset_id: wire.adset_id,
            adset_name: wire.adset_name,
            ad_id: wire.ad_id,
            ad_name: wire.ad_name,
            objective: wire.objective,
            spend: wire.spend,
            cpc: wire.cpc,
            cpm: wire.cpm,
            clicks: wire.clicks,
            frequency: wire.frequency,
            date_start: wire.date_start,
            date_stop: wire.date_stop,
            conversion,
            conversion_value,
            conversions: wire.conversions,
            conversion_values: wire.conversion_values,
            extra: wire.extra,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalRepr {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountRepr {
    Number(i64),
    Text(String),
}

fn decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match DecimalRepr::deserialize(deserializer)? {
        DecimalRepr::Number(n) => Ok(n),
        DecimalRepr::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid decimal '{}'", s))),
    }
}

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match CountRepr::deserialize(deserializer)? {
        CountRepr::Number(n) => Ok(n),
        CountRepr::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid count '{}'", s))),
    }
}

/// Daily insight history of a single entity, oldest day first.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub entity_id: String,
    pub records: Vec<InsightRecord>,
}

impl TimeSeries {
    pub fn new(entity_id: impl Into<String>, mut records: Vec<InsightRecord>) -> Self {
        records.sort_by_key(|r| r.date_start);
        TimeSeries {
            entity_id: entity_id.into(),
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_strings_are_coerced() {
        let record: InsightRecord = serde_json::from_value(json!({
            "spend": "12.50",
            "cpc": "0.30",
            "cpm": "4.10",
            "clicks": "7",
            "frequency": "1.2"
        }))
        .unwrap();

        assert_eq!(record.spend, 12.50);
        assert_eq!(record.cpc, 0.30);
        assert_eq!(record.cpm, 4.10);
        assert_eq!(record.clicks, 7);
        assert_eq!(record.frequency, 1.2);
        assert_eq!(record.conversion, None);
    }

    #[test]
    fn test_first_conversion_is_flattened() {
        let record: InsightRecord = serde_json::from_value(json!({
            "spend": "1", "cpc": "1", "cpm": "1", "clicks": "1", "frequency": "1",
            "conversions": [
                {"action_type": "offsite_conversion.fb_pixel_lead", "value": "3"},
                {"action_type": "offsite_conversion.fb_pixel_purchase", "value": "9"}
            ],
            "conversion_values": [{"action_type": "offsite_conversion.fb_pixel_purchase", "value": "150.75"}]
        }))
        .unwrap();

        assert_eq!(record.conversion, Some(3.0));
        assert_eq!(record.conversion_value, Some(150.75));
    }

    #[test]
    fn test_empty_conversions_stay_absent() {
        let record: InsightRecord = serde_json::from_value(json!({
            "spend": "1", "cpc": "1", "cpm": "1", "clicks": "1", "frequency": "1",
            "conversions": []
        }))
        .unwrap();

        assert_eq!(record.conversion, None);
        let serialized = serde_json::to_value(&record).unwrap();
        assert!(serialized.get("conversion").is_none());
    }

    #[test]
    fn test_missing_required_metric_is_rejected() {
        let result = serde_json::from_value::<InsightRecord>(json!({
            "spend": "1", "cpc": "1", "clicks": "1", "frequency": "1"
        }));
        assert!(result.unwrap_err().to_string().contains("cpm"));
    }

    #[test]
    fn test_non_numeric_metric_is_rejected() {
        let result = serde_json::from_value::<InsightRecord>(json!({
            "spend": "n/a", "cpc": "1", "cpm": "1", "clicks": "1", "frequency": "1"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_campaign_with_nested_adsets() {
        let entity: Entity = serde_json::from_value(json!({
            "id": "120",
            "name": "Spring",
            "status": "ACTIVE",
            "adsets": {"data": [{"name": "Broad", "id": "121"}], "paging": {}}
        }))
        .unwrap();

        assert!(entity.is_active());
        assert_eq!(entity.children.len(), 1);
        assert_eq!(entity.children[0].id, "121");
        assert_eq!(entity.children[0].status, None);
    }

    #[test]
    fn test_unknown_status_is_not_active() {
        let entity: Entity =
            serde_json::from_value(json!({"id": "1", "name": "X", "status": "WITH_ISSUES"})).unwrap();
        assert_eq!(
            entity.status,
            Some(EntityStatus::Other("WITH_ISSUES".to_string()))
        );
        assert!(!entity.is_active());
    }

    #[test]
    fn test_status_document_keeps_raw_values() {
        let listing = json!([
            {"id": "9", "name": "Z", "status": "WITH_ISSUES", "effective_status": "CAMPAIGN_PAUSED"},
            {"id": "10", "name": "W", "status": "ACTIVE",
             "adsets": {"data": [{"name": "Broad", "id": "11"}]}}
        ]);
        let entities: Vec<Entity> = serde_json::from_value(listing.clone()).unwrap();

        assert_eq!(serde_json::to_value(&entities).unwrap(), listing);
    }

    #[test]
    fn test_insight_document_keeps_action_lists() {
        let conversions = json!([
            {"action_type": "offsite_conversion.fb_pixel_lead", "value": "3"},
            {"action_type": "offsite_conversion.fb_pixel_purchase", "value": "9"}
        ]);
        let record: InsightRecord = serde_json::from_value(json!({
            "spend": "1", "cpc": "1", "cpm": "1", "clicks": "1", "frequency": "1",
            "conversions": conversions.clone(),
            "account_currency": "BRL"
        }))
        .unwrap();

        let written = serde_json::to_value(&record).unwrap();
        assert_eq!(written["conversions"], conversions);
        assert_eq!(written["conversion"], json!(3.0));
        assert_eq!(written["account_currency"], json!("BRL"));

        let read_back: InsightRecord = serde_json::from_value(written).unwrap();
        assert_eq!(read_back, record);
    }

    #[test]
    fn test_first_conversion_without_value_is_rejected() {
        let result = serde_json::from_value::<InsightRecord>(json!({
            "spend": "1", "cpc": "1", "cpm": "1", "clicks": "1", "frequency": "1",
            "conversions": [{"action_type": "lead"}]
        }));
        assert!(result.unwrap_err().to_string().contains("conversions[0]"));
    }

    #[test]
    fn test_time_series_is_chronological() {
        let day = |d: &str| -> InsightRecord {
            serde_json::from_value(json!({
                "spend": "1", "cpc": "1", "cpm": "1", "clicks": "1", "frequency": "1",
                "date_start": d, "date_stop": d
            }))
            .unwrap()
        };
        let series = TimeSeries::new("1", vec![day("2025-03-02"), day("2025-03-01")]);
        assert_eq!(
            series.records[0].date_start,
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
    }
}
