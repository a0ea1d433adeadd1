use crate::model::Level;
use clap::{Args as ClapArgs, ValueEnum};
use std::time::Duration;

const DEFAULT_API_URL: &str = "https://graph.facebook.com/v22.0";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const JSON_OUTPUT_DIR: &str = "output_json_files";
const CSV_OUTPUT_DIR: &str = "output_csv_files";
const DATABASE_PATH: &str = "meta_ads.db";
const LOG_DIR: &str = "logs";

/// Where the normalized history ends up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    Files,
    Database,
}

#[derive(ClapArgs, Clone)]
pub struct Config {
    #[arg(long, default_value = DEFAULT_API_URL, env = "GRAPH_API_URL")]
    pub(crate) api_url: String,

    #[arg(long, env = "AD_ACC_TOKEN", hide_env_values = true)]
    pub(crate) access_token: String,

    #[arg(long, env = "AD_ACC_ID")]
    pub(crate) account_id: String,

    #[arg(
        long,
        default_value_t = DEFAULT_TIMEOUT_SECS,
        env = "REQUEST_TIMEOUT_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub(crate) request_timeout_secs: u64,

    #[arg(long, value_enum, default_value_t = Level::Campaign, env = "INSIGHTS_LEVEL")]
    pub(crate) level: Level,

    #[arg(long, value_enum, default_value_t = SinkKind::Files, env = "SINK")]
    pub(crate) sink: SinkKind,

    #[arg(long, default_value = JSON_OUTPUT_DIR, env = "JSON_OUTPUT_DIR")]
    pub(crate) json_output_dir: String,

    #[arg(long, default_value = CSV_OUTPUT_DIR, env = "CSV_OUTPUT_DIR")]
    pub(crate) csv_output_dir: String,

    #[arg(long, default_value = DATABASE_PATH, env = "DATABASE_PATH")]
    pub(crate) database_path: String,

    #[arg(long, default_value = LOG_DIR, env = "LOG_DIR")]
    pub(crate) log_dir: String,
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
pub(crate) fn test_config(api_url: &str) -> Config {
    Config {
        api_url: api_url.to_string(),
        access_token: "test_token".to_string(),
        account_id: "1234".to_string(),
        request_timeout_secs: 2,
        level: Level::Campaign,
        sink: SinkKind::Files,
        json_output_dir: "json".to_string(),
        csv_output_dir: "csv".to_string(),
        database_path: "test.db".to_string(),
        log_dir: "logs".to_string(),
    }
}
