use crate::config::Config;
use crate::error::Error;
use crate::history::HistoryTable;
use chrono::{Local, NaiveDateTime};
use datafusion::arrow::csv::WriterBuilder;
use log::info;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination of a pipeline run.
pub trait PersistenceSink {
    /// Persists a raw document set (the `data` array of a response).
    fn write_documents(&mut self, dataset: &str, documents: &serde_json::Value)
        -> Result<(), Error>;

    /// Persists the normalized historical table.
    fn write_history(&mut self, dataset: &str, history: &HistoryTable) -> Result<(), Error>;

    /// Backend name used in log lines.
    fn backend_type(&self) -> &'static str;
}

/// `<dataset> <DD-MM-YYYY HHhMM>.<extension>`
pub fn dated_file_name(dataset: &str, extension: &str, at: NaiveDateTime) -> String {
    format!("{} {}.{}", dataset, at.format("%d-%m-%Y %Hh%M"), extension)
}

/// Writes JSON documents and history CSVs into two output directories.
pub struct FileSink {
    json_dir: PathBuf,
    csv_dir: PathBuf,
}

impl FileSink {
    pub fn new(config: &Config) -> Self {
        FileSink::with_dirs(&config.json_output_dir, &config.csv_output_dir)
    }

    pub fn with_dirs(json_dir: impl AsRef<Path>, csv_dir: impl AsRef<Path>) -> Self {
        FileSink {
            json_dir: json_dir.as_ref().to_path_buf(),
            csv_dir: csv_dir.as_ref().to_path_buf(),
        }
    }

    /// Writes through a `.tmp` sibling and renames it into place once the
    /// content is fully flushed.
    fn write_file<F>(dir: &Path, file_name: &str, write: F) -> Result<PathBuf, Error>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<(), Error>,
    {
        fs::create_dir_all(dir)?;

        let path = dir.join(file_name);
        let tmp_path = dir.join(format!("{}.tmp", file_name));

        let result = File::create(&tmp_path)
            .map_err(Error::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                write(&mut writer)?;
                writer.flush()?;
                writer.get_ref().sync_all()?;
                Ok(())
            });

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        fs::rename(&tmp_path, &path)?;
        Ok(path)
    }
}

impl PersistenceSink for FileSink {
    fn write_documents(
        &mut self,
        dataset: &str,
        documents: &serde_json::Value,
    ) -> Result<(), Error> {
        let file_name = dated_file_name(dataset, "json", Local::now().naive_local());

        let path = FileSink::write_file(&self.json_dir, &file_name, |writer| {
            let mut ser =
                serde_json::Serializer::with_formatter(writer, PrettyFormatter::with_indent(b"    "));
            documents.serialize(&mut ser)?;
            Ok(())
        })?;

        info!("Saved {} to '{}'", dataset, path.display());
        Ok(())
    }

    fn write_history(&mut self, dataset: &str, history: &HistoryTable) -> Result<(), Error> {
        let batch = history.to_record_batch()?;
        let file_name = dated_file_name(dataset, "csv", Local::now().naive_local());

        let path = FileSink::write_file(&self.csv_dir, &file_name, |writer| {
            let mut csv = WriterBuilder::new().with_header(true).build(writer);
            csv.write(&batch)?;
            Ok(())
        })?;

        info!(
            "Saved {} rows of {} to '{}'",
            history.len(),
            dataset,
            path.display()
        );
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "files"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InsightRecord, TimeSeries};
    use chrono::NaiveDate;
    use datafusion::arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use datafusion::arrow::csv::ReaderBuilder;
    use serde_json::json;
    use tempfile::TempDir;

    fn only_file(dir: &Path) -> PathBuf {
        let entries: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1, "expected exactly one file in {:?}", entries);
        entries.into_iter().next().unwrap()
    }

    fn records() -> Vec<InsightRecord> {
        serde_json::from_value(json!([
            {"campaign_id": "1", "campaign_name": "Promoção", "objective": "OUTCOME_SALES",
             "spend": "12.50", "cpc": "0.30", "cpm": "4.10", "clicks": "7", "frequency": "1.2",
             "date_start": "2025-03-01", "date_stop": "2025-03-01",
             "conversions": [{"action_type": "purchase", "value": "2"}]},
            {"campaign_id": "1", "campaign_name": "Promoção", "objective": "OUTCOME_SALES",
             "spend": "3.00", "cpc": "0.50", "cpm": "2.00", "clicks": "6", "frequency": "1.0",
             "date_start": "2025-03-02", "date_stop": "2025-03-02"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_dated_file_name() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 16)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        assert_eq!(
            dated_file_name("campaign_status", "json", at),
            "campaign_status 16-03-2025 09h05.json"
        );
    }

    #[test]
    fn test_json_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let json_dir = temp_dir.path().join("json");
        let mut sink = FileSink::with_dirs(&json_dir, temp_dir.path().join("csv"));

        let original = records();
        sink.write_documents("campaign_insights", &serde_json::to_value(&original).unwrap())
            .unwrap();

        let path = only_file(&json_dir);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("campaign_insights "));
        assert!(name.ends_with(".json"));

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n    {"));
        assert!(text.contains("Promoção"));

        let read_back: Vec<InsightRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(read_back, original);
    }

    #[test]
    fn test_csv_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let csv_dir = temp_dir.path().join("csv");
        let mut sink = FileSink::with_dirs(temp_dir.path().join("json"), &csv_dir);

        let mut table = HistoryTable::default();
        table.append(TimeSeries::new("1", records()));
        sink.write_history("campaigns_historical_data", &table).unwrap();

        let path = only_file(&csv_dir);
        assert!(path.to_str().unwrap().ends_with(".csv"));

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("entity_id,date_start,date_stop,campaign_id"));
        assert_eq!(text.lines().count(), 3);

        let reader = ReaderBuilder::new(crate::history::history_schema())
            .with_header(true)
            .build(File::open(&path).unwrap())
            .unwrap();
        let batches: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);

        let ids = batch
            .column_by_name("campaign_id")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        let spend = batch
            .column_by_name("spend")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        let clicks = batch
            .column_by_name("clicks")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        let conversion = batch
            .column_by_name("conversion")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();

        assert_eq!(ids.value(0), "1");
        assert_eq!(spend.value(0), 12.50);
        assert_eq!(clicks.value(1), 6);
        assert_eq!(conversion.value(0), 2.0);
        assert!(conversion.is_null(1));
    }

    #[test]
    fn test_no_temporary_files_are_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let json_dir = temp_dir.path().join("json");
        let mut sink = FileSink::with_dirs(&json_dir, temp_dir.path().join("csv"));

        sink.write_documents("adset_status", &json!([{"id": "1", "status": "ACTIVE"}]))
            .unwrap();

        let path = only_file(&json_dir);
        assert_eq!(path.extension().unwrap(), "json");
    }
}
