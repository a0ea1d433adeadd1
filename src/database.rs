use crate::error::Error;
use crate::history::{HistoryRow, HistoryTable};
use crate::sink::PersistenceSink;
use log::{debug, error, info};
use rusqlite::{params, Connection, Transaction};
use std::path::Path;

const CREATE_CAMPAIGN_TABLE: &str = "CREATE TABLE IF NOT EXISTS campaign (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    spend REAL NOT NULL,
    cpc REAL NOT NULL,
    cpm REAL NOT NULL,
    objective TEXT NOT NULL,
    clicks INTEGER NOT NULL,
    campaign_name TEXT NOT NULL,
    campaign_id TEXT NOT NULL,
    frequency REAL NOT NULL,
    date_start DATE NOT NULL,
    date_stop DATE NOT NULL,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// Stores normalized history rows in the `campaign` table.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, Error> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path.as_ref())?;
        conn.execute(CREATE_CAMPAIGN_TABLE, [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_campaign_id_date ON campaign(campaign_id, date_start)",
            [],
        )?;

        info!("SQLite database ready at {}", db_path.as_ref().display());
        Ok(SqliteSink { conn })
    }

    fn insert_rows(tx: &Transaction, history: &HistoryTable) -> Result<usize, Error> {
        let mut stmt = tx.prepare(
            "INSERT INTO campaign (spend, cpc, cpm, objective, clicks, campaign_name,
                                   campaign_id, frequency, date_start, date_stop)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;

        for row in history.rows() {
            let r = &row.record;
            stmt.execute(params![
                r.spend,
                r.cpc,
                r.cpm,
                required(row, "objective", &r.objective)?,
                r.clicks,
                required(row, "campaign_name", &r.campaign_name)?,
                required(row, "campaign_id", &r.campaign_id)?,
                r.frequency,
                required(row, "date_start", &r.date_start)?,
                required(row, "date_stop", &r.date_stop)?,
            ])?;
        }

        Ok(history.len())
    }
}

fn required<'a, T>(
    row: &HistoryRow,
    field: &'static str,
    value: &'a Option<T>,
) -> Result<&'a T, Error> {
    value.as_ref().ok_or_else(|| Error::IncompleteRecord {
        field,
        entity_id: row.entity_id.clone(),
    })
}

impl PersistenceSink for SqliteSink {
    fn write_documents(
        &mut self,
        dataset: &str,
        _documents: &serde_json::Value,
    ) -> Result<(), Error> {
        debug!("{} is not stored by the SQLite backend", dataset);
        Ok(())
    }

    fn write_history(&mut self, dataset: &str, history: &HistoryTable) -> Result<(), Error> {
        let tx = self.conn.transaction()?;

        match SqliteSink::insert_rows(&tx, history) {
            Ok(inserted) => {
                tx.commit()?;
                info!("Inserted {} rows of {} into campaign", inserted, dataset);
                Ok(())
            }
            Err(err) => {
                error!("Failed to save {}, rolling back: {}", dataset, err);
                if let Err(rollback_err) = tx.rollback() {
                    error!("Rollback of {} failed: {}", dataset, rollback_err);
                }
                Err(err)
            }
        }
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
