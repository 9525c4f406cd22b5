//! CSV audit log of every freshly scraped description.
//!
//! One row per winning conditional write. Flushed per row so a crashed run
//! still leaves a usable file.

use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use csv::Writer;
use jobfill_core::error::AppError;
use jobfill_core::job::AuditRecord;
use jobfill_core::traits::AuditLog;

const HEADER: &[&str] = &[
    "job_id",
    "job_title",
    "url",
    "suburb",
    "description_length",
    "job_description",
    "scraped_at",
];

#[derive(Clone)]
pub struct CsvAuditLog {
    writer: Arc<Mutex<Writer<File>>>,
}

impl CsvAuditLog {
    /// Create the audit file and write the header row.
    pub fn create(path: &Path) -> Result<Self, AppError> {
        let file = File::create(path).map_err(|e| {
            AppError::ConfigError(format!(
                "Failed to create audit file {}: {e}",
                path.display()
            ))
        })?;
        let mut writer = Writer::from_writer(file);
        writer
            .write_record(HEADER)
            .and_then(|()| writer.flush().map_err(Into::into))
            .map_err(|e| AppError::Generic(format!("Failed to write audit header: {e}")))?;

        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
        })
    }
}

impl AuditLog for CsvAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<(), AppError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| AppError::Generic("Audit writer lock poisoned".into()))?;
        writer
            .write_record([
                record.job_id.to_string(),
                record.title.clone(),
                record.url.clone(),
                record.suburb.clone().unwrap_or_default(),
                record.description.len().to_string(),
                record.description.clone(),
                record.scraped_at.to_rfc3339(),
            ])
            .and_then(|()| writer.flush().map_err(Into::into))
            .map_err(|e| AppError::Generic(format!("Failed to write audit row: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(job_id: i64) -> AuditRecord {
        AuditRecord {
            job_id,
            title: format!("Job {job_id}"),
            url: format!("https://example.com/job/{job_id}"),
            suburb: Some("Perth".to_string()),
            description: "A role, with a comma".to_string(),
            scraped_at: Utc::now(),
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.csv");
        let log = CsvAuditLog::create(&path).unwrap();

        log.record(&record(1)).unwrap();
        log.record(&record(2)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "job_id,job_title,url,suburb,description_length,job_description,scraped_at"
        );
        assert_eq!(lines.count(), 2);
        assert!(content.contains("\"A role, with a comma\""));
    }

    #[test]
    fn missing_suburb_writes_empty_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.csv");
        let log = CsvAuditLog::create(&path).unwrap();

        let mut rec = record(7);
        rec.suburb = None;
        log.record(&rec).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.lines().nth(1).unwrap().contains(",,"));
    }
}
