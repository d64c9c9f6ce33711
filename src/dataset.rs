//! Best-effort side channels downstream of a recorded donation or request:
//! the append-only CSV files the offline model trains on, and the
//! fire-and-forget retraining trigger. Failures here are logged and never
//! surfaced to the caller; the stored record is the durability boundary.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{fs::OpenOptions, io::AsyncWriteExt, process::Command, sync::Mutex};
use tracing::{info, warn};

use crate::models::{DonationRecord, RequestRecord};

const REALTIME_FILE: &str = "realtime_data.csv";
const REALTIME_HEADER: &str = "date,city,blood_type,type,units,urgency,is_emergency,weather,age,gender";
const TRANSFUSION_FILE: &str = "updated_transfusion.csv";
const REFRESH_SCRIPT: &str = "update_realtime_model.py";

#[derive(Clone)]
pub struct DatasetWriter {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DatasetWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Flattened training row for a recorded donation.
    pub async fn record_donation(&self, record: &DonationRecord) {
        let row = format!(
            "{},{},{},donation,{},normal,{},{},{},{}",
            record.donation_date.to_rfc3339(),
            record.city,
            record.blood_type,
            record.units_collected,
            record.is_emergency,
            record.weather,
            record.donor_age,
            record.donor_gender,
        );
        self.append(REALTIME_FILE, Some(REALTIME_HEADER), row).await;
    }

    /// Flattened training row for a recorded request. Requests carry no
    /// weather observation, so that column reads `unknown`.
    pub async fn record_request(&self, record: &RequestRecord) {
        let row = format!(
            "{},{},{},request,{},{},false,unknown,{},{}",
            record.request_date.to_rfc3339(),
            record.city,
            record.blood_type,
            record.units_required,
            record.urgency_level,
            record.patient_age,
            record.patient_gender,
        );
        self.append(REALTIME_FILE, Some(REALTIME_HEADER), row).await;
    }

    /// Legacy transfusion dataset row written by `POST /api/donate`.
    pub async fn record_transfusion(
        &self,
        frequency: i64,
        units: i64,
        blood_type: &str,
        donor_id: &str,
    ) {
        let row = format!("{frequency},{units},0,{blood_type},{donor_id}");
        self.append(TRANSFUSION_FILE, None, row).await;
    }

    async fn append(&self, file: &str, header: Option<&str>, row: String) {
        if let Err(err) = self.try_append(file, header, &row).await {
            warn!(file, error = %err, "dataset append failed");
        }
    }

    async fn try_append(&self, file: &str, header: Option<&str>, row: &str) -> std::io::Result<()> {
        // Appends serialize on the lock, so only the first writer can see an
        // empty file below.
        let _guard = self.lock.lock().await;
        let path = self.dir.join(file);
        let mut out = OpenOptions::new().create(true).append(true).open(&path).await?;
        if out.metadata().await?.len() == 0 {
            if let Some(header) = header {
                out.write_all(header.as_bytes()).await?;
                out.write_all(b"\n").await?;
            }
        }
        out.write_all(row.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}

/// Kicks off the external model refresh and forgets about it; completion is
/// only ever logged.
pub fn trigger_model_refresh(python_bin: &str, data_dir: &Path) {
    let python = python_bin.to_string();
    let dir = data_dir.to_path_buf();
    tokio::spawn(async move {
        match Command::new(&python)
            .arg(REFRESH_SCRIPT)
            .current_dir(&dir)
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                info!("real-time analytics refresh completed");
            }
            Ok(output) => {
                warn!(code = ?output.status.code(), "real-time analytics refresh failed");
            }
            Err(err) => {
                warn!(error = %err, "could not launch real-time analytics refresh");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BloodType, DonationType, EventKind, Gender, Weather};
    use crate::store::new_id;
    use chrono::Utc;

    fn record() -> DonationRecord {
        DonationRecord {
            id: new_id(),
            donor_id: "donor-1".into(),
            donor_name: "Donor".into(),
            blood_type: BloodType::OPositive,
            city: "Delhi".into(),
            state: "Delhi".into(),
            hospital_id: "H1".into(),
            hospital_name: "General".into(),
            donation_date: Utc::now(),
            units_collected: 2,
            donation_type: DonationType::WholeBlood,
            donor_age: 31,
            donor_gender: Gender::Female,
            is_emergency: false,
            weather: Weather::Rainy,
            event_type: EventKind::Camp,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn header_is_written_once_then_rows_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DatasetWriter::new(dir.path().to_path_buf());

        writer.record_donation(&record()).await;
        writer.record_donation(&record()).await;

        let contents = std::fs::read_to_string(dir.path().join(REALTIME_FILE)).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], REALTIME_HEADER);
        assert!(lines[1].contains(",Delhi,O+,donation,2,normal,false,rainy,31,female"));
    }

    #[tokio::test]
    async fn concurrent_first_appends_write_one_header() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DatasetWriter::new(dir.path().to_path_buf());

        let record = record();
        tokio::join!(
            writer.record_donation(&record),
            writer.record_donation(&record),
            writer.record_donation(&record),
        );

        let contents = std::fs::read_to_string(dir.path().join(REALTIME_FILE)).unwrap();
        let headers = contents
            .lines()
            .filter(|line| *line == REALTIME_HEADER)
            .count();
        assert_eq!(headers, 1);
        assert_eq!(contents.lines().count(), 4);
    }

    #[tokio::test]
    async fn transfusion_rows_have_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DatasetWriter::new(dir.path().to_path_buf());

        writer.record_transfusion(3, 2, "B+", "donor-9").await;

        let contents = std::fs::read_to_string(dir.path().join(TRANSFUSION_FILE)).unwrap();
        assert_eq!(contents, "3,2,0,B+,donor-9\n");
    }
}
