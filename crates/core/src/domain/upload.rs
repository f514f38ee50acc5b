//! Contact-list CSV parsing and validation.
//!
//! Row validation mirrors what the outbound provider accepts: a non-empty
//! name and a phone number that normalizes to 10-15 digits. Invalid rows are
//! collected as human-readable errors (numbered from 2 to account for the
//! header line) instead of failing the whole upload.

use std::io::Read;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AssistantId;

const REQUIRED_COLUMNS: [&str; 2] = ["name", "phone_number"];

/// One validated contact, phone already normalized to bare digits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRow {
    pub name: String,
    pub phone_number: String,
    pub notes: Option<String>,
}

/// Upload manifest row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CsvUpload {
    pub id: String,
    pub filename: String,
    pub agent_id: AssistantId,
    pub uploaded_at: DateTime<Utc>,
    pub row_count: i64,
    pub processed: bool,
    pub file_path: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub valid: Vec<ContactRow>,
    pub errors: Vec<String>,
    pub total_rows: usize,
}

impl UploadReport {
    pub fn invalid_rows(&self) -> usize {
        self.total_rows - self.valid.len()
    }
}

/// Strip common formatting (`(`, `)`, `-`, `+` and spaces) and require a
/// 10-15 digit result.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String =
        raw.trim().chars().filter(|c| !matches!(c, '(' | ')' | '-' | '+' | ' ')).collect();
    if digits.len() >= 10 && digits.len() <= 15 && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

pub fn parse_contacts<R: Read>(reader: R) -> UploadReport {
    let mut report = UploadReport::default();
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = match csv_reader.headers() {
        Ok(headers) => headers.clone(),
        Err(error) => {
            report.errors.push(format!("Error reading CSV file: {error}"));
            return report;
        }
    };

    let column = |name: &str| headers.iter().position(|header| header == name);
    let (name_idx, phone_idx) = match (column("name"), column("phone_number")) {
        (Some(name_idx), Some(phone_idx)) => (name_idx, phone_idx),
        (name_idx, phone_idx) => {
            let missing: Vec<&str> = REQUIRED_COLUMNS
                .iter()
                .copied()
                .zip([name_idx, phone_idx])
                .filter(|(_, found)| found.is_none())
                .map(|(required, _)| required)
                .collect();
            report.errors.push(format!("Missing required columns: {}", missing.join(", ")));
            return report;
        }
    };
    let notes_idx = column("notes");

    for (index, record) in csv_reader.records().enumerate() {
        // Header occupies line 1 of the file.
        let line = index + 2;
        report.total_rows += 1;

        let record = match record {
            Ok(record) => record,
            Err(error) => {
                report.errors.push(format!("Row {line}: Error processing row - {error}"));
                continue;
            }
        };

        let name = record.get(name_idx).unwrap_or_default().trim();
        if name.is_empty() {
            report.errors.push(format!("Row {line}: Name is required"));
            continue;
        }

        let raw_phone = record.get(phone_idx).unwrap_or_default().trim();
        if raw_phone.is_empty() {
            report.errors.push(format!("Row {line}: Phone number is required"));
            continue;
        }
        let Some(phone_number) = normalize_phone(raw_phone) else {
            report.errors.push(format!("Row {line}: Invalid phone number format"));
            continue;
        };

        let notes = notes_idx
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .map(ToString::to_string);

        report.valid.push(ContactRow { name: name.to_string(), phone_number, notes });
    }

    report
}
