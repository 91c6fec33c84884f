//! CSV and JSON export of recorded observations.
//!
//! The CSV layout is fixed: downstream spreadsheets depend on the column
//! order and the number of decimals per field.

use crate::recording::{Recording, RecordingLog};
use chrono::Datelike;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

pub const CSV_HEADER: &str = "Obs,Timestamp,Year,Month,Day,Tag,Zenith,Azimuth,\
    Latitude,Longitude,Altitude_m,Pitch,Roll,Yaw,\
    Normal_X,Normal_Y,Normal_Z,Accel_X_m,Accel_Y_m,Accel_Z_m";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

fn optional(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_default()
}

fn csv_row(obs: usize, r: &Recording) -> [String; 20] {
    let s = &r.snapshot;
    let gps = r.gps.as_ref();
    [
        obs.to_string(),
        r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        r.timestamp.year().to_string(),
        r.timestamp.month().to_string(),
        r.timestamp.day().to_string(),
        r.tag.clone(),
        format!("{:.2}", s.orientation.zenith),
        format!("{:.2}", s.orientation.azimuth),
        optional(gps.map(|g| g.latitude), 6),
        optional(gps.map(|g| g.longitude), 6),
        optional(gps.and_then(|g| g.altitude_m), 1),
        format!("{:.2}", s.angles.pitch),
        format!("{:.2}", s.angles.roll),
        format!("{:.2}", s.angles.yaw),
        format!("{:.4}", s.normal.x),
        format!("{:.4}", s.normal.y),
        format!("{:.4}", s.normal.z),
        format!("{:.3}", s.position.x),
        format!("{:.3}", s.position.y),
        format!("{:.3}", s.position.z),
    ]
}

impl RecordingLog {
    /// Header plus one row per recording, numbered from 1. Fields are quoted
    /// only when they contain a delimiter, quote or line break.
    pub fn write_csv(&self, out: &mut impl Write) -> Result<(), ExportError> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(out);
        writer.write_record(CSV_HEADER.split(','))?;
        for (index, recording) in self.iter().enumerate() {
            writer.write_record(&csv_row(index + 1, recording))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String, ExportError> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        // Every field written above is UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn write_json(&self, out: &mut impl Write) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)?;
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> Result<(), ExportError> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_csv(&mut out)?;
        out.flush()?;
        tracing::info!(?path, rows = self.len(), "Exported CSV");
        Ok(())
    }

    pub fn save_json(&self, path: &Path) -> Result<(), ExportError> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_json(&mut out)?;
        out.flush()?;
        tracing::info!(?path, rows = self.len(), "Exported JSON");
        Ok(())
    }
}
