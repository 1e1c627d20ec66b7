use crate::domain::prediction::{HistoryList, PredictionRecord};
use crate::render::echoed_percent;
use anyhow::Context;
use std::fmt;
use std::path::{Path, PathBuf};

pub const REPORT_FILENAME: &str = "student_retention_report.txt";
pub const HISTORY_CSV_FILENAME: &str = "retention_history.csv";

const REPORT_TITLE: &str = "Student Retention Prediction Report";
const CSV_HEADER: &str = "name,status,probability,risk";

/// Nothing to export. Shown to the user as-is; no file is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportError {
    NoPrediction,
    EmptyHistory,
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::NoPrediction => {
                f.write_str("No prediction to export yet. Run a prediction first.")
            }
            ExportError::EmptyHistory => f.write_str("No prediction history to export."),
        }
    }
}

impl std::error::Error for ExportError {}

/// A file ready to be handed to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl ExportArtifact {
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> anyhow::Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create export dir {}", dir.display()))?;
        let path = dir.join(self.filename);
        std::fs::write(&path, &self.body)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

pub fn export_single_report(
    record: Option<&PredictionRecord>,
) -> Result<ExportArtifact, ExportError> {
    let record = record.ok_or(ExportError::NoPrediction)?;

    let mut lines = vec![
        REPORT_TITLE.to_string(),
        String::new(),
        format!("Name: {}", record.student_name),
        format!("Status: {}", record.retention_status),
        format!(
            "Probability: {}",
            echoed_percent(record.retention_probability.as_ref())
        ),
        format!("Risk: {}", record.risk_level),
        format!(
            "Attendance: {}",
            echoed_percent(record.attendance_rate.as_ref())
        ),
        format!(
            "Academic: {}",
            echoed_percent(record.academic_percentage.as_ref())
        ),
        format!("Activities: {}", record.activities_participation.label()),
        String::new(),
        "Recommendations:".to_string(),
    ];
    lines.extend(record.recommendations.iter().map(|r| format!("- {r}")));

    Ok(ExportArtifact {
        filename: REPORT_FILENAME,
        content_type: "text/plain; charset=utf-8",
        body: lines.join("\n"),
    })
}

pub fn export_history_report(history: &HistoryList) -> Result<ExportArtifact, ExportError> {
    if history.is_empty() {
        return Err(ExportError::EmptyHistory);
    }

    let mut lines = Vec::with_capacity(history.len() + 1);
    lines.push(CSV_HEADER.to_string());
    for record in history {
        // Numbers go unquoted; anything else the server sent is quoted text.
        let probability = match &record.retention_probability {
            Some(p) if p.is_number() => p.to_string(),
            Some(p) => quote(&p.to_string()),
            None => String::new(),
        };
        lines.push(format!(
            "{},{},{},{}",
            quote(&record.student_name),
            quote(&record.retention_status),
            probability,
            quote(&record.risk_level),
        ));
    }

    Ok(ExportArtifact {
        filename: HISTORY_CSV_FILENAME,
        content_type: "text/csv; charset=utf-8",
        body: lines.join("\n"),
    })
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
