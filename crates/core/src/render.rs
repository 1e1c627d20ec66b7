use crate::domain::prediction::{EchoedValue, HistoryList, PredictionRecord};
use serde::Serialize;

const NO_DATA_LABEL: &str = "No predictions yet";

/// One line of the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRow {
    pub name: String,
    pub status: String,
    pub probability: String,
    pub risk: String,
}

impl DisplayRow {
    /// Placeholder shown instead of an empty table.
    pub fn no_data() -> Self {
        Self {
            name: NO_DATA_LABEL.to_string(),
            status: String::new(),
            probability: String::new(),
            risk: String::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self == &Self::no_data()
    }

    fn from_record(record: &PredictionRecord) -> Self {
        Self {
            name: record.student_name.clone(),
            status: record.retention_status.clone(),
            probability: echoed_percent(record.retention_probability.as_ref()),
            risk: record.risk_level.clone(),
        }
    }
}

pub fn render_rows(history: &HistoryList) -> Vec<DisplayRow> {
    if history.is_empty() {
        return vec![DisplayRow::no_data()];
    }
    history.iter().map(DisplayRow::from_record).collect()
}

/// Plain-text table for terminals.
pub fn render_table(rows: &[DisplayRow]) -> String {
    const HEADERS: [&str; 4] = ["Name", "Status", "Probability", "Risk"];

    let cells: Vec<[&str; 4]> = rows
        .iter()
        .map(|r| [&*r.name, &*r.status, &*r.probability, &*r.risk])
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |row: [&str; 4]| -> String {
        row.iter()
            .zip(widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(cells.len() + 2);
    out.push(line(HEADERS));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in cells {
        out.push(line(row));
    }
    out.join("\n")
}

/// The "Student Summary" block shown after a prediction.
pub fn render_summary(record: &PredictionRecord) -> Vec<(&'static str, String)> {
    vec![
        ("Name", record.student_name.clone()),
        ("Age", echoed(record.student_age.as_ref())),
        ("Attendance", echoed_percent(record.attendance_rate.as_ref())),
        ("Academic", echoed_percent(record.academic_percentage.as_ref())),
        (
            "Activities",
            record.activities_participation.label().to_string(),
        ),
    ]
}

pub(crate) fn echoed(value: Option<&EchoedValue>) -> String {
    value.map(ToString::to_string).unwrap_or_default()
}

pub(crate) fn echoed_percent(value: Option<&EchoedValue>) -> String {
    value.map(|v| format!("{v}%")).unwrap_or_default()
}
