use crate::domain::prediction::PredictionRecord;
use anyhow::{bail, ensure, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields the `/predict` endpoint expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub name: String,
    pub age: i64,
    pub attendance_rate: i64,
    pub academic_percentage: i64,
    pub activities_participation: i64,
}

impl PredictionRequest {
    /// Rejects payloads the prediction server would reject, with the same
    /// wording, before any network round trip.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.name.trim().is_empty(), "Name cannot be empty.");
        ensure!(
            (1..=120).contains(&self.age),
            "Age must be between 1 and 120."
        );
        ensure!(
            (0..=100).contains(&self.attendance_rate),
            "Attendance rate must be between 0 and 100."
        );
        ensure!(
            (0..=100).contains(&self.academic_percentage),
            "Academic percentage must be between 0 and 100."
        );
        ensure!(
            matches!(self.activities_participation, 0 | 1),
            "Activities participation must be 0 or 1."
        );
        Ok(())
    }
}

/// Body of `GET /health` on the prediction server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_available: bool,
}

const REQUIRED_RESPONSE_KEYS: [&str; 2] = ["student_name", "retention_status"];

/// Turns a successful `/predict` body into a record.
///
/// Only existence is checked; field contents are passed through.
pub fn parse_prediction_response(raw: Value) -> anyhow::Result<PredictionRecord> {
    let Value::Object(obj) = &raw else {
        bail!("prediction response is not a JSON object: {raw}");
    };

    for key in REQUIRED_RESPONSE_KEYS {
        ensure!(
            obj.contains_key(key),
            "prediction response is missing `{key}`"
        );
    }

    serde_json::from_value::<PredictionRecord>(raw)
        .context("prediction response does not match the record shape")
}

/// Extracts the server's `{"error": ..}` message from a failed response.
pub fn error_message(raw: &Value) -> Option<&str> {
    raw.get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
