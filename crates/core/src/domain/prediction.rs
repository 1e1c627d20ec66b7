use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Most recent predictions kept in history.
pub const MAX_HISTORY_ENTRIES: usize = 10;

/// One prediction outcome plus the inputs the server echoed back.
///
/// Fields are passed through without type checks: absent or `null` text
/// becomes empty, numbers and booleans become their text, so one odd field
/// never rejects the whole record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub student_name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub retention_status: String,
    #[serde(default)]
    pub retention_probability: Option<EchoedValue>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub risk_level: String,
    #[serde(default)]
    pub student_age: Option<EchoedValue>,
    #[serde(default)]
    pub attendance_rate: Option<EchoedValue>,
    #[serde(default)]
    pub academic_percentage: Option<EchoedValue>,
    #[serde(default)]
    pub activities_participation: Activities,
    #[serde(default, deserialize_with = "lenient_list")]
    pub recommendations: Vec<String>,
}

fn json_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(json_text(Value::deserialize(deserializer)?))
}

/// A list stays a list (items as text); a lone value becomes one item.
fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(json_text).collect(),
        other => vec![json_text(other)],
    })
}

/// A value echoed back by the server, kept exactly as sent.
///
/// Numbers stay numbers; anything else is kept as its text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EchoedValue {
    Number(serde_json::Number),
    Text(String),
}

impl EchoedValue {
    pub fn is_number(&self) -> bool {
        matches!(self, EchoedValue::Number(_))
    }
}

impl fmt::Display for EchoedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EchoedValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    write!(f, "{i}")
                } else if let Some(u) = n.as_u64() {
                    write!(f, "{u}")
                } else if let Some(x) = n.as_f64() {
                    // 90.0 prints as "90", the way the browser showed it.
                    write!(f, "{x}")
                } else {
                    write!(f, "{n}")
                }
            }
            EchoedValue::Text(s) => f.write_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for EchoedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => EchoedValue::Number(n),
            other => EchoedValue::Text(json_text(other)),
        })
    }
}

impl From<i64> for EchoedValue {
    fn from(n: i64) -> Self {
        EchoedValue::Number(n.into())
    }
}

impl From<f64> for EchoedValue {
    fn from(x: f64) -> Self {
        serde_json::Number::from_f64(x)
            .map(EchoedValue::Number)
            .unwrap_or_else(|| EchoedValue::Text(x.to_string()))
    }
}

impl From<&str> for EchoedValue {
    fn from(s: &str) -> Self {
        EchoedValue::Text(s.to_string())
    }
}

/// Extracurricular participation flag.
///
/// Coercion from JSON: `"1"`, `1` and `true` mean [`Activities::Yes`];
/// anything else (including absent) means [`Activities::No`].
/// Always serialized as the text `"1"` / `"0"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Activities {
    Yes,
    #[default]
    No,
}

impl Activities {
    pub fn from_json(value: &Value) -> Self {
        let yes = match value {
            Value::String(s) => s.trim() == "1",
            Value::Number(n) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
            Value::Bool(b) => *b,
            _ => false,
        };
        if yes {
            Activities::Yes
        } else {
            Activities::No
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Activities::Yes => "1",
            Activities::No => "0",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Activities::Yes => "Yes",
            Activities::No => "No",
        }
    }
}

impl Serialize for Activities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for Activities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Activities::from_json(&value))
    }
}

/// Newest-first list of past predictions, never longer than
/// [`MAX_HISTORY_ENTRIES`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HistoryList(Vec<PredictionRecord>);

impl HistoryList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a list from records already in newest-first order, dropping
    /// anything past the bound.
    pub fn from_records(mut records: Vec<PredictionRecord>) -> Self {
        records.truncate(MAX_HISTORY_ENTRIES);
        Self(records)
    }

    pub fn prepend(&mut self, record: PredictionRecord) {
        self.0.insert(0, record);
        self.0.truncate(MAX_HISTORY_ENTRIES);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn latest(&self) -> Option<&PredictionRecord> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PredictionRecord> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[PredictionRecord] {
        &self.0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.0)
    }

    /// Parses stored text. The text must be a JSON array; entries that are
    /// not objects are skipped so the remaining records survive.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let entries = serde_json::from_str::<Vec<Value>>(text)?;
        let records = entries
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|entry| serde_json::from_value::<PredictionRecord>(entry).ok())
            .collect();
        Ok(Self::from_records(records))
    }
}

impl<'a> IntoIterator for &'a HistoryList {
    type Item = &'a PredictionRecord;
    type IntoIter = std::slice::Iter<'a, PredictionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
