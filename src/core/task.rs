use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque task identifier. The API sends either a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(i64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) if s.trim().is_empty() => {
                Err(serde::de::Error::custom("empty task id"))
            }
            Raw::Text(s) => Ok(Self(s)),
            Raw::Number(n) => Ok(Self(n.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Planned,
    InProgress,
    Done,
    /// A status the app has no label for, kept verbatim.
    Other(String),
}

impl TaskStatus {
    pub fn as_keyword(&self) -> &str {
        match self {
            Self::Planned => "planifié",
            Self::InProgress => "en cours",
            Self::Done => "terminé",
            Self::Other(s) => s,
        }
    }

    pub fn from_keyword(s: &str) -> Self {
        match s {
            "planifié" => Self::Planned,
            "en cours" => Self::InProgress,
            "terminé" => Self::Done,
            other => Self::Other(other.to_string()),
        }
    }

    /// Display label, `None` for unmapped statuses.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::Planned => Some("À venir"),
            Self::InProgress => Some("En cours"),
            Self::Done => Some("Terminé"),
            Self::Other(_) => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl Serialize for TaskStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_keyword())
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_keyword(&s))
    }
}

/// A scheduled care intervention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(with = "wire_date")]
    pub date: NaiveDate,
    #[serde(rename = "heure_debut", with = "wire_time")]
    pub start_time: NaiveTime,
    #[serde(rename = "heure_fin", with = "wire_time")]
    pub end_time: NaiveTime,
    #[serde(rename = "type_intervention")]
    pub intervention_type: String,
    #[serde(rename = "statut")]
    pub status: TaskStatus,
    #[serde(rename = "remarques", default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(rename = "client_nom", default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(rename = "adresse", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        intervention_type: impl Into<String>,
    ) -> Self {
        Self {
            id: TaskId::new(id),
            date,
            start_time,
            end_time,
            intervention_type: intervention_type.into(),
            status: TaskStatus::Planned,
            remarks: None,
            client_name: None,
            address: None,
        }
    }

    pub fn is_on(&self, day: NaiveDate) -> bool {
        self.date == day
    }

    /// "08:30 - 10:00"
    pub fn time_window(&self) -> String {
        format!(
            "{} - {}",
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// Parse a wire date, ignoring any time part and offset.
pub fn parse_wire_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date_part = s.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn parse_wire_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

mod wire_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_wire_date(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {s:?}")))
    }
}

mod wire_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_wire_time(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time: {s:?}")))
    }
}

/// A record from the task endpoint that failed validation.
#[derive(Debug, Clone)]
pub struct QuarantinedRecord {
    pub index: usize,
    pub reason: String,
    pub raw: serde_json::Value,
}

/// Result of decoding a task list payload record by record.
#[derive(Debug, Clone, Default)]
pub struct DecodedTasks {
    pub tasks: Vec<Task>,
    pub quarantined: Vec<QuarantinedRecord>,
}

/// Decode a task list payload. The top level must be an array; records that
/// do not match the schema are set aside instead of failing the whole list.
pub fn decode_task_list(body: &str) -> crate::Result<DecodedTasks> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let records = match value {
        serde_json::Value::Array(records) => records,
        other => {
            return Err(crate::Error::Decode(format!(
                "expected a task array, got {}",
                json_kind(&other)
            )));
        }
    };

    let mut decoded = DecodedTasks::default();
    for (index, raw) in records.into_iter().enumerate() {
        match serde_json::from_value::<Task>(raw.clone()) {
            Ok(task) => decoded.tasks.push(task),
            Err(e) => {
                log::warn!("Quarantining task record #{}: {}", index, e);
                decoded.quarantined.push(QuarantinedRecord {
                    index,
                    reason: e.to_string(),
                    raw,
                });
            }
        }
    }
    Ok(decoded)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_server_record() {
        let body = r#"[{
            "id": 12,
            "date": "2024-03-13T00:00:00.000Z",
            "heure_debut": "08:30:00",
            "heure_fin": "10:00:00",
            "type_intervention": "Aide au lever",
            "statut": "planifié",
            "remarques": null,
            "client_nom": "Eliott",
            "adresse": "3 rue des Lilas"
        }]"#;
        let decoded = decode_task_list(body).unwrap();
        assert!(decoded.quarantined.is_empty());
        let task = &decoded.tasks[0];
        assert_eq!(task.id.as_str(), "12");
        assert_eq!(task.date, NaiveDate::from_ymd_opt(2024, 3, 13).unwrap());
        assert_eq!(task.status, TaskStatus::Planned);
        assert_eq!(task.remarks, None);
        assert_eq!(task.time_window(), "08:30 - 10:00");
    }

    #[test]
    fn date_ignores_offset() {
        // Late evening with an offset still belongs to the written calendar day.
        assert_eq!(
            parse_wire_date("2024-03-13T23:30:00+02:00"),
            NaiveDate::from_ymd_opt(2024, 3, 13)
        );
        assert_eq!(parse_wire_date("13/03/2024"), None);
        assert_eq!(parse_wire_date("2024"), None);
    }

    #[test]
    fn malformed_records_are_quarantined() {
        let body = r#"[
            {"id": "a", "date": "2024-03-11", "heure_debut": "09:00", "heure_fin": "10:00",
             "type_intervention": "Toilette", "statut": "terminé"},
            {"id": "b", "date": "not a date", "heure_debut": "09:00", "heure_fin": "10:00",
             "type_intervention": "Repas", "statut": "planifié"},
            {"date": "2024-03-11", "heure_debut": "09:00", "heure_fin": "10:00",
             "type_intervention": "Courses", "statut": "planifié"}
        ]"#;
        let decoded = decode_task_list(body).unwrap();
        assert_eq!(decoded.tasks.len(), 1);
        assert_eq!(decoded.tasks[0].id.as_str(), "a");
        assert_eq!(decoded.quarantined.len(), 2);
        assert_eq!(decoded.quarantined[0].index, 1);
        assert_eq!(decoded.quarantined[1].index, 2);
    }

    #[test]
    fn non_array_payload_is_a_decode_error() {
        let err = decode_task_list(r#"{"message": "nope"}"#).unwrap_err();
        assert!(matches!(err, crate::Error::Decode(_)));
        assert!(matches!(
            decode_task_list("<html>").unwrap_err(),
            crate::Error::Decode(_)
        ));
    }

    #[test]
    fn unmapped_status_kept_verbatim() {
        let status = TaskStatus::from_keyword("delayed");
        assert_eq!(status, TaskStatus::Other("delayed".into()));
        assert_eq!(status.label(), None);
        assert_eq!(status.as_keyword(), "delayed");
        assert_eq!(TaskStatus::Planned.label(), Some("À venir"));
    }

    #[test]
    fn snapshot_serialization_is_decodable() {
        let mut task = Task::new(
            "7",
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            "Promenade",
        );
        task.remarks = Some("Prévoir un parapluie".into());
        let json = serde_json::to_string(&vec![task.clone()]).unwrap();
        assert!(json.contains("\"remarques\":\"Prévoir un parapluie\""));
        assert!(json.contains("\"heure_debut\":\"14:00:00\""));
        let decoded = decode_task_list(&json).unwrap();
        assert_eq!(decoded.tasks, vec![task]);
    }
}
