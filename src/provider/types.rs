//! Provider wire types and the sync error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

/// Structured error for provider and sync operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderError {
    #[serde(flatten)]
    pub kind: ProviderErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Authentication/authorization failure; never blind-retried
    Unauthorized,
    /// Rate limited with optional retry after hint
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// Transient/retryable error
    Transient,
    /// Permanent/non-retryable error
    Permanent,
}

impl ProviderError {
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ProviderErrorKind::Unauthorized,
            message: Some(message.into()),
        }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: ProviderErrorKind::RateLimited { retry_after_secs },
            message: None,
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ProviderErrorKind::Transient,
            message: Some(message.into()),
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self {
            kind: ProviderErrorKind::Permanent,
            message: Some(message.into()),
        }
    }

    /// Whether a bounded in-place retry is appropriate
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::Transient)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ProviderErrorKind::Unauthorized => write!(f, "Unauthorized")?,
            ProviderErrorKind::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(after) = retry_after_secs {
                    write!(f, " (retry after: {}s)", after)?;
                }
            }
            ProviderErrorKind::Transient => write!(f, "Transient error")?,
            ProviderErrorKind::Permanent => write!(f, "Permanent error")?,
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            ProviderError::transient(error.to_string())
        } else if error.is_decode() {
            ProviderError::transient(format!("Malformed response: {}", error))
        } else {
            ProviderError::permanent(error.to_string())
        }
    }
}

/// Provider webinar ids arrive as either numbers or strings.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    match value {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// One scheduled occurrence of a recurring webinar
#[derive(Debug, Clone, Deserialize)]
pub struct RawOccurrence {
    pub occurrence_id: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

/// A webinar as returned by the provider (list or detail shape)
#[derive(Debug, Clone, Deserialize)]
pub struct RawWebinar {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Scheduled duration in minutes
    #[serde(default)]
    pub duration: Option<i32>,
    /// Provider webinar type; 6 and 9 are the recurring variants
    #[serde(rename = "type", default)]
    pub webinar_type: Option<i32>,
    #[serde(default)]
    pub occurrences: Vec<RawOccurrence>,
    /// Fields the typed columns do not cover, kept for the raw jsonb column
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl RawWebinar {
    const TYPE_RECURRING_NO_FIXED_TIME: i32 = 6;
    const TYPE_RECURRING_FIXED_TIME: i32 = 9;

    pub fn is_recurring(&self) -> bool {
        matches!(
            self.webinar_type,
            Some(Self::TYPE_RECURRING_NO_FIXED_TIME) | Some(Self::TYPE_RECURRING_FIXED_TIME)
        )
    }
}

/// One attendance record for a webinar (report or basic shape)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAttendance {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub join_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub leave_time: Option<DateTime<Utc>>,
    /// Session duration in seconds
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub raised_hand: bool,
    #[serde(default)]
    pub posted_chat: bool,
    #[serde(default)]
    pub asked_question: bool,
    #[serde(default)]
    pub answered_polling: bool,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Envelope for a page of webinars
#[derive(Debug, Deserialize)]
pub struct WebinarPage {
    #[serde(default)]
    pub webinars: Vec<RawWebinar>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub total_records: Option<u32>,
}

/// Envelope for a page of attendance records
#[derive(Debug, Deserialize)]
pub struct ParticipantPage {
    #[serde(default)]
    pub participants: Vec<RawAttendance>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webinar_id_accepts_numbers_and_strings() {
        let numeric: RawWebinar =
            serde_json::from_str(r#"{"id": 123456789, "topic": "Q3 Review"}"#).unwrap();
        assert_eq!(numeric.id, "123456789");

        let string: RawWebinar =
            serde_json::from_str(r#"{"id": "abc-123", "topic": "Q3 Review"}"#).unwrap();
        assert_eq!(string.id, "abc-123");
    }

    #[test]
    fn recurring_detection_by_type() {
        let mut webinar: RawWebinar = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert!(!webinar.is_recurring());

        webinar.webinar_type = Some(5);
        assert!(!webinar.is_recurring());
        webinar.webinar_type = Some(6);
        assert!(webinar.is_recurring());
        webinar.webinar_type = Some(9);
        assert!(webinar.is_recurring());
    }

    #[test]
    fn provider_error_serializes_kind_tag() {
        let err = ProviderError::rate_limited(Some(30));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "rate_limited");
        assert_eq!(json["retry_after_secs"], 30);
    }
}
