//! Session derivation from raw attendance records.
//!
//! A participant who drops and rejoins appears as several attendance
//! records; each becomes its own session row. The session key is a
//! composite of the webinar id, a normalized participant identity, and the
//! join time (or the record's running index when the provider omitted it),
//! which makes re-derivation over the same input idempotent.

use std::collections::HashSet;

use crate::provider::types::RawAttendance;
use crate::repositories::NewSession;

/// Identity sentinel for records carrying no usable identifier at all.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Pick the strongest identity a record offers:
/// participant id > user id > email > display name > "unknown".
fn identity_for(record: &RawAttendance) -> String {
    normalize(record.id.as_deref())
        .or_else(|| normalize(record.user_id.as_deref()))
        .or_else(|| normalize(record.user_email.as_deref()).map(|e| e.to_lowercase()))
        .or_else(|| normalize(record.name.as_deref()))
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Derive storable session rows from raw attendance records.
///
/// Keys are unique within the returned set: records that collapse to the
/// same (identity, join time) pair, as duplicates from overlapping
/// collection strategies do, are kept once, while identity-less records
/// stay distinct through the running index.
pub fn derive_sessions(webinar_provider_id: &str, records: &[RawAttendance]) -> Vec<NewSession> {
    let mut seen = HashSet::new();
    let mut sessions = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let identity = identity_for(record);
        let joined = match record.join_time {
            Some(t) => t.to_rfc3339(),
            None => format!("idx-{}", index),
        };
        let session_key = format!("{}:{}:{}", webinar_provider_id, identity, joined);

        if !seen.insert(session_key.clone()) {
            continue;
        }

        sessions.push(NewSession {
            session_key,
            participant_id: normalize(record.id.as_deref())
                .or_else(|| normalize(record.user_id.as_deref())),
            display_name: normalize(record.name.as_deref()),
            email: normalize(record.user_email.as_deref()).map(|e| e.to_lowercase()),
            join_time: record.join_time.map(|t| t.fixed_offset()),
            leave_time: record.leave_time.map(|t| t.fixed_offset()),
            duration_seconds: record.duration,
            raised_hand: record.raised_hand,
            posted_chat: record.posted_chat,
            asked_question: record.asked_question,
            answered_polling: record.answered_polling,
            device: normalize(record.device.as_deref()),
            location: normalize(record.location.as_deref()),
        });
    }

    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: Option<&str>, join_minute: Option<u32>) -> RawAttendance {
        RawAttendance {
            id: id.map(str::to_string),
            join_time: join_minute
                .map(|m| Utc.with_ymd_and_hms(2026, 3, 10, 15, m, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn rejoin_produces_distinct_keys() {
        let records = vec![record(Some("p-1"), Some(0)), record(Some("p-1"), Some(20))];
        let sessions = derive_sessions("wb-1", &records);

        assert_eq!(sessions.len(), 2);
        assert_ne!(sessions[0].session_key, sessions[1].session_key);
    }

    #[test]
    fn derivation_is_idempotent() {
        let records = vec![
            record(Some("p-1"), Some(0)),
            record(Some("p-2"), Some(5)),
            record(None, None),
        ];

        let first: Vec<String> = derive_sessions("wb-1", &records)
            .into_iter()
            .map(|s| s.session_key)
            .collect();
        let second: Vec<String> = derive_sessions("wb-1", &records)
            .into_iter()
            .map(|s| s.session_key)
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn identity_precedence_prefers_participant_id() {
        let mut rec = RawAttendance {
            id: Some("pid".to_string()),
            user_id: Some("uid".to_string()),
            user_email: Some("User@Example.com".to_string()),
            name: Some("User".to_string()),
            ..Default::default()
        };
        assert_eq!(identity_for(&rec), "pid");

        rec.id = None;
        assert_eq!(identity_for(&rec), "uid");

        rec.user_id = None;
        assert_eq!(identity_for(&rec), "user@example.com");

        rec.user_email = None;
        assert_eq!(identity_for(&rec), "User");

        rec.name = None;
        assert_eq!(identity_for(&rec), UNKNOWN_IDENTITY);
    }

    #[test]
    fn blank_identifiers_are_ignored() {
        let rec = RawAttendance {
            id: Some("   ".to_string()),
            name: Some("Dana".to_string()),
            ..Default::default()
        };
        assert_eq!(identity_for(&rec), "Dana");
    }

    #[test]
    fn identity_less_records_stay_unique_via_index() {
        let records = vec![record(None, None), record(None, None), record(None, None)];
        let sessions = derive_sessions("wb-1", &records);

        assert_eq!(sessions.len(), 3);
        let keys: HashSet<_> = sessions.iter().map(|s| s.session_key.clone()).collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn exact_duplicates_are_collapsed() {
        let records = vec![record(Some("p-1"), Some(0)), record(Some("p-1"), Some(0))];
        let sessions = derive_sessions("wb-1", &records);

        assert_eq!(sessions.len(), 1);
    }
}
