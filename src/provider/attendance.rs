//! Multi-strategy attendance collection.
//!
//! The report endpoint has the richest data but lags behind live webinars
//! and is entitlement-gated, so collection falls back to the basic
//! past-webinar endpoint when the report comes back empty or fails. For
//! recurring webinars each known occurrence is additionally queried and the
//! results concatenated; duplicates are collapsed later by session-key
//! derivation.

use tracing::{debug, warn};

use crate::provider::client::ProviderClient;
use crate::provider::types::{ProviderError, ProviderErrorKind, RawAttendance, RawWebinar};

/// Collect attendance records for a webinar using every applicable strategy.
///
/// Unauthorized errors abort immediately; anything else degrades to the next
/// strategy.
pub async fn collect_attendance(
    client: &ProviderClient,
    token: &str,
    webinar: &RawWebinar,
) -> Result<Vec<RawAttendance>, ProviderError> {
    let mut records = match client.report_participants(token, &webinar.id, None).await {
        Ok(report) if !report.is_empty() => {
            debug!(
                webinar_id = %webinar.id,
                records = report.len(),
                "Attendance from report endpoint"
            );
            report
        }
        Ok(_) => {
            debug!(webinar_id = %webinar.id, "Report endpoint empty, trying basic endpoint");
            fallback_basic(client, token, webinar).await?
        }
        Err(err) if matches!(err.kind, ProviderErrorKind::Unauthorized) => return Err(err),
        Err(err) => {
            warn!(webinar_id = %webinar.id, error = %err, "Report endpoint failed, trying basic endpoint");
            fallback_basic(client, token, webinar).await?
        }
    };

    if webinar.is_recurring() {
        for occurrence in &webinar.occurrences {
            match client
                .report_participants(token, &webinar.id, Some(&occurrence.occurrence_id))
                .await
            {
                Ok(mut occurrence_records) => {
                    debug!(
                        webinar_id = %webinar.id,
                        occurrence_id = %occurrence.occurrence_id,
                        records = occurrence_records.len(),
                        "Attendance for occurrence"
                    );
                    records.append(&mut occurrence_records);
                }
                Err(err) if matches!(err.kind, ProviderErrorKind::Unauthorized) => return Err(err),
                Err(err) => {
                    warn!(
                        webinar_id = %webinar.id,
                        occurrence_id = %occurrence.occurrence_id,
                        error = %err,
                        "Skipping occurrence attendance"
                    );
                }
            }
        }
    }

    Ok(records)
}

async fn fallback_basic(
    client: &ProviderClient,
    token: &str,
    webinar: &RawWebinar,
) -> Result<Vec<RawAttendance>, ProviderError> {
    match client.past_participants(token, &webinar.id).await {
        Ok(records) => Ok(records),
        Err(err) if matches!(err.kind, ProviderErrorKind::Unauthorized) => Err(err),
        Err(err) => {
            // Both strategies dead: report the webinar as having no
            // retrievable attendance rather than failing the whole sync.
            warn!(webinar_id = %webinar.id, error = %err, "Basic endpoint failed, no attendance available");
            Ok(Vec::new())
        }
    }
}
