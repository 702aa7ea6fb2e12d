use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::job::{Job, JobId, JobStatus, SyncState};

/// One job entry as exchanged with the status source.
///
/// Every field is optional on the wire so that a single bad entry can be
/// rejected by [`RemoteRecord::into_job`] without failing the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub time_remaining: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRecord {
    #[error("entry has no id")]
    MissingId,

    #[error("entry {0} has no uri")]
    MissingUri(String),

    #[error("entry {0} has no usable timestamp")]
    BadTimestamp(String),

    #[error("entry {id} has invalid status {status:?}")]
    InvalidStatus { id: String, status: Option<String> },

    #[error("entry {id} has invalid timeRemaining {value}")]
    InvalidTimeRemaining { id: String, value: i64 },
}

impl RemoteRecord {
    /// Validate the entry into a [`Job`] the status source vouches for.
    pub fn into_job(self) -> Result<Job, MalformedRecord> {
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => return Err(MalformedRecord::MissingId),
        };

        let status = match self.status.as_deref().map(JobStatus::from_str) {
            Some(Ok(status)) => status,
            _ => {
                return Err(MalformedRecord::InvalidStatus {
                    id,
                    status: self.status,
                })
            }
        };

        let image_ref = match self.uri {
            Some(uri) if !uri.is_empty() => uri,
            _ => return Err(MalformedRecord::MissingUri(id)),
        };

        let created_at = match self.timestamp.and_then(DateTime::<Utc>::from_timestamp_millis) {
            Some(ts) => ts,
            None => return Err(MalformedRecord::BadTimestamp(id)),
        };

        let time_remaining = match self.time_remaining {
            None => None,
            Some(value) => match u32::try_from(value) {
                Ok(secs) => Some(secs),
                Err(_) => return Err(MalformedRecord::InvalidTimeRemaining { id, value }),
            },
        };

        Ok(Job {
            id: JobId::new(id),
            image_ref,
            style_tag: self.style,
            status,
            // The source writes 0 for queued jobs; only cooking jobs carry a timer.
            time_remaining: if status == JobStatus::Cooking {
                time_remaining
            } else {
                None
            },
            created_at,
            sync: SyncState::Synced,
        })
    }
}

impl From<&Job> for RemoteRecord {
    fn from(job: &Job) -> Self {
        Self {
            id: Some(job.id.to_string()),
            uri: Some(job.image_ref.clone()),
            timestamp: Some(job.created_at.timestamp_millis()),
            status: Some(job.status.to_string()),
            style: job.style_tag.clone(),
            time_remaining: job.time_remaining.map(i64::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, status: &str) -> RemoteRecord {
        RemoteRecord {
            id: Some(id.to_string()),
            uri: Some(format!("images/{id}.jpg")),
            timestamp: Some(1_700_000_000_000),
            status: Some(status.to_string()),
            style: Some("monet".to_string()),
            time_remaining: None,
        }
    }

    #[test]
    fn test_valid_cooking_entry() {
        let job = RemoteRecord {
            time_remaining: Some(7),
            ..record("a", "cooking")
        }
        .into_job()
        .unwrap();

        assert_eq!(job.id, JobId::from("a"));
        assert_eq!(job.status, JobStatus::Cooking);
        assert_eq!(job.time_remaining, Some(7));
        assert_eq!(job.created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(job.sync, SyncState::Synced);
    }

    #[test]
    fn test_queued_zero_timer_is_cleared() {
        let job = RemoteRecord {
            time_remaining: Some(0),
            ..record("q", "queued")
        }
        .into_job()
        .unwrap();
        assert_eq!(job.time_remaining, None);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let entry = RemoteRecord {
            id: None,
            ..record("x", "queued")
        };
        assert_eq!(entry.into_job(), Err(MalformedRecord::MissingId));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = record("b", "burnt").into_job().unwrap_err();
        assert!(matches!(err, MalformedRecord::InvalidStatus { .. }));

        let err = RemoteRecord {
            status: None,
            ..record("c", "queued")
        }
        .into_job()
        .unwrap_err();
        assert!(matches!(err, MalformedRecord::InvalidStatus { status: None, .. }));
    }

    #[test]
    fn test_negative_timer_is_rejected() {
        let err = RemoteRecord {
            time_remaining: Some(-4),
            ..record("d", "cooking")
        }
        .into_job()
        .unwrap_err();
        assert_eq!(
            err,
            MalformedRecord::InvalidTimeRemaining {
                id: "d".to_string(),
                value: -4
            }
        );
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let parsed: RemoteRecord = serde_json::from_str(
            r#"{"id":"e","uri":"https://x/e.jpg","timestamp":5,"status":"cooking","timeRemaining":3}"#,
        )
        .unwrap();
        assert_eq!(parsed.time_remaining, Some(3));
        assert_eq!(parsed.style, None);

        let job = parsed.into_job().unwrap();
        let back = serde_json::to_value(RemoteRecord::from(&job)).unwrap();
        assert_eq!(back["timeRemaining"], 3);
        assert_eq!(back["status"], "cooking");
    }
}
