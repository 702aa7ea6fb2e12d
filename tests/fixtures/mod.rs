//! Status source entries used across kitchen tests

use letmecook_kitchen::models::remote::RemoteRecord;

/// Base creation time of fixture jobs, in milliseconds.
pub const BASE_TIMESTAMP: i64 = 1_717_000_000_000;

pub fn record(id: &str, offset_ms: i64, status: &str, time_remaining: Option<i64>) -> RemoteRecord {
    RemoteRecord {
        id: Some(id.to_string()),
        uri: Some(format!("images/{}-{id}.jpg", BASE_TIMESTAMP + offset_ms)),
        timestamp: Some(BASE_TIMESTAMP + offset_ms),
        status: Some(status.to_string()),
        style: Some("vangogh".to_string()),
        time_remaining,
    }
}

/// Five fresh jobs waiting for a slot, oldest first.
pub fn five_queued() -> Vec<RemoteRecord> {
    (1..=5)
        .map(|i| record(&format!("queued-{i}"), i * 100, "queued", Some(0)))
        .collect()
}

/// A kitchen mid-service: two jobs cooking, one done.
pub fn busy_kitchen() -> Vec<RemoteRecord> {
    vec![
        record("done", 100, "finished", None),
        record("pot-1", 200, "cooking", Some(8)),
        record("pot-2", 300, "cooking", Some(8)),
    ]
}
