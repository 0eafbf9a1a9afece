use chrono::{DateTime, Utc};
use serde::Serialize;

/// Body of the 202 returned when a recalculation is started.
#[derive(Debug, Serialize)]
pub struct RecalculationAccepted {
    pub status: &'static str,
    pub requested_utc: DateTime<Utc>,
}

impl RecalculationAccepted {
    pub fn now() -> Self {
        Self {
            status: "accepted",
            requested_utc: Utc::now(),
        }
    }
}
