//! Appointment scheduling port

use crate::domain::shared::result::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Looks up open appointment slots
#[async_trait]
pub trait AvailabilityProvider: Send + Sync {
    /// Candidate times on the given date
    async fn available_times(&self, date: &str) -> Result<Vec<String>>;
}

/// Appointment the callee confirmed during the call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentConfirmation {
    pub date: String,
    pub time: String,
    pub confirmed_at: DateTime<Utc>,
}

impl AppointmentConfirmation {
    pub fn new(date: impl Into<String>, time: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            time: time.into(),
            confirmed_at: Utc::now(),
        }
    }

    /// Same slot, regardless of when it was confirmed
    pub fn is_same_slot(&self, date: &str, time: &str) -> bool {
        self.date == date && self.time == time
    }
}
