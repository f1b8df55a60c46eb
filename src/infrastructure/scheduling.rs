//! Static scheduling backend

use crate::domain::scheduling::AvailabilityProvider;
use crate::domain::shared::result::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Offers the same slots for every date, after an optional lookup delay
#[derive(Debug, Clone)]
pub struct StaticAvailability {
    times: Vec<String>,
    delay: Duration,
}

impl StaticAvailability {
    pub fn new(times: Vec<String>) -> Self {
        Self {
            times,
            delay: Duration::ZERO,
        }
    }

    /// Simulate the latency of a real calendar lookup
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for StaticAvailability {
    fn default() -> Self {
        Self::new(vec!["1pm".to_string(), "2pm".to_string(), "3pm".to_string()])
    }
}

#[async_trait]
impl AvailabilityProvider for StaticAvailability {
    async fn available_times(&self, date: &str) -> Result<Vec<String>> {
        debug!("Looking up static availability for {}", date);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.times.clone())
    }
}
