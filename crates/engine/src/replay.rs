use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use bus::EventBus;
use common::{token_channel, Error, Observation, Result};

/// Publishes recorded observations onto the bus, standing in for the
/// external normalizer.
///
/// The input is newline-delimited JSON, one observation per line. Blank lines
/// and lines starting with `#` are ignored.
#[derive(Debug, Clone, Default)]
pub struct ReplayFeed {
    observations: Vec<Observation>,
}

impl ReplayFeed {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read replay file '{}': {e}", path.display()))
        })?;
        Ok(Self::parse(&content))
    }

    /// Lines that are not JSON objects with a `pairAddress` are skipped.
    pub fn parse(content: &str) -> Self {
        let mut observations = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<Observation>(line) {
                Ok(obs) if obs.pair_address().is_some() => observations.push(obs),
                Ok(_) => warn!(line = idx + 1, "Replay line has no pairAddress, skipped"),
                Err(e) => warn!(line = idx + 1, error = %e, "Replay line is not valid JSON, skipped"),
            }
        }
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Publish every observation on its pair channel, pausing `interval`
    /// between messages. Returns how many publishes reached at least one
    /// receiver.
    pub async fn run(&self, bus: &EventBus, interval: Duration) -> usize {
        info!(observations = self.observations.len(), interval = ?interval, "Replay started");
        let mut delivered = 0;
        for (idx, obs) in self.observations.iter().enumerate() {
            if idx > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            // Filtered in `parse`.
            let Some(pair) = obs.pair_address() else { continue };
            match bus.try_publish(&token_channel(pair), obs).await {
                Ok(0) => warn!(pair, "No subscriber for replayed observation"),
                Ok(_) => delivered += 1,
                Err(e) => warn!(pair, error = %e, "Replay publish failed"),
            }
        }
        info!(delivered, "Replay finished");
        delivered
    }
}
