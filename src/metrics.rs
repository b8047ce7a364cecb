use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use std::fmt;

use crate::level::Level;

/// Label set of the per-level counter family.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LevelLabels {
    pub level: Level,
}

/// One monotonically increasing counter per [`Level`].
///
/// Each logger owns its own set, so independent loggers (and tests) never
/// see each other's counts. Increments are atomic.
pub struct LevelCounters {
    family: Family<LevelLabels, Counter>,
    registry: Registry,
}

impl LevelCounters {
    pub fn new() -> Self {
        let family = Family::<LevelLabels, Counter>::default();
        for level in Level::ALL {
            family.get_or_create(&LevelLabels { level });
        }

        let mut registry = Registry::default();
        registry.register(
            "log_messages",
            "Total number of log messages",
            family.clone(),
        );

        LevelCounters { family, registry }
    }

    /// Count one record at `level`, returning the previous value.
    pub fn increment(&self, level: Level) -> u64 {
        self.family.get_or_create(&LevelLabels { level }).inc()
    }

    pub fn get(&self, level: Level) -> u64 {
        self.family.get_or_create(&LevelLabels { level }).get()
    }

    pub fn total(&self) -> u64 {
        Level::ALL.iter().map(|level| self.get(*level)).sum()
    }

    /// Render the counters in the Prometheus text exposition format for
    /// an external scraper.
    pub fn encode(&self) -> Result<String, fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for LevelCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LevelCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for level in Level::ALL {
            map.entry(&level.as_str(), &self.get(level));
        }
        map.finish()
    }
}
