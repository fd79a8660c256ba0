//! Configuration for parallel search execution.

use std::time::Duration;

/// How a worker waits on an empty frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontierMode {
    /// Suspend inside `pop` until work arrives, a control signal interrupts,
    /// or every worker is idle.
    #[default]
    Blocking,
    /// Return immediately on an empty frontier and retry after `backoff`.
    Polling { backoff: Duration },
}

impl std::fmt::Display for FrontierMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrontierMode::Blocking => write!(f, "blocking"),
            FrontierMode::Polling { backoff } => write!(f, "polling ({backoff:?})"),
        }
    }
}

impl std::str::FromStr for FrontierMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocking" | "block" => Ok(FrontierMode::Blocking),
            "polling" | "poll" => Ok(FrontierMode::Polling {
                backoff: EngineConfig::DEFAULT_POLL_BACKOFF,
            }),
            _ => Err(format!(
                "Unknown frontier mode: '{}'. Valid options: blocking, polling",
                s
            )),
        }
    }
}

/// Configuration for a search engine session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Stop at the first accepted solution instead of enumerating all of them.
    pub greedy: bool,
    /// How workers wait on an empty frontier.
    pub frontier_mode: FrontierMode,
    /// Delay between consecutive worker spawns.
    pub spawn_stagger: Duration,
    /// How long `stop` waits for workers before detaching them.
    pub stop_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            greedy: false,
            frontier_mode: FrontierMode::Blocking,
            spawn_stagger: Duration::from_millis(2),
            stop_grace: Duration::from_secs(2),
        }
    }
}

impl EngineConfig {
    pub const DEFAULT_POLL_BACKOFF: Duration = Duration::from_millis(1);

    /// Number of workers to use when the caller has no preference.
    pub fn default_workers() -> usize {
        num_cpus::get().max(1)
    }

    /// Enable or disable greedy (first solution wins) mode.
    pub fn with_greedy(mut self, greedy: bool) -> Self {
        self.greedy = greedy;
        self
    }

    pub fn with_frontier_mode(mut self, mode: FrontierMode) -> Self {
        self.frontier_mode = mode;
        self
    }

    /// Use polling pops with the given backoff between empty polls.
    pub fn with_polling(mut self, backoff: Duration) -> Self {
        self.frontier_mode = FrontierMode::Polling { backoff };
        self
    }

    pub fn with_spawn_stagger(mut self, stagger: Duration) -> Self {
        self.spawn_stagger = stagger;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(!config.greedy);
        assert_eq!(config.frontier_mode, FrontierMode::Blocking);
        assert!(config.stop_grace > Duration::ZERO);
        assert!(EngineConfig::default_workers() >= 1);
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::default()
            .with_greedy(true)
            .with_polling(Duration::from_millis(5))
            .with_spawn_stagger(Duration::ZERO)
            .with_stop_grace(Duration::from_millis(250));

        assert!(config.greedy);
        assert_eq!(
            config.frontier_mode,
            FrontierMode::Polling {
                backoff: Duration::from_millis(5)
            }
        );
        assert_eq!(config.spawn_stagger, Duration::ZERO);
        assert_eq!(config.stop_grace, Duration::from_millis(250));
    }

    #[test]
    fn test_frontier_mode_parse() {
        assert_eq!(
            "Blocking".parse::<FrontierMode>().unwrap(),
            FrontierMode::Blocking
        );
        assert!(matches!(
            "poll".parse::<FrontierMode>().unwrap(),
            FrontierMode::Polling { .. }
        ));
        assert!("lifo".parse::<FrontierMode>().is_err());
    }
}
