//! User agent rotation

use rand::seq::IndexedRandom;

/// Used only when the configured pool is empty
const FALLBACK_USER_AGENT: &str = concat!("sumi-harvest/", env!("CARGO_PKG_VERSION"));

/// Picks a user agent per request from a configured pool
#[derive(Debug, Clone)]
pub struct UserAgentRotator {
    agents: Vec<String>,
}

impl UserAgentRotator {
    pub fn new(agents: Vec<String>) -> Self {
        let agents = agents
            .into_iter()
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty())
            .collect();
        Self { agents }
    }

    /// Returns a uniformly random user agent from the pool
    pub fn next_agent(&self) -> &str {
        self.agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
