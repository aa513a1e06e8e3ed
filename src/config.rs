// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Configuration management
//!
//! Settings are layered: built-in defaults, then an optional TOML file,
//! then `COMBOGRAPH_<SECTION>__<KEY>` environment variables. CLI flags are
//! applied on top by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "COMBOGRAPH";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
    /// Dataset location
    pub dataset: DatasetSettings,
    /// Service front-end
    pub server: ServerSettings,
    /// Query engine limits
    pub query: QuerySettings,
    /// Client stub behaviour
    pub client: ClientSettings,
}

/// Where the combo dataset lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    /// Path to the dataset JSON
    pub path: PathBuf,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("commander_spellbook_data.json"),
        }
    }
}

/// Service front-end settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// How long a request waits for the graph to finish loading
    pub readiness_wait_ms: u64,
    /// Requests dispatched at once across all connections, also the cap on
    /// frames in flight on a single connection
    pub max_concurrent_requests: usize,
    /// Longest accepted frame in bytes
    pub max_frame_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            readiness_wait_ms: 10_000,
            max_concurrent_requests: 64,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl ServerSettings {
    /// `host:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Readiness wait as a duration
    #[must_use]
    pub fn readiness_wait(&self) -> Duration {
        Duration::from_millis(self.readiness_wait_ms)
    }
}

/// Query engine limits and defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Entries in statistics top lists
    pub top_n: usize,
    /// Deepest chain search accepted
    pub max_chain_depth: usize,
    /// Paths returned by one chain search before truncating
    pub max_chains: usize,
    /// Card graphs larger than this get sampled betweenness
    pub exact_betweenness_limit: usize,
    /// Power iteration cap for eigenvector centrality
    pub eigenvector_max_iter: usize,
    /// Per-node convergence tolerance for eigenvector centrality
    pub eigenvector_tolerance: f64,
    /// Default number of packages returned
    pub package_limit: usize,
    /// Default number of cards in the importance ranking
    pub top_cards_limit: usize,
    /// Default number of combos in a color identity listing
    pub color_identity_limit: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            top_n: 10,
            max_chain_depth: 6,
            max_chains: 10_000,
            exact_betweenness_limit: 1000,
            eigenvector_max_iter: 1000,
            eigenvector_tolerance: 1e-6,
            package_limit: 50,
            top_cards_limit: 20,
            color_identity_limit: 100,
        }
    }
}

/// Client stub settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// Requests awaiting a response at once
    pub max_pending: usize,
    /// Delay between readiness polls
    pub poll_interval_ms: u64,
    /// Give up waiting for readiness after this long
    pub ready_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            max_pending: 1024,
            poll_interval_ms: 250,
            ready_timeout_ms: 60_000,
        }
    }
}

impl ClientSettings {
    /// Request timeout as a duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Poll interval as a duration
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Readiness timeout as a duration
    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

/// Default config file: `<config dir>/combograph/config.toml`
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "hyperpolymath", "combograph")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from an explicit file, the default file, and the
/// environment. An explicit file must exist; the default one may not.
pub fn load(explicit: Option<&Path>) -> Result<Settings> {
    let mut builder = config::Config::builder();

    match explicit {
        Some(path) => {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }
        None => {
            if let Some(path) = default_config_path() {
                builder = builder.add_source(config::File::from(path).required(false));
            }
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let settings = builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize::<Settings>()
        .context("Invalid configuration")?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.address(), "127.0.0.1:8080");
        assert_eq!(settings.client.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.query.max_chain_depth, 6);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("combograph.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nport = 9123\n\n[dataset]\npath = \"/data/combos.json\"\n\n[query]\ntop_n = 3"
        )
        .unwrap();

        let settings = load(Some(&path)).unwrap();

        assert_eq!(settings.server.port, 9123);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.dataset.path, PathBuf::from("/data/combos.json"));
        assert_eq!(settings.query.top_n, 3);
        assert_eq!(settings.query.max_chains, 10_000);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(load(Some(Path::new("/no/such/combograph.toml"))).is_err());
    }
}
