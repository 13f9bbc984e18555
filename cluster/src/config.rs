// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing configuration files and working with a cluster
//! daemon configuration

use crate::prober::DEFAULT_PROBE_PORT;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use dropshot::ConfigLogging;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration for the cluster daemon
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// Server-wide logging configuration.
    pub log: ConfigLogging,
    /// Configuration of the machine status task.
    #[serde(default)]
    pub status: StatusConfig,
    /// Machines to load into the store at startup.
    #[serde(default)]
    pub machines: Vec<MachineSeed>,
}

impl Config {
    /// Load a `Config` from the given TOML file
    pub fn from_file(path: &Utf8Path) -> Result<Config, LoadError> {
        let file_contents = std::fs::read_to_string(path)
            .map_err(|err| LoadError::Io { path: path.into(), err })?;
        let config_parsed: Config = toml::from_str(&file_contents)
            .map_err(|err| LoadError::Parse { path: path.into(), err })?;
        Ok(config_parsed)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct StatusConfig {
    /// how often a pass runs when nothing triggers one sooner
    pub period_secs: u64,
    /// TCP port that must accept connections for a machine to count as
    /// reachable
    pub probe_port: u16,
    pub probe_timeout_ms: u64,
    /// upper bound on probes in flight during one pass
    pub max_concurrent_probes: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            period_secs: 30,
            probe_port: DEFAULT_PROBE_PORT,
            probe_timeout_ms: 5000,
            max_concurrent_probes: 32,
        }
    }
}

/// A machine row to create at startup
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MachineSeed {
    pub stitch_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub private_ip: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing \"{path}\": {err}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: toml::de::Error,
    },
}

#[cfg(test)]
mod test {
    use super::Config;
    use super::LoadError;
    use super::StatusConfig;
    use assert_matches::assert_matches;
    use camino_tempfile::Utf8TempDir;
    use dropshot::ConfigLogging;
    use dropshot::ConfigLoggingLevel;

    fn write_config(dir: &Utf8TempDir, contents: &str) -> camino::Utf8PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_config_minimal() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [log]
            mode = "stderr-terminal"
            level = "info"
            "#,
        );
        let config = Config::from_file(&path).unwrap();
        assert_matches!(
            config.log,
            ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::Info }
        );
        assert_eq!(config.status, StatusConfig::default());
        assert!(config.machines.is_empty());
    }

    #[test]
    fn test_config_full() {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [log]
            mode = "stderr-terminal"
            level = "debug"

            [status]
            period_secs = 5
            probe_timeout_ms = 250

            [[machines]]
            stitch_id = "master-0"
            provider = "amazon"
            public_ip = "54.0.0.1"

            [[machines]]
            stitch_id = "worker-0"
            "#,
        );
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.status.period_secs, 5);
        assert_eq!(config.status.probe_timeout_ms, 250);
        // unspecified fields keep their defaults
        assert_eq!(config.status.probe_port, 22);
        assert_eq!(config.status.max_concurrent_probes, 32);

        assert_eq!(config.machines.len(), 2);
        assert_eq!(config.machines[0].stitch_id, "master-0");
        assert_eq!(config.machines[0].provider, "amazon");
        assert_eq!(config.machines[0].public_ip, "54.0.0.1");
        assert_eq!(config.machines[1].stitch_id, "worker-0");
        assert_eq!(config.machines[1].public_ip, "");
    }

    #[test]
    fn test_config_errors() {
        let dir = Utf8TempDir::new().unwrap();
        let error = Config::from_file(&dir.path().join("nonexistent.toml"))
            .unwrap_err();
        assert_matches!(error, LoadError::Io { .. });

        let path = write_config(&dir, "[status]\nperiod_secs = \"soon\"\n");
        let error = Config::from_file(&path).unwrap_err();
        assert_matches!(error, LoadError::Parse { .. });
        assert!(error.to_string().starts_with("error parsing"));
    }
}
