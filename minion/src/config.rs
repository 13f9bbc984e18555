// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for parsing configuration files and working with a minion
//! daemon configuration

use crate::runtime::DockerConfig;
use crate::supervisor::Assignment;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use dropshot::ConfigLogging;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration for the minion daemon
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Config {
    /// Server-wide logging configuration.
    pub log: ConfigLogging,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// How workloads are run.
    #[serde(default)]
    pub runtime: DockerConfig,
    /// This node's assignment, if it's known at startup.
    #[serde(default)]
    pub assignment: Option<Assignment>,
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
pub struct SupervisorConfig {
    /// how often the supervisor re-checks the assignment when nothing
    /// triggers it sooner
    pub period_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig { period_secs: 60 }
    }
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
    use crate::runtime::DockerConfig;
    use crate::runtime::Workload;
    use crate::supervisor::Assignment;
    use assert_matches::assert_matches;
    use camino_tempfile::Utf8TempDir;
    use quilt_db::Role;

    #[test]
    fn test_config_defaults() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[log]\nmode = \"stderr-terminal\"\nlevel = \"info\"\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.supervisor.period_secs, 60);
        assert_eq!(config.runtime, DockerConfig::default());
        assert_eq!(config.runtime.docker_path, "docker");
        assert_eq!(config.assignment, None);
    }

    #[test]
    fn test_config_full() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [log]
            mode = "stderr-terminal"
            level = "debug"

            [supervisor]
            period_secs = 10

            [runtime]
            docker_path = "/usr/local/bin/docker"

            [runtime.images]
            ovs = "registry.local/ovs:2.5"

            [assignment]
            role = "worker"
            etcd_token = "https://discovery.etcd.io/abc"
            private_ip = "10.0.0.5"
            "#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.supervisor.period_secs, 10);
        assert_eq!(config.runtime.docker_path, "/usr/local/bin/docker");
        assert_eq!(
            config.runtime.images.image(Workload::OvsVswitchd),
            "registry.local/ovs:2.5"
        );
        assert_eq!(
            config.runtime.images.image(Workload::Etcd),
            "quay.io/coreos/etcd:v3.0.2"
        );
        assert_eq!(
            config.assignment,
            Some(Assignment {
                role: Role::Worker,
                etcd_token: String::from("https://discovery.etcd.io/abc"),
                private_ip: String::from("10.0.0.5"),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_config_bad_role() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[log]\nmode = \"stderr-terminal\"\nlevel = \"info\"\n\
            [assignment]\nrole = \"overlord\"\n",
        )
        .unwrap();
        assert_matches!(Config::from_file(&path), Err(LoadError::Parse { .. }));
    }
}
