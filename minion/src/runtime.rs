// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interfaces for running the node's system workloads in containers

use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::Deserialize;
use serde::Serialize;
use slog::Logger;
use std::fmt;
use thiserror::Error;

/// Label attached to every container this node's supervisor starts
///
/// Its value is the workload's name.  [`ContainerRuntime::remove_all()`] only
/// touches containers carrying it.
pub const WORKLOAD_LABEL: &str = "quilt.workload";

/// A system workload the supervisor may run on this node
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Workload {
    /// the coordination store (a full member on masters, a proxy on workers)
    Etcd,
    Ovsdb,
    OvnController,
    OvsVswitchd,
    /// overlay network controller; runs on the leader only
    OvnNorthd,
    /// the node agent
    Kubelet,
}

impl Workload {
    /// Returns the name of this workload's container
    pub fn name(&self) -> &'static str {
        match self {
            Workload::Etcd => "etcd",
            Workload::Ovsdb => "ovsdb",
            Workload::OvnController => "ovn-controller",
            Workload::OvsVswitchd => "ovs-vswitchd",
            Workload::OvnNorthd => "ovn-northd",
            Workload::Kubelet => "kubelet",
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to start execution of [{command}]: {err}")]
    ExecutionStart {
        command: String,
        #[source]
        err: std::io::Error,
    },

    #[error(
        "command [{command}] failed (exit code {}): {stderr}",
        exit_code(.code)
    )]
    CommandFailure { command: String, code: Option<i32>, stderr: String },

    #[error("workload {0} is not running")]
    NotRunning(Workload),
}

/// Operations on the node's workload containers
///
/// Every operation is safe to repeat.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ensures `workload` is running
    ///
    /// If it's already running it is left alone, even if it was started with
    /// different arguments.  Callers that need new arguments to take effect
    /// remove the workload first.
    async fn start(
        &self,
        workload: Workload,
        args: &[String],
    ) -> Result<(), RuntimeError>;

    /// Ensures `workload` is not running
    async fn remove(&self, workload: Workload) -> Result<(), RuntimeError>;

    /// Removes every workload this node runs
    async fn remove_all(&self) -> Result<(), RuntimeError>;

    /// Runs `argv` inside the running `workload`
    async fn exec(
        &self,
        workload: Workload,
        argv: &[String],
    ) -> Result<(), RuntimeError>;
}

/// Container images used for each workload
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ImageConfig {
    pub etcd: String,
    /// image shared by the overlay network daemons
    pub ovs: String,
    pub kubelet: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        ImageConfig {
            etcd: String::from("quay.io/coreos/etcd:v3.0.2"),
            ovs: String::from("quilt/ovs"),
            kubelet: String::from("quilt/kubelet"),
        }
    }
}

impl ImageConfig {
    pub fn image(&self, workload: Workload) -> &str {
        match workload {
            Workload::Etcd => &self.etcd,
            Workload::Ovsdb
            | Workload::OvnController
            | Workload::OvsVswitchd
            | Workload::OvnNorthd => &self.ovs,
            Workload::Kubelet => &self.kubelet,
        }
    }
}

/// Configuration for [`DockerCli`]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DockerConfig {
    /// the docker executable (looked up in `PATH` if not absolute)
    pub docker_path: Utf8PathBuf,
    pub images: ImageConfig,
}

impl Default for DockerConfig {
    fn default() -> Self {
        DockerConfig {
            docker_path: Utf8PathBuf::from("docker"),
            images: ImageConfig::default(),
        }
    }
}

/// [`ContainerRuntime`] backed by the docker command-line client
///
/// Containers are named after their workload, run detached in the host's
/// network namespace, and carry [`WORKLOAD_LABEL`].
pub struct DockerCli {
    log: Logger,
    config: DockerConfig,
}

impl DockerCli {
    pub fn new(log: &Logger, config: DockerConfig) -> DockerCli {
        DockerCli { log: log.new(o!("component" => "DockerCli")), config }
    }

    async fn docker<I, S>(&self, args: I) -> Result<String, RuntimeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command =
            tokio::process::Command::new(&self.config.docker_path);
        command.args(args);
        debug!(self.log, "running docker";
            "command" => command_to_string(command.as_std()),
        );
        let output = execute_async(&mut command).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn is_running(
        &self,
        workload: Workload,
    ) -> Result<bool, RuntimeError> {
        let format = "{{.State.Running}}";
        let result =
            self.docker(["inspect", "--format", format, workload.name()]).await;
        match result {
            Ok(stdout) => Ok(stdout.trim() == "true"),
            Err(error) if is_no_such_container(&error) => Ok(false),
            Err(error) => Err(error),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start(
        &self,
        workload: Workload,
        args: &[String],
    ) -> Result<(), RuntimeError> {
        if self.is_running(workload).await? {
            return Ok(());
        }

        // A stopped container would hold on to the name.
        self.remove(workload).await?;

        let name = workload.name();
        let label = format!("{WORKLOAD_LABEL}={name}");
        let mut docker_args: Vec<&str> = vec![
            "run",
            "--detach",
            "--name",
            name,
            "--net=host",
            "--label",
            label.as_str(),
            self.config.images.image(workload),
        ];
        docker_args.extend(args.iter().map(String::as_str));
        self.docker(docker_args).await?;
        info!(self.log, "started workload"; "workload" => name);
        Ok(())
    }

    async fn remove(&self, workload: Workload) -> Result<(), RuntimeError> {
        match self.docker(["rm", "--force", workload.name()]).await {
            Ok(_) => Ok(()),
            Err(error) if is_no_such_container(&error) => Ok(()),
            Err(error) => Err(error),
        }
    }

    async fn remove_all(&self) -> Result<(), RuntimeError> {
        let filter = format!("label={WORKLOAD_LABEL}");
        let stdout = self
            .docker(["ps", "--all", "--quiet", "--filter", &filter])
            .await?;
        let ids: Vec<&str> = stdout.split_whitespace().collect();
        if ids.is_empty() {
            return Ok(());
        }
        let mut docker_args: Vec<&str> = vec!["rm", "--force"];
        docker_args.extend(ids.iter().copied());
        self.docker(docker_args).await?;
        info!(self.log, "removed all workloads"; "count" => ids.len());
        Ok(())
    }

    async fn exec(
        &self,
        workload: Workload,
        argv: &[String],
    ) -> Result<(), RuntimeError> {
        let mut docker_args: Vec<&str> = vec!["exec", workload.name()];
        docker_args.extend(argv.iter().map(String::as_str));
        match self.docker(docker_args).await {
            Ok(_) => Ok(()),
            Err(error) if is_no_such_container(&error) => {
                Err(RuntimeError::NotRunning(workload))
            }
            Err(error) => Err(error),
        }
    }
}

fn exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => String::from("none"),
    }
}

fn is_no_such_container(error: &RuntimeError) -> bool {
    match error {
        RuntimeError::CommandFailure { stderr, .. } => {
            stderr.contains("No such container")
                || stderr.contains("No such object")
        }
        _ => false,
    }
}

fn command_to_string(command: &std::process::Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<String>>()
        .join(" ")
}

// Runs the command to completion, turning a non-zero exit into an error.
async fn execute_async(
    command: &mut tokio::process::Command,
) -> Result<std::process::Output, RuntimeError> {
    let output = command.output().await.map_err(|err| {
        RuntimeError::ExecutionStart {
            command: command_to_string(command.as_std()),
            err,
        }
    })?;

    if !output.status.success() {
        return Err(RuntimeError::CommandFailure {
            command: command_to_string(command.as_std()),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output)
}
