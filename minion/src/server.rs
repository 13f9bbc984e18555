// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Running the minion daemon

use crate::config::Config;
use crate::runtime::ContainerRuntime;
use crate::runtime::DockerCli;
use crate::supervisor::supervisor_task_definition;
use crate::supervisor::Assignment;
use anyhow::Context;
use quilt_common::background::Driver;
use quilt_common::FileKv;
use quilt_db::Conn;
use quilt_db::Minion;
use quilt_db::TableType;
use slog::Logger;
use std::sync::Arc;
use std::time::Duration;

/// Replaces the Minion table's contents with a single row for `assignment`
pub fn set_assignment(
    conn: &Conn,
    assignment: &Assignment,
) -> Result<(), quilt_db::Error> {
    conn.transact(&[TableType::Minion], |view| {
        for row in view.select::<Minion, _>(|_| true) {
            view.remove(&row)?;
        }
        let mut row = view.insert::<Minion>();
        row.role = assignment.role;
        row.etcd_token = assignment.etcd_token.clone();
        row.leader_ip = assignment.leader_ip.clone();
        row.private_ip = assignment.private_ip.clone();
        row.leader = assignment.leader;
        view.commit(row)
    })
}

/// Starts the minion daemon's background tasks against `conn` and returns
/// the driver running them
pub fn start(
    log: &Logger,
    conn: &Conn,
    runtime: Arc<dyn ContainerRuntime>,
    config: &Config,
) -> Driver {
    let mut driver = Driver::new(log.clone());
    let task = driver.register(supervisor_task_definition(
        conn.clone(),
        runtime,
        Duration::from_secs(config.supervisor.period_secs),
    ));
    info!(log, "started background task"; "task" => task.as_str());
    driver
}

/// Runs the minion daemon until interrupted
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let log = config
        .log
        .to_logger("quilt-minion")
        .context("initializing logger")?;
    let log = log.new(o!(FileKv));

    let conn = Conn::new();
    if let Some(assignment) = &config.assignment {
        set_assignment(&conn, assignment)
            .context("loading configured assignment")?;
        info!(log, "loaded assignment"; "role" => %assignment.role);
    }

    let runtime = Arc::new(DockerCli::new(&log, config.runtime.clone()));
    let driver = start(&log, &conn, runtime, &config);
    tokio::signal::ctrl_c().await.context("waiting for interrupt")?;
    info!(log, "shutting down");
    driver.shutdown().await;
    Ok(())
}
