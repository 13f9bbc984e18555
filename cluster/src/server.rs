// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Running the cluster daemon

use crate::config::Config;
use crate::config::MachineSeed;
use crate::prober::TcpProber;
use crate::status::status_task_definition;
use anyhow::Context;
use quilt_common::background::Driver;
use quilt_common::FileKv;
use quilt_db::Conn;
use quilt_db::Machine;
use quilt_db::TableType;
use slog::Logger;
use std::sync::Arc;
use std::time::Duration;

/// Inserts a row for each configured machine
pub fn seed_machines(
    conn: &Conn,
    seeds: &[MachineSeed],
) -> Result<(), quilt_db::Error> {
    conn.transact(&[TableType::Machine], |view| {
        for seed in seeds {
            let mut machine = view.insert::<Machine>();
            machine.stitch_id = seed.stitch_id.clone();
            machine.provider = seed.provider.clone();
            machine.region = seed.region.clone();
            machine.size = seed.size.clone();
            machine.public_ip = seed.public_ip.clone();
            machine.private_ip = seed.private_ip.clone();
            view.commit(machine)?;
        }
        Ok(())
    })
}

/// Starts the cluster daemon's background tasks against `conn` and returns
/// the driver running them
pub fn start(log: &Logger, conn: &Conn, config: &Config) -> Driver {
    let prober = Arc::new(TcpProber::new(
        config.status.probe_port,
        Duration::from_millis(config.status.probe_timeout_ms),
    ));
    let mut driver = Driver::new(log.clone());
    let task = driver.register(status_task_definition(
        conn.clone(),
        prober,
        &config.status,
    ));
    info!(log, "started background task"; "task" => task.as_str());
    driver
}

/// Runs the cluster daemon until interrupted
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let log = config
        .log
        .to_logger("quilt-cluster")
        .context("initializing logger")?;
    let log = log.new(o!(FileKv));

    let conn = Conn::new();
    seed_machines(&conn, &config.machines)
        .context("loading configured machines")?;
    info!(log, "loaded machines"; "count" => config.machines.len());

    let driver = start(&log, &conn, &config);
    tokio::signal::ctrl_c().await.context("waiting for interrupt")?;
    info!(log, "shutting down");
    driver.shutdown().await;
    Ok(())
}
