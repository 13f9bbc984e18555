// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background task for tracking the connectivity lifecycle of machines
//!
//! Each pass probes every machine that has a public address and isn't still
//! booting, works out the machine's next [`MachineStatus`], and writes back
//! the statuses that changed in a single transaction.

use crate::config::StatusConfig;
use crate::prober::ConnectivityProber;
use futures::future::BoxFuture;
use futures::FutureExt;
use futures::StreamExt;
use quilt_common::background::BackgroundTask;
use quilt_common::background::TaskDefinition;
use quilt_db::Conn;
use quilt_db::Machine;
use quilt_db::MachineStatus;
use quilt_db::Row;
use quilt_db::RowId;
use quilt_db::TableType;
use serde::Serialize;
use serde_json::json;
use slog::Logger;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Returns whether a pass should probe `machine`
///
/// Machines without an address can't be probed, and booting machines are
/// owned by the provisioning layer until it moves them along.
pub fn needs_probe(machine: &Machine) -> bool {
    !machine.public_ip.is_empty() && machine.status != MachineStatus::Booting
}

/// Returns the status a probed machine should move to
pub fn next_status(current: MachineStatus, reachable: bool) -> MachineStatus {
    match (current, reachable) {
        (MachineStatus::Booting, _) => MachineStatus::Booting,
        (_, true) => MachineStatus::Connected,
        (MachineStatus::Unbooted | MachineStatus::Connecting, false) => {
            MachineStatus::Connecting
        }
        (MachineStatus::Connected | MachineStatus::Reconnecting, false) => {
            MachineStatus::Reconnecting
        }
    }
}

/// What one reconciliation pass did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusPassSummary {
    /// machines in the store when the pass started
    pub total: usize,
    /// machines probed
    pub probed: usize,
    /// machines whose status was written
    pub updated: usize,
    /// computed updates dropped because the row changed (or went away) while
    /// its machine was being probed
    pub stale: usize,
}

/// A status change computed from a probe, applied only if the row still looks
/// the way it did when it was probed
struct PendingUpdate {
    id: RowId,
    stitch_id: String,
    public_ip: String,
    from: MachineStatus,
    to: MachineStatus,
}

/// Keeps `Machine.status` in step with what the machines actually look like
pub struct MachineStatusReconciler {
    conn: Conn,
    prober: Arc<dyn ConnectivityProber>,
    max_concurrent_probes: usize,
}

impl MachineStatusReconciler {
    pub fn new(
        conn: Conn,
        prober: Arc<dyn ConnectivityProber>,
        max_concurrent_probes: usize,
    ) -> MachineStatusReconciler {
        MachineStatusReconciler {
            conn,
            prober,
            max_concurrent_probes: max_concurrent_probes.max(1),
        }
    }

    /// Runs one reconciliation pass
    ///
    /// Probes are issued concurrently and outside of any transaction.  The
    /// results are written back in one transaction; a machine whose row
    /// changed status or address in the meantime keeps whatever the store
    /// now says and is picked up again by the next pass.
    pub async fn reconcile_once(
        &self,
        log: &Logger,
    ) -> Result<StatusPassSummary, quilt_db::Error> {
        let machines = self.conn.select_from_machine(|_| true);
        let candidates: Vec<(RowId, String)> = machines
            .iter()
            .filter(|m| needs_probe(m))
            .map(|m| (m.id(), m.public_ip.clone()))
            .collect();
        let mut summary = StatusPassSummary {
            total: machines.len(),
            probed: candidates.len(),
            ..Default::default()
        };

        let prober = &self.prober;
        let reachable: BTreeMap<RowId, bool> = futures::stream::iter(candidates)
            .map(|(id, public_ip)| async move {
                (id, prober.probe(&public_ip).await)
            })
            .buffer_unordered(self.max_concurrent_probes)
            .collect()
            .await;

        let pending: Vec<PendingUpdate> = machines
            .iter()
            .filter_map(|machine| {
                let reachable = *reachable.get(&machine.id())?;
                let to = next_status(machine.status, reachable);
                (to != machine.status).then(|| PendingUpdate {
                    id: machine.id(),
                    stitch_id: machine.stitch_id.clone(),
                    public_ip: machine.public_ip.clone(),
                    from: machine.status,
                    to,
                })
            })
            .collect();

        let applied = self.conn.transact(&[TableType::Machine], |view| {
            let current: BTreeMap<RowId, Machine> = view
                .select::<Machine, _>(|_| true)
                .into_iter()
                .map(|m| (m.id(), m))
                .collect();
            let mut applied = Vec::new();
            for update in &pending {
                match current.get(&update.id) {
                    Some(machine)
                        if machine.status == update.from
                            && machine.public_ip == update.public_ip =>
                    {
                        let mut machine = machine.clone();
                        machine.status = update.to;
                        view.commit(machine)?;
                        applied.push(update);
                    }
                    _ => (),
                }
            }
            Ok::<_, quilt_db::Error>(applied)
        })?;

        for update in &applied {
            info!(log, "machine status changed";
                "machine_id" => %update.id,
                "stitch_id" => &update.stitch_id,
                "public_ip" => &update.public_ip,
                "from" => %update.from,
                "to" => %update.to,
            );
        }
        summary.updated = applied.len();
        summary.stale = pending.len() - applied.len();
        if summary.stale > 0 {
            debug!(log, "skipped stale status updates";
                "count" => summary.stale,
            );
        }
        Ok(summary)
    }
}

impl BackgroundTask for MachineStatusReconciler {
    fn activate<'a>(
        &'a mut self,
        log: &'a Logger,
    ) -> BoxFuture<'a, serde_json::Value> {
        async move {
            match self.reconcile_once(log).await {
                Ok(summary) => {
                    debug!(log, "machine status pass complete";
                        "total" => summary.total,
                        "probed" => summary.probed,
                        "updated" => summary.updated,
                        "stale" => summary.stale,
                    );
                    json!(summary)
                }
                Err(error) => {
                    warn!(log, "failed to write machine statuses";
                        "error" => %error,
                    );
                    json!({ "error": error.to_string() })
                }
            }
        }
        .boxed()
    }
}

/// Describes the machine status task for registration with a
/// [`quilt_common::background::Driver`]
///
/// The task runs every `config.period_secs` and whenever the machine table
/// changes.  A pass that writes a new status changes the machine table too, so
/// it is followed by one more pass; that pass finds nothing to write and the
/// task goes back to waiting.
pub fn status_task_definition(
    conn: Conn,
    prober: Arc<dyn ConnectivityProber>,
    config: &StatusConfig,
) -> TaskDefinition {
    let trigger = conn.trigger(TableType::Machine);
    TaskDefinition {
        name: String::from("machine_status"),
        description: String::from(
            "probes machines and records their connectivity status",
        ),
        period: Duration::from_secs(config.period_secs),
        task_impl: Box::new(MachineStatusReconciler::new(
            conn,
            prober,
            config.max_concurrent_probes,
        )),
        watchers: vec![Box::new(trigger)],
    }
}
