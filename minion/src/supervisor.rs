// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Converges the node's running workloads on its assignment
//!
//! The supervisor remembers the last assignment it applied and, when the
//! assignment changes, restarts only the workloads whose configuration
//! depends on something that changed.  Restarting the coordination store or
//! the node agent is disruptive, so everything else is left running.
//!
//! The remembered assignment advances even when some runtime calls fail.  A
//! failed start is retried only once some other part of the assignment
//! changes (or the daemon restarts with an empty memory).

use crate::network::OvnEndpointConfig;
use crate::runtime::ContainerRuntime;
use crate::runtime::Workload;
use futures::future::BoxFuture;
use futures::FutureExt;
use quilt_common::background::BackgroundTask;
use quilt_common::background::TaskDefinition;
use quilt_db::Conn;
use quilt_db::Minion;
use quilt_db::Role;
use quilt_db::TableType;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use slog::Logger;
use std::sync::Arc;
use std::time::Duration;

/// The part of a [`Minion`] row the supervisor acts on
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Assignment {
    pub role: Role,
    pub etcd_token: String,
    pub leader_ip: String,
    pub private_ip: String,
    pub leader: bool,
}

impl Assignment {
    /// Returns the assignment described by the Minion table's rows
    ///
    /// Anything other than exactly one row means the node is unassigned.
    pub fn from_rows(rows: &[Minion]) -> Assignment {
        match rows {
            [row] => Assignment::from(row),
            _ => Assignment::default(),
        }
    }
}

impl From<&Minion> for Assignment {
    fn from(row: &Minion) -> Self {
        Assignment {
            role: row.role,
            etcd_token: row.etcd_token.clone(),
            leader_ip: row.leader_ip.clone(),
            private_ip: row.private_ip.clone(),
            leader: row.leader,
        }
    }
}

pub fn master_etcd_args(ip: &str, etcd_token: &str) -> Vec<String> {
    vec![
        format!("--name=master-{ip}"),
        format!("--discovery={etcd_token}"),
        format!("--advertise-client-urls=http://{ip}:2379"),
        format!("--listen-peer-urls=http://{ip}:2380"),
        format!("--initial-advertise-peer-urls=http://{ip}:2380"),
        String::from("--listen-client-urls=http://0.0.0.0:2379"),
    ]
}

pub fn worker_etcd_args(etcd_token: &str) -> Vec<String> {
    vec![format!("--discovery={etcd_token}"), String::from("--proxy=on")]
}

pub fn master_kubelet_args(ip: &str) -> Vec<String> {
    vec![String::from("/usr/bin/boot-master"), ip.to_string()]
}

pub fn worker_kubelet_args(ip: &str, leader_ip: &str) -> Vec<String> {
    vec![
        String::from("/usr/bin/boot-worker"),
        ip.to_string(),
        leader_ip.to_string(),
    ]
}

/// What a call to [`Supervisor::reconcile()`] did
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// the assignment matched the one last applied
    Unchanged,
    /// the assignment was applied
    Applied {
        role_changed: bool,
        /// runtime calls that failed
        failures: usize,
    },
}

/// Runs the node's workloads according to its [`Assignment`]
pub struct Supervisor {
    runtime: Arc<dyn ContainerRuntime>,
    applied: Assignment,
}

impl Supervisor {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Supervisor {
        Supervisor { runtime, applied: Assignment::default() }
    }

    /// Returns the assignment most recently applied
    pub fn applied(&self) -> &Assignment {
        &self.applied
    }

    pub async fn reconcile(
        &mut self,
        log: &Logger,
        desired: Assignment,
    ) -> ReconcileOutcome {
        if desired == self.applied {
            return ReconcileOutcome::Unchanged;
        }

        let previous = &self.applied;
        let mut actions =
            Actions { runtime: self.runtime.as_ref(), log, failures: 0 };

        let role_changed = desired.role != previous.role;
        if role_changed {
            info!(log, "role changed";
                "from" => %previous.role,
                "to" => %desired.role,
            );
            actions.remove_all().await;
        }

        match desired.role {
            Role::Master => {
                update_master(&mut actions, previous, &desired).await
            }
            Role::Worker => {
                update_worker(&mut actions, previous, &desired).await
            }
            Role::None => (),
        }

        let failures = actions.failures;
        info!(log, "applied assignment";
            "role" => %desired.role,
            "private_ip" => &desired.private_ip,
            "leader_ip" => &desired.leader_ip,
            "leader" => desired.leader,
            "failures" => failures,
        );
        self.applied = desired;
        ReconcileOutcome::Applied { role_changed, failures }
    }
}

async fn update_master(
    actions: &mut Actions<'_>,
    previous: &Assignment,
    desired: &Assignment,
) {
    let ip = &desired.private_ip;
    let etcd_token = &desired.etcd_token;

    if previous.private_ip != *ip || previous.etcd_token != *etcd_token {
        actions.remove(Workload::Etcd).await;
    }
    if previous.private_ip != *ip {
        actions.remove(Workload::Kubelet).await;
    }
    if ip.is_empty() || etcd_token.is_empty() {
        return;
    }

    actions.start(Workload::Etcd, master_etcd_args(ip, etcd_token)).await;
    actions.start(Workload::Ovsdb, Vec::new()).await;
    actions.start(Workload::Kubelet, master_kubelet_args(ip)).await;

    // If the overlay controller can't be started this node stays the leader
    // anyway; there is no health monitoring that would hand leadership off.
    if desired.leader {
        actions.start(Workload::OvnNorthd, Vec::new()).await;
    } else {
        actions.remove(Workload::OvnNorthd).await;
    }
}

async fn update_worker(
    actions: &mut Actions<'_>,
    previous: &Assignment,
    desired: &Assignment,
) {
    let ip = &desired.private_ip;
    let leader_ip = &desired.leader_ip;

    if previous.etcd_token != desired.etcd_token {
        actions.remove(Workload::Etcd).await;
    }
    if previous.leader_ip != *leader_ip || previous.private_ip != *ip {
        actions.remove(Workload::Kubelet).await;
    }

    actions
        .start(Workload::Etcd, worker_etcd_args(&desired.etcd_token))
        .await;
    actions.start(Workload::Ovsdb, Vec::new()).await;
    actions.start(Workload::OvnController, Vec::new()).await;
    actions.start(Workload::OvsVswitchd, Vec::new()).await;

    if leader_ip.is_empty() || ip.is_empty() {
        return;
    }

    actions.start(Workload::Kubelet, worker_kubelet_args(ip, leader_ip)).await;
    let endpoint = OvnEndpointConfig::new(leader_ip, ip);
    actions.exec(Workload::OvsVswitchd, endpoint.ovs_vsctl_argv()).await;
}

/// Issues runtime calls for one pass, logging and counting failures
struct Actions<'a> {
    runtime: &'a dyn ContainerRuntime,
    log: &'a Logger,
    failures: usize,
}

impl Actions<'_> {
    async fn start(&mut self, workload: Workload, args: Vec<String>) {
        if let Err(error) = self.runtime.start(workload, &args).await {
            warn!(self.log, "failed to start workload";
                "workload" => %workload,
                "error" => %error,
            );
            self.failures += 1;
        }
    }

    async fn remove(&mut self, workload: Workload) {
        if let Err(error) = self.runtime.remove(workload).await {
            warn!(self.log, "failed to remove workload";
                "workload" => %workload,
                "error" => %error,
            );
            self.failures += 1;
        }
    }

    async fn remove_all(&mut self) {
        if let Err(error) = self.runtime.remove_all().await {
            warn!(self.log, "failed to remove workloads"; "error" => %error);
            self.failures += 1;
        }
    }

    async fn exec(&mut self, workload: Workload, argv: Vec<String>) {
        if let Err(error) = self.runtime.exec(workload, &argv).await {
            warn!(self.log, "failed to exec in workload";
                "workload" => %workload,
                "error" => %error,
            );
            self.failures += 1;
        }
    }
}

/// Background task that feeds the Minion table to a [`Supervisor`]
pub struct SupervisorTask {
    conn: Conn,
    supervisor: Supervisor,
}

impl SupervisorTask {
    pub fn new(conn: Conn, runtime: Arc<dyn ContainerRuntime>) -> Self {
        SupervisorTask { conn, supervisor: Supervisor::new(runtime) }
    }
}

impl BackgroundTask for SupervisorTask {
    fn activate<'a>(
        &'a mut self,
        log: &'a Logger,
    ) -> BoxFuture<'a, serde_json::Value> {
        async move {
            let rows = self.conn.select_from_minion(|_| true);
            if rows.len() > 1 {
                warn!(log, "multiple minion rows, treating node as unassigned";
                    "count" => rows.len(),
                );
            }
            let desired = Assignment::from_rows(&rows);
            let outcome = self.supervisor.reconcile(log, desired).await;
            json!({
                "role": self.supervisor.applied().role,
                "result": outcome,
            })
        }
        .boxed()
    }
}

/// Describes the supervisor task for registration with a
/// [`quilt_common::background::Driver`]
///
/// The task runs whenever the Minion table changes, and every `period` in
/// case a change was missed.
pub fn supervisor_task_definition(
    conn: Conn,
    runtime: Arc<dyn ContainerRuntime>,
    period: Duration,
) -> TaskDefinition {
    let trigger = conn.trigger(TableType::Minion);
    TaskDefinition {
        name: String::from("role_supervisor"),
        description: String::from(
            "runs the workloads called for by this node's assignment",
        ),
        period,
        task_impl: Box::new(SupervisorTask::new(conn, runtime)),
        watchers: vec![Box::new(trigger)],
    }
}

#[cfg(test)]
mod test {
    use super::master_etcd_args;
    use super::worker_etcd_args;
    use super::Assignment;
    use super::ReconcileOutcome;
    use super::Supervisor;
    use super::SupervisorTask;
    use crate::fakes::FakeRuntime;
    use crate::fakes::RuntimeCall;
    use crate::network::OvnEndpointConfig;
    use crate::runtime::Workload;
    use assert_matches::assert_matches;
    use quilt_common::background::BackgroundTask;
    use quilt_db::Conn;
    use quilt_db::Minion;
    use quilt_db::Role;
    use quilt_db::TableType;
    use quilt_test_utils::dev::test_setup_log;
    use std::collections::BTreeSet;

    fn worker(token: &str, leader_ip: &str, ip: &str) -> Assignment {
        Assignment {
            role: Role::Worker,
            etcd_token: token.to_string(),
            leader_ip: leader_ip.to_string(),
            private_ip: ip.to_string(),
            leader: false,
        }
    }

    fn master(token: &str, ip: &str, leader: bool) -> Assignment {
        Assignment {
            role: Role::Master,
            etcd_token: token.to_string(),
            leader_ip: String::new(),
            private_ip: ip.to_string(),
            leader,
        }
    }

    fn start(workload: Workload, args: &[&str]) -> RuntimeCall {
        RuntimeCall::Start(
            workload,
            args.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn running(runtime: &FakeRuntime) -> BTreeSet<Workload> {
        runtime.running().into_keys().collect()
    }

    #[tokio::test]
    async fn test_worker_without_leader() {
        let logctx = test_setup_log("test_worker_without_leader");
        let runtime = FakeRuntime::new();
        let mut supervisor = Supervisor::new(runtime.clone());

        let outcome = supervisor
            .reconcile(&logctx.log, worker("t1", "", "10.0.0.5"))
            .await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied { role_changed: true, failures: 0 }
        );
        assert_eq!(
            runtime.take_calls(),
            vec![
                RuntimeCall::RemoveAll,
                RuntimeCall::Remove(Workload::Etcd),
                RuntimeCall::Remove(Workload::Kubelet),
                start(Workload::Etcd, &["--discovery=t1", "--proxy=on"]),
                start(Workload::Ovsdb, &[]),
                start(Workload::OvnController, &[]),
                start(Workload::OvsVswitchd, &[]),
            ]
        );

        // No leader yet, so no node agent and no overlay endpoint.
        assert_eq!(
            running(&runtime),
            BTreeSet::from([
                Workload::Etcd,
                Workload::Ovsdb,
                Workload::OvnController,
                Workload::OvsVswitchd,
            ])
        );

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_worker_learns_leader() {
        let logctx = test_setup_log("test_worker_learns_leader");
        let log = &logctx.log;
        let runtime = FakeRuntime::new();
        let mut supervisor = Supervisor::new(runtime.clone());
        supervisor.reconcile(log, worker("t1", "", "10.0.0.5")).await;
        runtime.take_calls();

        let assignment = worker("t1", "10.0.0.1", "10.0.0.5");
        let outcome = supervisor.reconcile(log, assignment).await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied { role_changed: false, failures: 0 }
        );
        let endpoint = OvnEndpointConfig::new("10.0.0.1", "10.0.0.5");
        assert_eq!(
            runtime.take_calls(),
            vec![
                RuntimeCall::Remove(Workload::Kubelet),
                start(Workload::Etcd, &["--discovery=t1", "--proxy=on"]),
                start(Workload::Ovsdb, &[]),
                start(Workload::OvnController, &[]),
                start(Workload::OvsVswitchd, &[]),
                start(
                    Workload::Kubelet,
                    &["/usr/bin/boot-worker", "10.0.0.5", "10.0.0.1"]
                ),
                RuntimeCall::Exec(
                    Workload::OvsVswitchd,
                    endpoint.ovs_vsctl_argv()
                ),
            ]
        );

        // Etcd kept running with its original arguments; it was never
        // removed because the token didn't change.
        assert_eq!(
            runtime.running()[&Workload::Etcd],
            worker_etcd_args("t1")
        );

        // A new token restarts the proxy but leaves the node agent alone.
        supervisor.reconcile(log, worker("t2", "10.0.0.1", "10.0.0.5")).await;
        let calls = runtime.take_calls();
        assert_eq!(calls[0], RuntimeCall::Remove(Workload::Etcd));
        assert!(!calls.contains(&RuntimeCall::Remove(Workload::Kubelet)));
        assert_eq!(
            runtime.running()[&Workload::Etcd],
            worker_etcd_args("t2")
        );

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_unchanged_assignment_is_a_no_op() {
        let logctx = test_setup_log("test_unchanged_assignment_is_a_no_op");
        let log = &logctx.log;
        let runtime = FakeRuntime::new();
        let mut supervisor = Supervisor::new(runtime.clone());

        // The initial memory is the empty assignment, so an unassigned node
        // has nothing to do.
        assert_eq!(
            supervisor.reconcile(log, Assignment::default()).await,
            ReconcileOutcome::Unchanged
        );
        assert!(runtime.take_calls().is_empty());

        let assignment = master("t1", "10.0.0.2", true);
        supervisor.reconcile(log, assignment.clone()).await;
        assert!(!runtime.take_calls().is_empty());
        assert_eq!(
            supervisor.reconcile(log, assignment.clone()).await,
            ReconcileOutcome::Unchanged
        );
        assert!(runtime.take_calls().is_empty());
        assert_eq!(supervisor.applied(), &assignment);

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_master() {
        let logctx = test_setup_log("test_master");
        let log = &logctx.log;
        let runtime = FakeRuntime::new();
        let mut supervisor = Supervisor::new(runtime.clone());

        supervisor.reconcile(log, master("t1", "10.0.0.2", false)).await;
        let master_etcd = master_etcd_args("10.0.0.2", "t1");
        assert_eq!(
            master_etcd,
            vec![
                "--name=master-10.0.0.2",
                "--discovery=t1",
                "--advertise-client-urls=http://10.0.0.2:2379",
                "--listen-peer-urls=http://10.0.0.2:2380",
                "--initial-advertise-peer-urls=http://10.0.0.2:2380",
                "--listen-client-urls=http://0.0.0.0:2379",
            ]
        );
        assert_eq!(
            runtime.take_calls(),
            vec![
                RuntimeCall::RemoveAll,
                RuntimeCall::Remove(Workload::Etcd),
                RuntimeCall::Remove(Workload::Kubelet),
                RuntimeCall::Start(Workload::Etcd, master_etcd.clone()),
                start(Workload::Ovsdb, &[]),
                start(Workload::Kubelet, &["/usr/bin/boot-master", "10.0.0.2"]),
                RuntimeCall::Remove(Workload::OvnNorthd),
            ]
        );

        // Gaining leadership starts the overlay controller and nothing else
        // is restarted.
        supervisor.reconcile(log, master("t1", "10.0.0.2", true)).await;
        let calls = runtime.take_calls();
        assert_eq!(calls.last(), Some(&start(Workload::OvnNorthd, &[])));
        assert!(!calls.iter().any(|c| matches!(c, RuntimeCall::Remove(_))));
        assert!(running(&runtime).contains(&Workload::OvnNorthd));

        // Losing it stops the controller again.
        supervisor.reconcile(log, master("t1", "10.0.0.2", false)).await;
        let calls = runtime.take_calls();
        assert_eq!(
            calls.last(),
            Some(&RuntimeCall::Remove(Workload::OvnNorthd))
        );
        assert!(!running(&runtime).contains(&Workload::OvnNorthd));

        // A new address restarts both the coordination store and the node
        // agent.
        supervisor.reconcile(log, master("t1", "10.0.0.3", false)).await;
        let calls = runtime.take_calls();
        assert_eq!(
            &calls[..2],
            &[
                RuntimeCall::Remove(Workload::Etcd),
                RuntimeCall::Remove(Workload::Kubelet),
            ]
        );
        assert_eq!(
            runtime.running()[&Workload::Kubelet],
            vec!["/usr/bin/boot-master", "10.0.0.3"]
        );

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_master_without_token() {
        let logctx = test_setup_log("test_master_without_token");
        let log = &logctx.log;
        let runtime = FakeRuntime::new();
        let mut supervisor = Supervisor::new(runtime.clone());

        supervisor.reconcile(log, master("", "10.0.0.2", true)).await;
        assert_eq!(
            runtime.take_calls(),
            vec![
                RuntimeCall::RemoveAll,
                RuntimeCall::Remove(Workload::Etcd),
                RuntimeCall::Remove(Workload::Kubelet),
            ]
        );
        assert!(running(&runtime).is_empty());

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_master_new_token_keeps_node_agent() {
        let logctx = test_setup_log("test_master_new_token_keeps_node_agent");
        let log = &logctx.log;
        let runtime = FakeRuntime::new();
        let mut supervisor = Supervisor::new(runtime.clone());

        supervisor.reconcile(log, master("t1", "10.0.0.2", false)).await;
        runtime.take_calls();

        // Only the coordination store depends on the token.
        let outcome =
            supervisor.reconcile(log, master("t2", "10.0.0.2", false)).await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied { role_changed: false, failures: 0 }
        );
        let calls = runtime.take_calls();
        assert_eq!(calls[0], RuntimeCall::Remove(Workload::Etcd));
        assert!(!calls.contains(&RuntimeCall::Remove(Workload::Kubelet)));
        assert!(!calls.contains(&RuntimeCall::RemoveAll));

        let running = runtime.running();
        assert_eq!(
            running[&Workload::Etcd],
            master_etcd_args("10.0.0.2", "t2")
        );
        assert_eq!(
            running[&Workload::Kubelet],
            vec!["/usr/bin/boot-master", "10.0.0.2"]
        );

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_role_change_removes_everything() {
        let logctx = test_setup_log("test_role_change_removes_everything");
        let log = &logctx.log;
        let runtime = FakeRuntime::new();
        let mut supervisor = Supervisor::new(runtime.clone());

        let as_master = master("t1", "10.0.0.2", true);
        let as_worker = worker("t1", "10.0.0.9", "10.0.0.2");

        for (assignment, role) in [
            (as_master.clone(), Role::Master),
            (as_worker, Role::Worker),
            (as_master, Role::Master),
        ] {
            let outcome = supervisor.reconcile(log, assignment).await;
            assert_eq!(
                outcome,
                ReconcileOutcome::Applied { role_changed: true, failures: 0 }
            );
            assert_eq!(supervisor.applied().role, role);
            let calls = runtime.take_calls();
            assert_eq!(calls[0], RuntimeCall::RemoveAll);
            assert_eq!(
                calls.iter().filter(|c| **c == RuntimeCall::RemoveAll).count(),
                1
            );
        }

        // Returning to the master role, the coordination store is started
        // with master arguments even though the address and token match what
        // the worker role used.
        assert_eq!(
            runtime.running()[&Workload::Etcd],
            master_etcd_args("10.0.0.2", "t1")
        );
        assert!(!running(&runtime).contains(&Workload::OvnController));

        // Dropping the role removes everything and starts nothing.
        supervisor.reconcile(log, Assignment::default()).await;
        assert_eq!(runtime.take_calls(), vec![RuntimeCall::RemoveAll]);
        assert!(running(&runtime).is_empty());

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_failures_still_advance() {
        let logctx = test_setup_log("test_failures_still_advance");
        let log = &logctx.log;
        let runtime = FakeRuntime::new();
        runtime.set_start_fails(Workload::OvnNorthd, true);
        let mut supervisor = Supervisor::new(runtime.clone());

        let assignment = master("t1", "10.0.0.2", true);
        let outcome = supervisor.reconcile(log, assignment.clone()).await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied { role_changed: true, failures: 1 }
        );
        assert_eq!(supervisor.applied(), &assignment);
        assert!(supervisor.applied().leader);
        assert!(!running(&runtime).contains(&Workload::OvnNorthd));

        // The failed start isn't retried until something else changes.
        runtime.set_start_fails(Workload::OvnNorthd, false);
        runtime.take_calls();
        assert_eq!(
            supervisor.reconcile(log, assignment).await,
            ReconcileOutcome::Unchanged
        );
        assert!(runtime.take_calls().is_empty());
        assert!(!running(&runtime).contains(&Workload::OvnNorthd));

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_failed_exec_is_counted() {
        let logctx = test_setup_log("test_failed_exec_is_counted");
        let runtime = FakeRuntime::new();
        runtime.set_start_fails(Workload::OvsVswitchd, true);
        let mut supervisor = Supervisor::new(runtime.clone());

        // With the switch down, both its start and the endpoint exec fail,
        // and everything else still happens.
        let outcome = supervisor
            .reconcile(&logctx.log, worker("t1", "10.0.0.1", "10.0.0.5"))
            .await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Applied { role_changed: true, failures: 2 }
        );
        assert!(running(&runtime).contains(&Workload::Kubelet));

        logctx.cleanup_successful();
    }

    #[test]
    fn test_assignment_from_rows() {
        let conn = Conn::new();
        assert_eq!(
            Assignment::from_rows(&conn.select_from_minion(|_| true)),
            Assignment::default()
        );

        conn.transact(&[TableType::Minion], |view| {
            let mut m = view.insert::<Minion>();
            m.role = Role::Worker;
            m.etcd_token = String::from("t1");
            m.private_ip = String::from("10.0.0.5");
            view.commit(m)
        })
        .unwrap();
        assert_eq!(
            Assignment::from_rows(&conn.select_from_minion(|_| true)),
            worker("t1", "", "10.0.0.5")
        );

        conn.transact(&[TableType::Minion], |view| {
            let mut m = view.insert::<Minion>();
            m.role = Role::Master;
            view.commit(m)
        })
        .unwrap();
        assert_eq!(
            Assignment::from_rows(&conn.select_from_minion(|_| true)),
            Assignment::default()
        );
    }

    #[tokio::test]
    async fn test_task_reads_minion_table() {
        let logctx = test_setup_log("test_task_reads_minion_table");
        let conn = Conn::new();
        let runtime = FakeRuntime::new();
        let mut task = SupervisorTask::new(conn.clone(), runtime.clone());

        let details = task.activate(&logctx.log).await;
        assert_eq!(
            details,
            serde_json::json!({
                "role": "none",
                "result": { "outcome": "unchanged" },
            })
        );

        conn.transact(&[TableType::Minion], |view| {
            let mut m = view.insert::<Minion>();
            m.role = Role::Worker;
            m.etcd_token = String::from("t1");
            view.commit(m)
        })
        .unwrap();
        let details = task.activate(&logctx.log).await;
        assert_eq!(
            details,
            serde_json::json!({
                "role": "worker",
                "result": {
                    "outcome": "applied",
                    "role_changed": true,
                    "failures": 0,
                },
            })
        );
        assert_matches!(
            runtime.take_calls().first(),
            Some(RuntimeCall::RemoveAll)
        );

        logctx.cleanup_successful();
    }
}
