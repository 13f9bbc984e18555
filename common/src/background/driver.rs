// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Manages execution of background tasks

use super::ActivationReason;
use super::BackgroundTask;
use super::CurrentStatus;
use super::CurrentStatusRunning;
use super::LastResult;
use super::LastResultCompleted;
use super::TaskStatus;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::FutureExt;
use futures::StreamExt;
use slog::Logger;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;
use tokio::sync::watch;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

/// Drives the execution of background tasks
///
/// Each daemon has one Driver.  All of its background tasks are registered
/// with the Driver at startup.  The Driver runs each background task in a
/// separate tokio task and provides interfaces for monitoring high-level state
/// of each task (e.g., when it last ran, whether it's currently running, etc.).
pub struct Driver {
    log: Logger,
    tasks: BTreeMap<TaskName, Task>,
    /// flipped to `true` by [`Driver::shutdown()`]
    shutdown_tx: watch::Sender<bool>,
}

/// Identifies a background task
#[derive(Clone, Debug, Ord, PartialOrd, PartialEq, Eq)]
pub struct TaskName(String);

impl TaskName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Everything needed to register a background task with the [`Driver`]
pub struct TaskDefinition {
    /// unique name of the task
    pub name: String,
    /// what this task does (for developers)
    pub description: String,
    /// the task is activated at least this often
    pub period: Duration,
    /// the work done on each activation
    pub task_impl: Box<dyn BackgroundTask>,
    /// the task is activated whenever any of these changes
    pub watchers: Vec<Box<dyn GenericWatcher>>,
}

/// Driver-side state of a background task
struct Task {
    /// what this task does (for developers)
    description: String,
    /// configured period of the task
    period: Duration,
    /// channel used to receive updates from the background task's tokio task
    /// about what the background task is doing
    status: watch::Receiver<TaskStatus>,
    /// join handle for the tokio task that's executing this background task
    tokio_task: tokio::task::JoinHandle<()>,
    /// `Notify` used to wake up the tokio task when a caller explicit wants to
    /// activate the background task
    notify: Arc<Notify>,
}

impl Driver {
    pub fn new(log: Logger) -> Driver {
        let (shutdown_tx, _) = watch::channel(false);
        Driver {
            log: log.new(o!("component" => "BackgroundTaskDriver")),
            tasks: BTreeMap::new(),
            shutdown_tx,
        }
    }

    /// Register a new background task
    ///
    /// The task is activated immediately, then whenever it has not run for
    /// `period`, whenever any of its `watchers` reports a change, and whenever
    /// somebody calls [`Driver::activate()`].
    ///
    /// All background tasks have a unique `name` for observability.  This
    /// function panics if the name conflicts with that of a
    /// previously-registered task.
    pub fn register(&mut self, taskdef: TaskDefinition) -> TaskName {
        let TaskDefinition { name, description, period, task_impl, watchers } =
            taskdef;

        // Activation of the background task happens in a separate tokio task.
        // Set up a channel so that tokio task can report status back to us.
        let (status_tx, status_rx) = watch::channel(TaskStatus {
            current: CurrentStatus::Idle,
            last: LastResult::NeverCompleted,
        });
        let notify = Arc::new(Notify::new());

        let log = self.log.new(o!("background_task" => name.clone()));
        let task_exec = TaskExec::new(
            period,
            task_impl,
            Arc::clone(&notify),
            log,
            status_tx,
        );
        let shutdown_rx = self.shutdown_tx.subscribe();
        let tokio_task =
            tokio::task::spawn(task_exec.run(watchers, shutdown_rx));

        let task =
            Task { description, period, status: status_rx, tokio_task, notify };
        if self.tasks.insert(TaskName(name.clone()), task).is_some() {
            panic!("started two background tasks called {:?}", name);
        }

        TaskName(name)
    }

    /// Enumerate all registered background tasks
    ///
    /// This is aimed at callers that want to get the status of all background
    /// tasks.  You'd call [`Driver::task_status()`] with each of the items
    /// produced by the iterator.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskName> {
        self.tasks.keys()
    }

    fn task_required(&self, task: &TaskName) -> &Task {
        // It should be hard to hit this in practice, since you'd have to have
        // gotten a TaskName from another Driver instance.
        self.tasks.get(task).unwrap_or_else(|| {
            panic!("attempted to get non-existent background task: {:?}", task)
        })
    }

    /// Returns a summary of what this task does (for developers)
    pub fn task_description(&self, task: &TaskName) -> &str {
        &self.task_required(task).description
    }

    /// Returns the configured period of the task
    pub fn task_period(&self, task: &TaskName) -> Duration {
        self.task_required(task).period
    }

    /// Activate the specified background task
    ///
    /// If the task is currently running, it will be activated again when it
    /// finishes.
    pub fn activate(&self, task: &TaskName) {
        self.task_required(task).notify.notify_one();
    }

    /// Returns the runtime status of the background task
    pub fn task_status(&self, task: &TaskName) -> TaskStatus {
        // Borrowing from a watch channel's receiver blocks the sender.  Clone
        // the status to avoid an errant caller gumming up the works by hanging
        // on to a reference.
        self.task_required(task).status.borrow().clone()
    }

    /// Stops all background tasks
    ///
    /// A task that's in the middle of an activation finishes that activation
    /// first.  No task is activated again once this has been called.
    pub async fn shutdown(mut self) {
        info!(self.log, "shutting down background tasks");
        self.shutdown_tx.send_replace(true);
        let tasks = std::mem::take(&mut self.tasks);
        for (name, task) in tasks {
            if let Err(error) = task.tokio_task.await {
                warn!(
                    self.log,
                    "background task did not exit cleanly";
                    "background_task" => name.as_str(),
                    "error" => %error,
                );
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        // When the driver is dropped, terminate all tokio tasks that were used
        // to run background tasks.
        for (_, t) in &self.tasks {
            t.tokio_task.abort();
        }
    }
}

/// Encapsulates state needed by the background tokio task to manage activation
/// of the background task
struct TaskExec {
    /// how often the background task should be activated
    period: Duration,
    /// impl of the background task
    imp: Box<dyn BackgroundTask>,
    /// used to receive notifications from the Driver that someone has requested
    /// explicit activation
    notify: Arc<Notify>,
    /// passed through to the background task impl when activated
    log: Logger,
    /// used to send current status back to the Driver
    status_tx: watch::Sender<TaskStatus>,
    /// counts iterations of the task, for debuggability
    iteration: u64,
}

impl TaskExec {
    fn new(
        period: Duration,
        imp: Box<dyn BackgroundTask>,
        notify: Arc<Notify>,
        log: Logger,
        status_tx: watch::Sender<TaskStatus>,
    ) -> TaskExec {
        TaskExec { period, imp, notify, log, status_tx, iteration: 0 }
    }

    /// Body of the tokio task that manages activation of this background task
    async fn run(
        mut self,
        mut deps: Vec<Box<dyn GenericWatcher>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Wait for either the timeout to elapse, or an explicit activation
        // signal from the Driver, or for one of our dependencies ("watch"
        // channels) to trigger an activation.  Shutdown takes priority over
        // everything else.
        loop {
            let mut dependencies: FuturesUnordered<_> = deps
                .iter_mut()
                .enumerate()
                .map(|(i, w)| w.wait_for_change().map(move |r| (i, r)))
                .collect();

            let event = tokio::select! {
                biased;

                _ = shutdown.changed() => ExecEvent::Shutdown,

                _ = interval.tick() => {
                    ExecEvent::Activate(ActivationReason::Timeout)
                },

                _ = self.notify.notified() => {
                    ExecEvent::Activate(ActivationReason::Signaled)
                }

                Some((i, result)) = dependencies.next(),
                    if !dependencies.is_empty() =>
                {
                    match result {
                        Ok(()) => {
                            ExecEvent::Activate(ActivationReason::Dependency)
                        }
                        Err(_) => ExecEvent::DependencyClosed(i),
                    }
                }
            };
            drop(dependencies);

            match event {
                ExecEvent::Shutdown => break,
                ExecEvent::Activate(reason) => self.activate(reason).await,
                // A watcher whose sender has gone away will never report
                // another change.  Stop waiting on it rather than spinning.
                ExecEvent::DependencyClosed(i) => {
                    warn!(self.log, "dependency closed; no longer watching it");
                    deps.remove(i);
                }
            }
        }

        debug!(self.log, "stopped");
    }

    /// "Activate" the background task
    ///
    /// This basically just invokes `activate()` on the underlying
    /// `BackgroundTask` impl, but provides a bunch of runtime observability
    /// around doing so.
    async fn activate(&mut self, reason: ActivationReason) {
        self.iteration += 1;
        let iteration = self.iteration;
        let start_time = Utc::now();
        let start_instant = Instant::now();

        debug!(
            &self.log,
            "activating";
            "reason" => ?reason,
            "iteration" => iteration
        );

        // Update our status with the driver.
        self.status_tx.send_modify(|status| {
            assert!(status.current.is_idle());
            status.current = CurrentStatus::Running(CurrentStatusRunning {
                start_time,
                start_instant,
                reason,
                iteration,
            });
        });

        // Do it!
        let details = self.imp.activate(&self.log).await;

        let elapsed = start_instant.elapsed();

        // Update our status with the driver.
        self.status_tx.send_modify(|status| {
            assert!(!status.current.is_idle());
            let current = status.current.unwrap_running();
            assert_eq!(current.iteration, iteration);
            *status = TaskStatus {
                current: CurrentStatus::Idle,
                last: LastResult::Completed(LastResultCompleted {
                    iteration,
                    start_time,
                    reason,
                    elapsed,
                    details,
                }),
            };
        });

        debug!(
            &self.log,
            "activation complete";
            "elapsed" => ?elapsed,
            "iteration" => iteration,
        );
    }
}

/// What woke up a [`TaskExec`]
enum ExecEvent {
    Shutdown,
    Activate(ActivationReason),
    DependencyClosed(usize),
}

/// Used to erase the specific type of a `tokio::sync::watch::Receiver`
///
/// This allows the `Driver` to treat these generically, activating a task when
/// any of the watch channels changes, regardless of what data is stored in the
/// channel.
pub trait GenericWatcher: Send {
    fn wait_for_change(
        &mut self,
    ) -> BoxFuture<'_, Result<(), watch::error::RecvError>>;
}

impl<T: Send + Sync> GenericWatcher for watch::Receiver<T> {
    fn wait_for_change(
        &mut self,
    ) -> BoxFuture<'_, Result<(), watch::error::RecvError>> {
        async { self.changed().await }.boxed()
    }
}
