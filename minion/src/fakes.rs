// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test-only implementations of the interfaces used by the supervisor

use crate::runtime::ContainerRuntime;
use crate::runtime::RuntimeError;
use crate::runtime::Workload;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

/// One call made against a [`FakeRuntime`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeCall {
    Start(Workload, Vec<String>),
    Remove(Workload),
    RemoveAll,
    Exec(Workload, Vec<String>),
}

/// A fake implementation of [`ContainerRuntime`]
///
/// This struct implements the [`ContainerRuntime`] interface but avoids
/// interacting with the host OS.  It records every call and keeps track of
/// which workloads would be running, along with the arguments they were
/// started with.
pub struct FakeRuntime {
    inner: Mutex<FakeRuntimeInner>,
}

#[derive(Default)]
struct FakeRuntimeInner {
    calls: Vec<RuntimeCall>,
    running: BTreeMap<Workload, Vec<String>>,
    failing: BTreeSet<Workload>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeRuntime { inner: Mutex::new(FakeRuntimeInner::default()) })
    }

    /// Makes every subsequent start of `workload` fail (or succeed again)
    pub fn set_start_fails(&self, workload: Workload, fails: bool) {
        let mut inner = self.inner.lock().unwrap();
        if fails {
            inner.failing.insert(workload);
        } else {
            inner.failing.remove(&workload);
        }
    }

    /// Returns the calls made so far, in order, and forgets them
    pub fn take_calls(&self) -> Vec<RuntimeCall> {
        std::mem::take(&mut self.inner.lock().unwrap().calls)
    }

    /// Returns the running workloads and the arguments each was started with
    pub fn running(&self) -> BTreeMap<Workload, Vec<String>> {
        self.inner.lock().unwrap().running.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn start(
        &self,
        workload: Workload,
        args: &[String],
    ) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::Start(workload, args.to_vec()));
        if inner.failing.contains(&workload) {
            return Err(RuntimeError::CommandFailure {
                command: format!("start {workload}"),
                code: Some(1),
                stderr: String::from("injected failure"),
            });
        }
        inner.running.entry(workload).or_insert_with(|| args.to_vec());
        Ok(())
    }

    async fn remove(&self, workload: Workload) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::Remove(workload));
        inner.running.remove(&workload);
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::RemoveAll);
        inner.running.clear();
        Ok(())
    }

    async fn exec(
        &self,
        workload: Workload,
        argv: &[String],
    ) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RuntimeCall::Exec(workload, argv.to_vec()));
        if !inner.running.contains_key(&workload) {
            return Err(RuntimeError::NotRunning(workload));
        }
        Ok(())
    }
}
