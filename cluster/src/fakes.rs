// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test-only implementations of the interfaces used by the reconciler

use crate::prober::ConnectivityProber;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

/// A fake implementation of [`ConnectivityProber`]
///
/// Answers from a table of known hosts and remembers every address it was
/// asked about.  Probing an empty or unknown address panics.
pub struct FakeProber {
    hosts: Mutex<BTreeMap<String, bool>>,
    probed: Mutex<Vec<String>>,
}

impl FakeProber {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeProber {
            hosts: Mutex::new(BTreeMap::new()),
            probed: Mutex::new(Vec::new()),
        })
    }

    pub fn set_reachable(&self, host: &str, reachable: bool) {
        self.hosts.lock().unwrap().insert(host.to_string(), reachable);
    }

    /// Returns the addresses probed so far, in order, and forgets them
    pub fn take_probed(&self) -> Vec<String> {
        std::mem::take(&mut *self.probed.lock().unwrap())
    }
}

#[async_trait]
impl ConnectivityProber for FakeProber {
    async fn probe(&self, address: &str) -> bool {
        assert!(!address.is_empty(), "probed a machine with no address");
        self.probed.lock().unwrap().push(address.to_string());
        let reachable = self.hosts.lock().unwrap().get(address).copied();
        reachable.unwrap_or_else(|| panic!("unrecognized host {:?}", address))
    }
}
