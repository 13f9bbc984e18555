// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reachability probes

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Port probed by default: machines are reachable once their SSH daemon
/// accepts connections.
pub const DEFAULT_PROBE_PORT: u16 = 22;

/// Reports whether a host is currently reachable
///
/// An unreachable host is an expected, steady-state answer and not an error.
/// Implementations own their timeout policy.
#[async_trait]
pub trait ConnectivityProber: Send + Sync {
    /// `address` is never empty.
    async fn probe(&self, address: &str) -> bool;
}

/// Probes hosts by opening a TCP connection to a fixed port
pub struct TcpProber {
    port: u16,
    timeout: Duration,
}

impl TcpProber {
    pub fn new(port: u16, timeout: Duration) -> TcpProber {
        TcpProber { port, timeout }
    }
}

#[async_trait]
impl ConnectivityProber for TcpProber {
    async fn probe(&self, address: &str) -> bool {
        let connect = TcpStream::connect((address, self.port));
        matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)))
    }
}
