// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Overlay network endpoint configuration
//!
//! A worker's virtual switch has to know where the overlay controller lives
//! and which local address to terminate tunnels on.  Both are applied as
//! `external_ids` directives on the switch's `Open_vSwitch` record.

use std::fmt;

/// Port the overlay controller's southbound database listens on
pub const OVN_SOUTHBOUND_PORT: u16 = 6640;

/// Tunnel encapsulation used between switches
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EncapType {
    #[default]
    Geneve,
}

impl EncapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncapType::Geneve => "geneve",
        }
    }
}

impl fmt::Display for EncapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How this node's switch joins the overlay
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OvnEndpointConfig {
    /// address of the overlay controller (the cluster leader)
    pub remote_ip: String,
    /// this node's tunnel endpoint address
    pub encap_ip: String,
    pub encap_type: EncapType,
}

impl OvnEndpointConfig {
    pub fn new(remote_ip: &str, encap_ip: &str) -> OvnEndpointConfig {
        OvnEndpointConfig {
            remote_ip: remote_ip.to_string(),
            encap_ip: encap_ip.to_string(),
            encap_type: EncapType::default(),
        }
    }

    /// Returns the key/value directives describing this endpoint
    ///
    /// The quoting is part of the value as `ovs-vsctl` parses it.
    pub fn directives(&self) -> Vec<String> {
        vec![
            format!(
                "external_ids:ovn-remote=\"tcp:{}:{}\"",
                self.remote_ip, OVN_SOUTHBOUND_PORT
            ),
            format!("external_ids:ovn-encap-ip={}", self.encap_ip),
            format!("external_ids:ovn-encap-type=\"{}\"", self.encap_type),
        ]
    }

    /// Returns the command that applies [`Self::directives()`], to be run
    /// inside the switch's container
    pub fn ovs_vsctl_argv(&self) -> Vec<String> {
        ["ovs-vsctl", "set", "Open_vSwitch", "."]
            .into_iter()
            .map(String::from)
            .chain(self.directives())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::OvnEndpointConfig;

    #[test]
    fn test_ovs_vsctl_argv() {
        let config = OvnEndpointConfig::new("10.0.0.1", "10.0.0.5");
        assert_eq!(
            config.ovs_vsctl_argv(),
            vec![
                "ovs-vsctl",
                "set",
                "Open_vSwitch",
                ".",
                "external_ids:ovn-remote=\"tcp:10.0.0.1:6640\"",
                "external_ids:ovn-encap-ip=10.0.0.5",
                "external_ids:ovn-encap-type=\"geneve\"",
            ]
        );
    }
}
