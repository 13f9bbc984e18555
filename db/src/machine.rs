// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Database;
use crate::Row;
use crate::RowId;
use crate::TableType;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One cluster host
///
/// The blueprint layer creates these rows and fills in the pre-boot fields
/// and, once the host has one, `public_ip`.  `status` belongs to the machine
/// status reconciler; nothing else writes it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Machine {
    id: RowId,

    /// logical identifier correlating this row with a blueprint entry
    pub stitch_id: String,

    pub provider: String,
    pub region: String,
    pub size: String,
    /// the provider's identifier for the running instance
    pub cloud_id: String,

    /// address used for connectivity probing; empty until the host has booted
    pub public_ip: String,
    pub private_ip: String,

    pub status: MachineStatus,
}

impl Row for Machine {
    const TABLE: TableType = TableType::Machine;

    fn id(&self) -> RowId {
        self.id
    }

    fn with_id(id: RowId) -> Self {
        Machine { id, ..Default::default() }
    }

    fn table(db: &Database) -> &BTreeMap<RowId, Self> {
        &db.machines
    }

    fn table_mut(db: &mut Database) -> &mut BTreeMap<RowId, Self> {
        &mut db.machines
    }
}

/// Boot and connectivity lifecycle of a [`Machine`]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    /// no status has been recorded yet (stored as the empty string)
    #[default]
    #[serde(rename = "")]
    Unbooted,
    Booting,
    Connecting,
    Connected,
    Reconnecting,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Unbooted => "",
            MachineStatus::Booting => "booting",
            MachineStatus::Connecting => "connecting",
            MachineStatus::Connected => "connected",
            MachineStatus::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
