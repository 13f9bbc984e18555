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

/// The local node's assignment: its role and cluster coordinates
///
/// Exactly one row is expected.  Consumers treat zero or several rows as "no
/// assignment".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Minion {
    id: RowId,

    pub role: Role,
    /// discovery token for the coordination store
    pub etcd_token: String,
    /// address of the current cluster leader
    pub leader_ip: String,
    /// this node's own address
    pub private_ip: String,
    /// whether this node currently holds cluster leadership
    pub leader: bool,
}

impl Row for Minion {
    const TABLE: TableType = TableType::Minion;

    fn id(&self) -> RowId {
        self.id
    }

    fn with_id(id: RowId) -> Self {
        Minion { id, ..Default::default() }
    }

    fn table(db: &Database) -> &BTreeMap<RowId, Self> {
        &db.minions
    }

    fn table_mut(db: &mut Database) -> &mut BTreeMap<RowId, Self> {
        &mut db.minions
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    None,
    Master,
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::None => "none",
            Role::Master => "master",
            Role::Worker => "worker",
        })
    }
}
