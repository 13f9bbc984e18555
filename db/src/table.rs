// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tables and the rows stored in them

use crate::Machine;
use crate::Minion;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one of the store's tables
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Machine,
    Minion,
}

impl TableType {
    pub const ALL: [TableType; 2] = [TableType::Machine, TableType::Minion];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableType::Machine => "machine",
            TableType::Minion => "minion",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store-assigned identity of a row
///
/// Ids are allocated from a single counter shared by all tables and are never
/// reused, so an id is stable for the lifetime of its row.  They carry no
/// other meaning.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct RowId(u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A type stored in one of the store's tables
pub trait Row: Clone + PartialEq + Send + Sync + 'static {
    /// the table holding rows of this type
    const TABLE: TableType;

    fn id(&self) -> RowId;

    /// Returns a row with the given id and every other field at its default
    fn with_id(id: RowId) -> Self;

    fn table(db: &Database) -> &BTreeMap<RowId, Self>;

    fn table_mut(db: &mut Database) -> &mut BTreeMap<RowId, Self>;
}

/// The contents of every table
///
/// Only reachable through a [`crate::View`], i.e., inside a transaction.
#[derive(Clone, Debug, Default)]
pub struct Database {
    pub(crate) machines: BTreeMap<RowId, Machine>,
    pub(crate) minions: BTreeMap<RowId, Minion>,
    next_id: u64,
}

impl Database {
    pub(crate) fn allocate_id(&mut self) -> RowId {
        self.next_id += 1;
        RowId(self.next_id)
    }
}
