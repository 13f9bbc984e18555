// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory transactional store of typed tables
//!
//! The store holds the rows the control plane converges on: [`Machine`] rows
//! describing cluster hosts and [`Minion`] rows describing the local node's
//! assignment.  All writes happen inside a transaction
//! ([`Conn::transact()`]), which either applies completely or not at all.
//! Every committed transaction that modified a table bumps that table's
//! trigger ([`Conn::trigger()`]), which is how the reconcilers learn that
//! they have work to do.

mod conn;
mod machine;
mod minion;
mod table;

pub use conn::Conn;
pub use conn::View;
pub use machine::Machine;
pub use machine::MachineStatus;
pub use minion::Minion;
pub use minion::Role;
pub use table::Database;
pub use table::Row;
pub use table::RowId;
pub use table::TableType;

/// Errors returned by operations inside a transaction
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("no {table} row with id {id}")]
    NoSuchRow { table: TableType, id: RowId },
}
