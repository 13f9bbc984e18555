// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connections, transactions, and triggers

use crate::Database;
use crate::Error;
use crate::Machine;
use crate::Minion;
use crate::Row;
use crate::TableType;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use tokio::sync::watch;

/// Handle to the store
///
/// Cloning a `Conn` is cheap and every clone refers to the same tables.
#[derive(Clone)]
pub struct Conn {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    db: Mutex<Database>,
    /// per-table generation counter, bumped once per committed transaction
    /// that modified the table
    triggers: BTreeMap<TableType, watch::Sender<u64>>,
}

impl Conn {
    pub fn new() -> Conn {
        let triggers = TableType::ALL
            .into_iter()
            .map(|table| (table, watch::channel(0).0))
            .collect();
        Conn {
            inner: Arc::new(ConnInner {
                db: Mutex::new(Database::default()),
                triggers,
            }),
        }
    }

    /// Runs `f` as one atomic transaction over `tables`
    ///
    /// `f` works on a private copy of the tables.  If it returns `Ok`, the
    /// copy replaces the store's contents and each table that `f` actually
    /// modified fires its trigger exactly once.  If it returns `Err`, nothing
    /// changes.
    ///
    /// `f` is synchronous: a transaction can never be held open across an
    /// `.await`.  Touching a table that isn't in `tables` panics.
    pub fn transact<T, E, F>(&self, tables: &[TableType], f: F) -> Result<T, E>
    where
        F: FnOnce(&mut View<'_>) -> Result<T, E>,
    {
        let (result, touched) = {
            let mut db = self.lock();
            let mut working = db.clone();
            let mut view = View {
                db: &mut working,
                tables: tables.iter().copied().collect(),
                touched: BTreeSet::new(),
            };
            let result = f(&mut view)?;
            let touched = std::mem::take(&mut view.touched);
            *db = working;
            (result, touched)
        };

        for table in touched {
            self.inner.triggers[&table].send_modify(|generation| {
                *generation += 1;
            });
        }
        Ok(result)
    }

    /// Returns a snapshot of the rows of type `R` matching `pred`, in id order
    pub fn select<R, P>(&self, pred: P) -> Vec<R>
    where
        R: Row,
        P: Fn(&R) -> bool,
    {
        let db = self.lock();
        R::table(&db).values().filter(|row| pred(row)).cloned().collect()
    }

    pub fn select_from_machine<P>(&self, pred: P) -> Vec<Machine>
    where
        P: Fn(&Machine) -> bool,
    {
        self.select(pred)
    }

    pub fn select_from_minion<P>(&self, pred: P) -> Vec<Minion>
    where
        P: Fn(&Minion) -> bool,
    {
        self.select(pred)
    }

    /// Locks the tables
    ///
    /// A transaction that panicked never replaced the tables, so they are
    /// still consistent and a poisoned lock is taken over as is.
    fn lock(&self) -> MutexGuard<'_, Database> {
        self.inner.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a receiver that observes a change whenever a transaction that
    /// modified `table` commits
    ///
    /// Changes committed while nobody is looking coalesce into a single
    /// observed change.
    pub fn trigger(&self, table: TableType) -> watch::Receiver<u64> {
        self.inner.triggers[&table].subscribe()
    }
}

impl Default for Conn {
    fn default() -> Self {
        Conn::new()
    }
}

/// The tables visible inside a transaction (see [`Conn::transact()`])
pub struct View<'a> {
    db: &'a mut Database,
    tables: BTreeSet<TableType>,
    touched: BTreeSet<TableType>,
}

impl View<'_> {
    fn check_table(&self, table: TableType) {
        if !self.tables.contains(&table) {
            panic!(
                "attempted to access table {:?} outside of a transaction \
                over tables {:?}",
                table, self.tables
            );
        }
    }

    /// Inserts a new row with a fresh id and default contents, returning it
    ///
    /// Fill in the fields and [`View::commit()`] the row to store them.
    pub fn insert<R: Row>(&mut self) -> R {
        self.check_table(R::TABLE);
        let row = R::with_id(self.db.allocate_id());
        R::table_mut(self.db).insert(row.id(), row.clone());
        self.touched.insert(R::TABLE);
        row
    }

    /// Returns the rows of type `R` matching `pred`, in id order
    pub fn select<R, P>(&self, pred: P) -> Vec<R>
    where
        R: Row,
        P: Fn(&R) -> bool,
    {
        self.check_table(R::TABLE);
        R::table(self.db).values().filter(|row| pred(row)).cloned().collect()
    }

    /// Stores `row` over the existing row with the same id
    ///
    /// Committing a row identical to the stored one is not a modification.
    pub fn commit<R: Row>(&mut self, row: R) -> Result<(), Error> {
        self.check_table(R::TABLE);
        let id = row.id();
        let existing = R::table_mut(self.db)
            .get_mut(&id)
            .ok_or(Error::NoSuchRow { table: R::TABLE, id })?;
        if *existing != row {
            *existing = row;
            self.touched.insert(R::TABLE);
        }
        Ok(())
    }

    pub fn remove<R: Row>(&mut self, row: &R) -> Result<(), Error> {
        self.check_table(R::TABLE);
        let id = row.id();
        R::table_mut(self.db)
            .remove(&id)
            .ok_or(Error::NoSuchRow { table: R::TABLE, id })?;
        self.touched.insert(R::TABLE);
        Ok(())
    }
}
