// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node-local reconciliation: runs the system workloads this node's role
//! calls for

// We only use rustdoc for internal documentation, including private items, so
// it's expected that we'll have links to private items in the docs.
#![allow(rustdoc::private_intra_doc_links)]

pub mod config;
pub mod fakes;
pub mod network;
pub mod runtime;
pub mod server;
pub mod supervisor;

pub use config::Config;
pub use server::run_server;

#[macro_use]
extern crate slog;
