// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background tasks
//!
//! Each control-plane daemon runs its reconcilers as background tasks.  A
//! background task is a chunk of code that's activated
//!
//! * periodically, on a fixed timer,
//! * when one of the store tables it watches is modified by a committed
//!   transaction, or
//! * when explicitly asked to by some other part of the daemon.
//!
//! Activation runs one reconciliation pass to completion.  Activations of the
//! same task never overlap.  If the task is activated again while a pass is
//! running, exactly one more pass runs after the current one finishes, no
//! matter how many activations arrived in the meantime.
//!
//! ## Design notes
//!
//! Background tasks are not told why they were activated.  A pass must
//! produce the same result regardless of whether it was started by a timer, a
//! table trigger, or an explicit request, and it must be harmless to run a
//! pass when nothing has changed.  The activation reason is recorded by the
//! [`Driver`] purely for debugging.
//!
//! Background tasks report a [`serde_json::Value`] summarizing what they did.
//! The driver stores the most recent one in the task's [`TaskStatus`].

mod driver;
mod status;

pub use driver::Driver;
pub use driver::GenericWatcher;
pub use driver::TaskDefinition;
pub use driver::TaskName;
pub use status::ActivationReason;
pub use status::CurrentStatus;
pub use status::CurrentStatusRunning;
pub use status::LastResult;
pub use status::LastResultCompleted;
pub use status::TaskStatus;

use futures::future::BoxFuture;
use slog::Logger;

/// An operation activated both periodically and by the [`Driver`]
pub trait BackgroundTask: Send + Sync {
    /// Runs one pass of the task
    ///
    /// `log` is already tagged with the task's name.  The returned value is
    /// recorded as the details of this activation.
    fn activate<'a>(
        &'a mut self,
        log: &'a Logger,
    ) -> BoxFuture<'a, serde_json::Value>;
}
