// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access directory, grant lifecycle and status projection on top of the store traits.
//!
//! [`AccessControl`] owns the mutations: policy creation and cascading teardown, join/leave,
//! the login and registration migrations and the orphan-reconciliation sweep.
//! [`StatusSubscription`] is the read side: a live, duplicate-suppressed feed of one actor's
//! [`vestibule_core::EffectiveStatus`] on one resource.

mod control;
mod error;
mod projector;

pub use control::AccessControl;
pub use error::AccessError;
pub use projector::StatusSubscription;
