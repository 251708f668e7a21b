// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interfaces and implementations of persistence layers for vestibule access-control and
//! presence state.
//!
//! The domain crates above this one are generic over the traits defined here: [`AccessStore`]
//! for policies, grants and public session records, [`PresenceStore`] for the guarded
//! online/offline rows and [`SubscribeStore`] for typed change-notification streams. Every
//! mutation is a read-modify-write which implementations must serialize per key; no cross-key
//! coordination is ever required.
//!
//! An in-memory implementation is provided in the form of a [`MemoryStore`], gated by the
//! `memory` feature flag and enabled by default. It does not persist data permanently, all
//! changes are lost when the process ends.

#[cfg(feature = "memory")]
pub mod memory;
pub mod traits;
pub mod watch;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use traits::{
    AccessStore, LocalAccessStore, LocalPresenceStore, PresenceStore, SubscribeStore, SweptRow,
};
pub use watch::{Change, ChangeReceiver, ChangeSender, ResourceGrantChange, WatcherSet};
