// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// Typed failures returned by access-control mutations.
///
/// None of these are swallowed at this layer; the caller decides what a failed join or a
/// duplicate policy means for its protocol.
#[derive(Debug, Error, PartialEq)]
pub enum AccessError<E> {
    #[error("no access policy exists for the referenced resource")]
    NotFound,

    #[error("an access policy already exists for this resource")]
    AlreadyExists,

    #[error("identity already holds a grant for this resource")]
    AlreadyJoined,

    #[error("identity holds neither a membership nor a session grant for this resource")]
    NotMember,

    #[error("no public entry role is available for this identity")]
    AccessDenied,

    #[error("store error: {0}")]
    Store(E),
}
