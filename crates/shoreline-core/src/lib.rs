//! Shoreline Core
//!
//! The wire record and protocol-wide primitives shared by every other
//! Shoreline crate: the [`Msg`] type, session/subject identifiers, the
//! control-key sum type, and the JSON round-trip codec.
//!
//! Nothing in this crate talks to a socket or a store — those live in
//! `shoreline-transport` and `shoreline-store`.

pub mod codec;
pub mod control;
pub mod error;
pub mod ids;
pub mod msg;
pub mod time;

pub use control::ControlKey;
pub use error::{Error, Result};
pub use ids::{ObjectType, SessionId, SessionObjectId};
pub use msg::{Msg, SetGroup, SetPage, SetPeriod};
