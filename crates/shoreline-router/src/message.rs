//! Re-exports of the wire types the router dispatches on, gathered in one
//! place so `router.rs` and `listener.rs` don't each reach into
//! `shoreline_core`'s submodules individually.

pub use shoreline_core::control::{ControlKey, SetKey};
pub use shoreline_core::{Msg, SetGroup, SetPage, SetPeriod};
