//! JSON round-trip codec over [`Msg`].
//!
//! The wire format is an external contract (spec.md §1, §6.2): this module
//! does not get to redesign it, only to give the rest of the workspace a
//! single encode/decode call site. No binary framing here — each WebSocket
//! message carries exactly one JSON-encoded `Msg`.

use crate::error::Error;
use crate::msg::Msg;

pub fn encode(msg: &Msg) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(msg).map_err(Error::Decode)
}

pub fn decode(bytes: &[u8]) -> Result<Msg, Error> {
    serde_json::from_slice(bytes).map_err(Error::Decode)
}
