//! Session description codec.
//!
//! Builds and parses the small subset of SDP exchanged between two user agents:
//! a connection address, one audio media line and an optional video media line.
//! Each media kind uses exactly one fixed codec, there is no codec negotiation.
//!
//! Parsing never fails. Missing or malformed required fields are reported as absent
//! (`None` address, port `0`), which callers treat as "don't start this media".

#![warn(unreachable_pub)]

mod media;
mod parser;
mod session_description;

pub use media::{Codec, MediaLine, MediaType, RtpMap};
pub use session_description::SessionDescription;

fn not_whitespace(c: char) -> bool {
    !c.is_ascii_whitespace()
}
