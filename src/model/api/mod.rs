//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - Question and choice IDs are plain integers.
//! - Datetimes are serialised as RFC 3339 strings.
//!
//! Page types carry the context a rendered page would need, including any
//! one-shot message left by the previous request.

pub mod auth;
pub mod credentials;
pub mod page;
pub mod question;
pub mod results;
pub mod vote;
