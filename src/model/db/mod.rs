//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in a DB-friendly way, e.g.:
//!
//! - Object IDs and datetimes are serialised in MongoDB's own format.
//! - Questions and choices use integer IDs allocated from counters.

pub mod admin;
pub mod choice;
pub mod question;
pub mod user;
pub mod vote;
