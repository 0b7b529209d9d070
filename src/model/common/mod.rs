//! Types and rules shared between the DB and API representations.

pub mod password;
pub mod window;
