//! SQLite persistence for the mddb index.
//!
//! The index is derived state: every function here assumes the
//! Markdown files are authoritative and the caller holds whatever lock
//! the operation needs. Connections are opened with the fixed pragma
//! set; writes go through `BEGIN IMMEDIATE` transactions.

pub mod apply;
pub mod connection;
pub mod queries;
pub mod schema;
