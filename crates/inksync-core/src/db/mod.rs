//! Database layer for inksync

mod connection;
mod migrations;

pub use connection::Database;
