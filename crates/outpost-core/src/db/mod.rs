//! libSQL-backed durable store

mod connection;
mod migrations;
mod record_store;

pub use connection::Database;
pub use record_store::LibSqlRecordStore;
