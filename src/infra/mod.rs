//! Adapters for the storage and execution ports.

pub mod csv_table_store;
pub mod sql_script_engine;

pub use csv_table_store::CsvTableStore;
pub use sql_script_engine::SqlScriptQueryEngine;
