//! Shared table model, error taxonomy and storage/execution ports.
//!
//! The pipeline crate depends on this crate only through these types; storage backends and
//! query engines live behind the traits in [`storage`].

pub mod common;
pub mod domain;
pub mod storage;

pub use common::error::{PipelineError, Result};
pub use domain::*;
pub use storage::{InMemoryTableStore, QueryEngine, QueryStatement, TableStore};
