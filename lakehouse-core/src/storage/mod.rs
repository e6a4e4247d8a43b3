pub mod in_memory;
pub mod traits;

pub use in_memory::InMemoryTableStore;
pub use traits::{QueryEngine, QueryStatement, TableStore};
