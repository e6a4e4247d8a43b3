mod schema;
mod table;
mod value;

pub use schema::{ColumnDef, ColumnType, TableSchema};
pub use table::{Layer, RawTable, Record, Table, TableLocation};
pub use value::Value;
