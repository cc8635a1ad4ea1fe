pub mod columns;
pub mod merge;
pub mod partition;
pub mod query;
pub mod row;
pub mod value;
pub mod window;

mod error;
mod scan;

pub use columns::{ColumnSpec, OrderSpec, OrderTerm, QueryShape, SortKey};
pub use error::{Error, Result};
pub use merge::{Insertion, MergedResultSet};
pub use partition::PartitionId;
pub use query::QueryDescriptor;
pub use row::ResultRow;
pub use value::Value;
