//! Mock storage implementations for testing.

mod table;

pub use table::MockTable;
