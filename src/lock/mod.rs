pub mod table;
pub mod types;

pub use table::LockTable;
pub use types::{LockMode, LockType};
