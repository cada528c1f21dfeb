pub mod att;
pub mod dpt;
pub mod manager;

pub use att::{Att, AttEntry};
pub use dpt::Dpt;
pub use manager::TxnIdAllocator;
