pub mod frame;
pub mod pool;

pub use pool::BufferPool;
