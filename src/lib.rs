//! Numstore: an embeddable, ACID storage engine with WAL/ARIES crash
//! recovery and an R+ tree payload layer for variable-length byte
//! sequences.
//!
//! The stack, bottom to top:
//! - [`fs`] maps page numbers onto the backing file.
//! - [`page`] interprets each page's body by its type (root, tombstone,
//!   data-list, R+ tree leaf/inner).
//! - [`wal`] is the append-only, segmented write-ahead log.
//! - [`buffer`] is a clock-sweep buffer pool with X/S page-frame shadowing.
//! - [`hash`] and [`txn`] provide the adaptive hash table backing the
//!   active transaction table and dirty page table.
//! - [`lock`] is the hierarchical multi-granularity lock table.
//! - [`pager`] ties all of the above into begin/commit/rollback,
//!   get/save/release, and checkpoint.
//! - [`recovery`] runs ARIES analysis/redo/undo on open.
//! - [`rptree`] is the payload cursor built on the pager.
//! - [`engine`] is the public handle a façade drives.

pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod fs;
pub mod hash;
pub mod lock;
pub mod page;
pub mod pager;
pub mod recovery;
pub mod rptree;
pub mod txn;
pub mod wal;

pub use engine::{Engine, Txn};
pub use error::{Error, Result};
