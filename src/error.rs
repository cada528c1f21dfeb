use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt: {0}")]
    Corrupt(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of memory")]
    NoMem,

    #[error("arithmetic overflow: {0}")]
    Arith(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("interpreter error: {0}")]
    Interp(String),

    #[error("buffer pool exhausted: no evictable frame")]
    PagerFull,

    #[error("too many open files")]
    TooManyFiles,

    #[error("duplicate commit for transaction {0}")]
    DuplicateCommit(u64),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Aborts the process immediately, surfacing `err` on stderr first.
///
/// Used only in debug builds at a handful of call sites where a violated
/// invariant makes it unsafe to keep running (e.g. a DPT entry with no
/// corresponding dirty frame). Release builds propagate the error instead.
#[cfg(debug_assertions)]
pub fn abort_on_failure(context: &str, err: &Error) -> ! {
    eprintln!("fatal: {context}: {err}");
    std::process::abort();
}
