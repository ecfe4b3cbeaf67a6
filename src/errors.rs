use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    /// The database file is not a whole number of pages, or a page holds
    /// bytes that cannot be interpreted as a node.
    Corrupt(String),
    /// A storage-layer contract was violated (out-of-bounds page or cell,
    /// flushing an unloaded page, ...). The table is unusable afterwards.
    Storage(String),
    /// A page was requested while a guard for the same page was still live.
    Lock(String),
    DuplicateKey,
    TableFull,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error. {}", e),
            Error::Corrupt(msg) => write!(f, "Corrupt file. {}", msg),
            Error::Storage(msg) => write!(f, "Storage error. {}", msg),
            Error::Lock(msg) => write!(f, "Lock error. {}", msg),
            Error::DuplicateKey => write!(f, "Duplicate key."),
            Error::TableFull => write!(f, "Table full."),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

/// Build a message-carrying `Error` variant from format arguments.
#[macro_export]
macro_rules! err {
    ($variant:ident, $($arg:tt)*) => {
        $crate::errors::Error::$variant(format!($($arg)*))
    };
}
