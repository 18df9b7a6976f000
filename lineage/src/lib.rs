
pub mod config;
pub mod engine;
pub mod event;
pub mod flags;
pub mod history;
pub mod identity;
pub mod procfs;
pub mod state;
pub mod vertex;

pub use config::{AgentDetail, Config, StoreConfig};
pub use engine::{Engine, UnitDependency};
pub use event::{Event, Syscall};
pub use history::{HistoryStore, MemoryStore, ProcessRecord, ProcessTable, SpillStore};
pub use identity::*;
pub use vertex::{Edge, GraphSink, Relation, Stamp, Vertex, VertexKind, VertexStrategy};

use std::error;
use std::fmt::{self, Display, Formatter};
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

pub const SOURCE_SYSCALL: &str = "syscall";
pub const SOURCE_PROCFS: &str = "/proc";
pub const SOURCE_BEEP: &str = "beep";

#[derive(Debug)]
pub struct Error {
    repr: Repr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    IO,
    Store,
    Serde,
    Closed,
    MalformedProc,
}

#[derive(Debug)]
enum Repr {
    IO(io::Error),
    Simple(ErrorKind),
    Custom(Wrapper),
}

#[derive(Debug)]
struct Wrapper {
    kind: ErrorKind,
    error: Box<dyn error::Error + Send + Sync>,
}

impl Error {
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        Self {
            repr: Repr::Custom(Wrapper {
                kind,
                error: error.into(),
            }),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            Repr::IO(_) => ErrorKind::IO,
            Repr::Simple(kind) => *kind,
            Repr::Custom(w) => w.kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Simple(ref kind) => match kind {
                ErrorKind::Closed => write!(f, "the history store has been closed"),
                ErrorKind::Config => write!(f, "invalid configuration"),
                _ => write!(f, "{:?}", self),
            },
            Repr::IO(e) => write!(f, "failed to do io: {}", e),
            Repr::Custom(ref w) => match w.kind {
                ErrorKind::Config => write!(f, "invalid configuration: {}", w.error),
                ErrorKind::Store => write!(f, "history store failure: {}", w.error),
                ErrorKind::Serde => write!(f, "malformed record data: {}", w.error),
                ErrorKind::MalformedProc => write!(f, "malformed /proc entry: {}", w.error),
                _ => write!(f, "{:?}", self),
            },
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            repr: Repr::Simple(kind),
        }
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error { repr: Repr::IO(e) }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Serde, e)
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match e.kind() {
            ErrorKind::IO => match e.repr {
                Repr::IO(inner) => return inner,
                _ => io::ErrorKind::Other,
            },
            ErrorKind::Closed => io::ErrorKind::NotConnected,
            ErrorKind::Config => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, e)
    }
}
