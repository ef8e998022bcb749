//! Generic Attribute Profile ([Vol 3] Part G).

pub use {consts::*, io::*, registry::*, schema::*, server::*};

use crate::att;

mod consts;
mod io;
mod registry;
mod schema;
mod server;

/// Error type returned by the GATT layer.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Att(#[from] att::Error),
    #[error("invalid definition: {0}")]
    InvalidArgument(&'static str),
    #[error("circular include dependency among {unregistered} service(s)")]
    CircularDependency { unregistered: usize },
    #[error("client configuration pool exhausted")]
    OutOfMemory,
}

/// Common GATT result type.
pub type Result<T> = std::result::Result<T, Error>;
