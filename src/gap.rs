//! Generic Access Profile ([Vol 3] Part C).

pub use adv::*;

mod adv;

/// Error type returned by the advertising data codec.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("advertising data does not fit in the destination buffer")]
    MessageTooLarge,
    #[error("truncated advertising record ({have} bytes, need {need})")]
    BadLength { have: usize, need: usize },
    #[error("malformed advertising record")]
    BadData,
}

/// Common GAP result type.
pub type Result<T> = std::result::Result<T, Error>;
