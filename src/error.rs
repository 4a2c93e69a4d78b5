//! Typed errors for the search core.
//!
//! Spec §7 splits conditions into Fatal / Recoverable / Informational.
//! Only Fatal conditions are represented here: recoverable conditions are
//! handled locally (logged via `tracing` and folded into `SearchStats`) and
//! never reach the caller as an `Err`.

use thiserror::Error;

use crate::types::{CiPhone, WordId};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("start word {0:?} is not in the active vocabulary and no fallback was configured")]
    UnknownStartWord(String),

    #[error("topsen_window must be >= 1, got {0}")]
    InvalidTopsenWindow(i32),

    #[error("word {wid} has inconsistent mpx flag across its pronunciation variants")]
    InconsistentMpxFlag { wid: WordId },

    #[error("hypothesis string buffer exhausted after {0} bytes")]
    HypBufferExhausted(usize),

    #[error("back-trace segment count exceeded the configured maximum ({0})")]
    BacktraceSegmentOverflow(usize),

    #[error("no root channel registered for initial CI-phone {0}")]
    MissingRootForPhone(CiPhone),

    #[error("search was asked to step a frame before start_utt() was called")]
    UttNotStarted,

    #[error("dictionary/LM collaborator error: {0}")]
    Collaborator(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;
