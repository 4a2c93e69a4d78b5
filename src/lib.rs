//! Time-synchronous lexical-tree Viterbi beam-search engine over per-frame
//! senone scores and an n-gram language model (spec §1-§2). Acoustic
//! scoring, dictionary loading, and LM probability estimation are external
//! collaborators whose interfaces live in [`acoustic`], [`dict`], and [`lm`]
//! respectively; this crate only consumes them through those traits.
//!
//! The [`Decoder`] facade owns every piece of the engine's per-utterance
//! state (spec §9 design notes: "encapsulate in a single `Decoder` context
//! passed by reference through the core"). A typical caller drives it as:
//!
//! ```ignore
//! decoder.start_utt()?;
//! for frame in frames {
//!     decoder.process_frame(frame)?;
//! }
//! let hyp = decoder.end_utt()?;
//! ```

pub mod acoustic;
pub mod active;
pub mod bptable;
pub mod config;
pub mod decoder;
pub mod dict;
pub mod error;
pub mod hmm;
pub mod hypothesis;
pub mod leaf;
pub mod lm;
pub mod lookahead;
mod search;
pub mod tree;
pub mod types;

pub use acoustic::*;
pub use config::*;
pub use decoder::Decoder;
pub use dict::*;
pub use error::*;
pub use hypothesis::*;
pub use lm::*;
pub use types::*;
