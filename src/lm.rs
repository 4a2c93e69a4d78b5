//! Language-model boundary (spec §6 "Consumed from collaborators: LM").
//!
//! Only the bigram/trigram score functions and the cache-tick hook are
//! consumed; probability estimation, smoothing, and storage format are all
//! out of scope here (spec §1).

use crate::types::{Fwid, Score};

pub trait LanguageModel {
    /// `lm_bg_score(w1, w2)`.
    fn bigram_score(&self, w1: Fwid, w2: Fwid) -> Score;

    /// `lm_tg_score(w1, w2, w3)`. Implementations decide the bigram fallback
    /// policy when no trigram entry exists (SPEC_FULL.md open question #1);
    /// the search core never second-guesses this value.
    fn trigram_score(&self, w1: Fwid, w2: Fwid, w3: Fwid) -> Score;

    /// `lm_next_frame()`: tick the LM's internal cache at a frame boundary.
    fn next_frame(&mut self);

    /// `dictwd_in_lm(fwid)`: whether this fwid is present in the active LM's
    /// vocabulary. Drives `create_search_tree`'s word filter (spec §4.2).
    fn dictwd_in_lm(&self, fwid: Fwid) -> bool;
}
