//! Identifiers and the log-score scale shared by every module.

use serde::{Deserialize, Serialize};

/// A log-probability in the engine's fixed integer scale (see spec §3 "Numerics").
/// All scores are additive log-domain values; there is no per-step normalization.
pub type Score = i32;

/// Sentinel for "this slot holds no live hypothesis". Deliberately far from
/// `i32::MIN` so that adding a handful of penalties never wraps.
pub const WORST_SCORE: Score = i32::MIN / 4;

/// Index of a BPTable entry, or the absence of a predecessor.
pub type BpIdx = u32;
pub const NO_BP: BpIdx = u32::MAX;

/// Dictionary-local word identifier.
pub type WordId = u32;

/// LM-facing word identifier, shared across pronunciation variants of a word.
pub type Fwid = u32;

/// "No LM context yet" sentinel (the reference source's `-1`).
pub const NO_FWID: Fwid = u32::MAX;

/// Context-independent phone identifier.
pub type CiPhone = u16;

/// Senone-sequence id: identifies the 5-state HMM (observation distributions
/// + transition matrix) tied to a specific context-dependent phone.
pub type Ssid = u32;

/// A diphone index: a CI-phone in one specific left context. Indexes the
/// right-context fan-out tables the dictionary module precomputes.
pub type Diphone = i32;

/// No previous phone / no diphone context yet (e.g. utterance-initial).
pub const NO_DIPHONE: Diphone = -1;

/// Number of emitting states in the 5-state left-to-right HMM topology (spec §4.1).
/// State index 5 (`NUM_STATES`) is the non-emitting exit state.
pub const NUM_STATES: usize = 5;
/// Total state-score slots per HMM instance: 5 emitting + 1 exit.
pub const NUM_SLOTS: usize = NUM_STATES + 1;

/// A frame index.
pub type Frame = u32;

/// Minimum utterance length (in frames) for a non-empty hypothesis (spec §8).
pub const MIN_UTT_FRAMES: Frame = 10;

/// Ceiling on the number of segments a single back-trace chain may walk
/// before the engine treats a cyclic or corrupted back-pointer chain as
/// fatal (spec §7 "back-trace segment count exceeded").
pub const MAX_BACKTRACE_SEGMENTS: usize = 100_000;

/// `frm_wordlist` interval-width floor for the flat-lexicon second pass (spec §4.7).
pub const MIN_EF_WIDTH: i32 = 4;

/// Forward-search-window used by `get_expand_wordlist` in the flat pass (spec §4.7).
pub const MAX_SF_WIN: i32 = 25;

/// Slack added on top of the discovered maximum interior-node count when sizing
/// the active-list backing arrays (spec §4.2 `init_search_tree`).
pub const ACTIVE_LIST_SLACK: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordExit {
    pub wid: WordId,
    pub bp: BpIdx,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_score_survives_a_chain_of_additions() {
        let mut s = WORST_SCORE;
        for _ in 0..8 {
            s = s.saturating_add(-200_000);
        }
        assert!(s < 0);
    }
}
