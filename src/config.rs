//! Configuration knobs (spec §6 "CLI-adjacent knobs").
//!
//! These are pure data — none of them drive control flow by themselves, the
//! search driver reads them every frame. Modeled as a plain struct in the
//! spirit of the teacher's `Config`/`PsConfig` key-value wrapper, but with
//! native typed fields instead of FFI `ps_config_*` round-trips.

use serde::{Deserialize, Serialize};

use crate::types::Score;

/// All beam widths are already expressed in the engine's additive log scale
/// (`8 * log(width)`, per spec §4.4) and are negative: more negative = narrower.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamWidths {
    /// Global retention beam, applied to `BestScore`.
    pub log_beam_width: Score,
    /// Gates exit-to-next-phone transitions inside the tree.
    pub new_phone_log_beam_width: Score,
    /// Gates entry into last-phone leaf expansion.
    pub last_phone_log_beam_width: Score,
    /// Gates word-exit back-pointer emission, applied to `LastPhoneBestScore`.
    pub new_word_log_beam_width: Score,
    /// Applied to `LastPhoneBestScore` around last-phone candidate acceptance.
    pub last_phone_alone_log_beam_width: Score,
    /// Flat-pass analogue of `log_beam_width`.
    pub fwdflat_log_beam_width: Score,
    /// Flat-pass analogue of `new_word_log_beam_width`.
    pub fwdflat_log_word_beam_width: Score,
}

impl Default for BeamWidths {
    fn default() -> Self {
        // log(1e-64) * 8 in the engine's fixed-point scale, a generous default beam.
        Self {
            log_beam_width: -64_000,
            new_phone_log_beam_width: -64_000,
            last_phone_log_beam_width: -64_000,
            new_word_log_beam_width: -64_000,
            last_phone_alone_log_beam_width: -64_000,
            fwdflat_log_beam_width: -64_000,
            fwdflat_log_word_beam_width: -64_000,
        }
    }
}

/// Insertion penalties (additive, typically negative) applied at the
/// transitions named by spec §4.5/§4.6.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Penalties {
    pub phone_insertion_penalty: Score,
    pub new_word_penalty: Score,
    pub silence_word_penalty: Score,
    pub filler_word_penalty: Score,
}

impl Default for Penalties {
    fn default() -> Self {
        Self {
            phone_insertion_penalty: 0,
            new_word_penalty: 0,
            silence_word_penalty: 0,
            filler_word_penalty: 0,
        }
    }
}

/// Language-model weights applied in each of the two passes plus an external
/// bestpath rescoring pass (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LmWeights {
    pub fwdtree_lw: f64,
    pub fwdflat_lw: f64,
    pub bestpath_lw: f64,
}

impl Default for LmWeights {
    fn default() -> Self {
        Self {
            fwdtree_lw: 9.5,
            fwdflat_lw: 9.5,
            bestpath_lw: 9.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub beams: BeamWidths,
    pub penalties: Penalties,
    pub lm_weights: LmWeights,

    /// Frames of acoustic-score lookahead used to gate phone transitions (spec §4.8).
    /// `1` disables lookahead (`npa[p]` is always true).
    pub topsen_window: i32,
    /// Threshold (negative) for `bestpscr[p] > topsenscr + topsen_thresh` (spec §4.8).
    pub topsen_thresh: Score,

    /// Use the trigram score inside `lm_tg_score` during the tree pass rather
    /// than the bigram; see SPEC_FULL.md "open question decisions" #1.
    pub use_3g_in_fwd_pass: bool,

    /// If true, the acoustic front end is asked to score every senone every
    /// frame rather than only the active set (spec §4.3).
    pub compute_all_senones: bool,

    /// When nonzero, cross-phone and cross-word transitions are skipped on
    /// frames where `frame % skip_alt_frm == 0` (spec §9 design notes).
    pub skip_alt_frm: u32,

    /// Read but never consumed by the core (spec §9 open questions #2):
    /// n-best alternates output is not implemented here.
    pub hyp_alternates: bool,

    /// Accepted for API compatibility; consulted nowhere (spec §9 open
    /// questions #3).
    pub channels_per_frame_target: i32,

    /// Hard ceiling on frames decoded in one utterance (spec §5 "Timeouts").
    pub max_frames: u32,

    /// Preallocated BPTable capacity divisor: capacity is
    /// `max(25, num_words / bptable_words_divisor) * max_frames` (spec §5).
    pub bptable_words_divisor: u32,

    /// Whether to rerun the flat-lexicon second pass over the tree pass's
    /// lattice at `end_utt` (spec §4.7).
    pub fwdflat_enabled: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beams: BeamWidths::default(),
            penalties: Penalties::default(),
            lm_weights: LmWeights::default(),
            topsen_window: 1,
            topsen_thresh: -800,
            use_3g_in_fwd_pass: true,
            compute_all_senones: false,
            skip_alt_frm: 0,
            hyp_alternates: false,
            channels_per_frame_target: 0,
            max_frames: 20_000,
            bptable_words_divisor: 1000,
            fwdflat_enabled: true,
        }
    }
}

impl DecoderConfig {
    /// BPTable/BScoreStack sizing per spec §5: `max(25, NumWords/1000) * MAX_FRAMES`
    /// entries for BPTable, 20x that for BScoreStack.
    pub fn bptable_capacity(&self, num_words: u32) -> usize {
        let per_frame = (num_words / self.bptable_words_divisor).max(25);
        (per_frame as usize) * (self.max_frames as usize)
    }

    pub fn bscorestack_capacity(&self, num_words: u32) -> usize {
        self.bptable_capacity(num_words) * 20
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bptable_capacity_floors_at_25_per_frame() {
        let cfg = DecoderConfig {
            max_frames: 100,
            ..Default::default()
        };
        assert_eq!(cfg.bptable_capacity(10), 25 * 100);
        assert_eq!(cfg.bptable_capacity(5_000), 5 * 100);
    }
}
