//! Acoustic-scorer boundary (spec §6 "Consumed from collaborators: Acoustic
//! scorer"). Feature extraction and senone (GMM/VQ) scoring are out of scope
//! (spec §1); the core only consumes per-frame score vectors.

use crate::types::Score;

/// One frame's worth of acoustic evidence.
#[derive(Debug, Clone)]
pub struct FrameScores<'a> {
    /// Per-senone scores for this frame, indexed by observation-distribution id.
    pub senone_scores: &'a [Score],
    /// Best-per-CI-phone score and the frame's single best senone score, used
    /// by the phone-lookahead predictor (spec §4.8). `None` when the front
    /// end doesn't supply lookahead (equivalent to `topsen_window == 1`).
    pub phone_lookahead: Option<PhoneLookaheadScores<'a>>,
}

#[derive(Debug, Clone)]
pub struct PhoneLookaheadScores<'a> {
    pub bestpscr: &'a [Score],
    pub topsenscr: Score,
}

/// The set of senones the front end needs to score on the next frame, derived
/// from currently-live HMM instances (spec §4.3 `compute_sen_active`).
#[derive(Debug, Clone, Default)]
pub struct SenoneActive {
    pub ids: Vec<u32>,
}
