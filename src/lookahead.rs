//! C8: phone lookahead / top-senone gating (spec §4.8). Grounded on
//! `search.c:424-443` (`topsen_init`, `compute_phone_active`).

use crate::acoustic::PhoneLookaheadScores;
use crate::types::{CiPhone, Score};

/// Running per-CI-phone "predicted within the next `topsen_window` frames"
/// counter, plus the ring of per-frame contributions needed to retire the
/// oldest frame's contribution as the window slides.
pub struct PhoneLookahead {
    window: usize,
    thresh: Score,
    /// `npa[p]`: sum over the window of `newlist[p]` contributions.
    npa: Vec<i32>,
    /// Ring buffer of per-frame `newlist[p]` snapshots, one per CI-phone.
    history: std::collections::VecDeque<Vec<bool>>,
    filler_phones: Vec<CiPhone>,
}

impl PhoneLookahead {
    /// `window <= 1` disables prediction: `predicted(p)` is always true,
    /// matching spec §8 "topsen_window = 1: npa[p] = 1 for all p always".
    pub fn new(num_ci_phones: usize, window: i32, thresh: Score, filler_phones: Vec<CiPhone>) -> Self {
        let window = window.max(1) as usize;
        Self {
            window,
            thresh,
            npa: vec![0; num_ci_phones],
            history: std::collections::VecDeque::with_capacity(window),
            filler_phones,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.window > 1
    }

    /// Clears the running window state back to `new()`'s starting point:
    /// zeroes `npa` and drains `history`. Needed at the start of every
    /// utterance and before the flat second pass replays frames from frame
    /// zero, or stale per-phone counts from the previous pass/utterance
    /// would gate the first `window - 1` frames of the next one.
    pub fn reset(&mut self) {
        for n in &mut self.npa {
            *n = 0;
        }
        self.history.clear();
    }

    /// Consume one frame's lookahead scores (spec §4.8 steps 1-3). A `None`
    /// input (front end supplied no lookahead) is treated as "every phone
    /// predicted", same as `window == 1`.
    pub fn advance(&mut self, scores: Option<&PhoneLookaheadScores<'_>>) {
        if !self.is_enabled() {
            return;
        }

        let Some(scores) = scores else {
            // No lookahead data this frame: treat every phone as predicted,
            // without perturbing the running window accounting.
            return;
        };

        let newlist: Vec<bool> = scores
            .bestpscr
            .iter()
            .map(|&p| p > scores.topsenscr + self.thresh)
            .collect();

        // Retire the oldest frame's contribution once the window is full.
        if self.history.len() == self.window {
            if let Some(oldest) = self.history.pop_front() {
                for (p, &was_on) in oldest.iter().enumerate() {
                    if was_on {
                        self.npa[p] -= 1;
                    }
                }
            }
        }

        for (p, &on) in newlist.iter().enumerate() {
            if on {
                self.npa[p] += 1;
            }
        }
        self.history.push_back(newlist);
    }

    /// `npa[ciphone]` predicate: phone `p` may be transitioned to. Filler
    /// phones are always considered predicted (spec §4.8).
    pub fn predicted(&self, p: CiPhone) -> bool {
        if !self.is_enabled() {
            return true;
        }
        if self.filler_phones.contains(&p) {
            return true;
        }
        self.npa.get(p as usize).copied().unwrap_or(0) > 0
    }

    /// Search is delayed by `window - 1` frames: frames before that only
    /// accumulate prediction (spec §4.8 last sentence).
    pub fn is_decoding_frame(&self, frames_seen: u32) -> bool {
        !self.is_enabled() || frames_seen as usize >= self.window - 1
    }
}
