//! C1: HMM instance Viterbi step (spec §4.1).
//!
//! One left-to-right 5-state HMM (states 0..4 emitting, state 5 = exit).
//! `evaluate` is the single inlined step both root and non-root instances
//! share; mpx roots use the `Mpx` variant so the per-state ssid can be
//! rewritten at entry and copied down the state chain as the left-context
//! choice propagates (spec §4.1 "For mpx roots...").

use crate::dict::TransitionModel;
use crate::types::{BpIdx, CiPhone, Frame, Score, Ssid, NO_BP, NUM_SLOTS, WORST_SCORE};

/// How an instance's states map to senone-sequence ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsidModel {
    /// Non-mpx: every state shares the one ssid from the dictionary entry.
    Single(Ssid),
    /// Mpx root: state 0's ssid is rewritten at every entry event to the
    /// left-context-specific ssid; downstream states inherit whichever
    /// predecessor's ssid won the Viterbi max (spec §3 "Root channels").
    Mpx([Ssid; NUM_SLOTS]),
}

impl SsidModel {
    pub fn ssid(&self, state: usize) -> Ssid {
        match self {
            SsidModel::Single(s) => *s,
            SsidModel::Mpx(arr) => arr[state],
        }
    }

    pub fn is_mpx(&self) -> bool {
        matches!(self, SsidModel::Mpx(_))
    }
}

/// A single HMM instance: root, interior, or leaf (spec §3 "HMM instance").
#[derive(Debug, Clone)]
pub struct HmmInstance {
    pub score: [Score; NUM_SLOTS],
    pub bp: [BpIdx; NUM_SLOTS],
    pub bestscore: Score,
    pub active_frame: Frame,
    pub ssid: SsidModel,
    pub ci_phone: CiPhone,
}

impl HmmInstance {
    pub fn new(ssid: SsidModel, ci_phone: CiPhone) -> Self {
        Self {
            score: [WORST_SCORE; NUM_SLOTS],
            bp: [NO_BP; NUM_SLOTS],
            bestscore: WORST_SCORE,
            active_frame: 0,
            ssid,
            ci_phone,
        }
    }

    /// True iff this instance is live in frame `f` (spec §3 invariant 2).
    pub fn is_active(&self, f: Frame) -> bool {
        self.active_frame == f
    }

    /// Reset all state scores to `WORST_SCORE` (the "UGLY! score-clear pass",
    /// spec §9 design notes — required so a later incoming transition can
    /// write cleanly via max-update).
    pub fn clear_scores(&mut self) {
        self.score = [WORST_SCORE; NUM_SLOTS];
        self.bp = [NO_BP; NUM_SLOTS];
        self.bestscore = WORST_SCORE;
    }

    /// Enter this instance fresh at state 0 with the given score/back-pointer,
    /// e.g. from `last_phone_transition` or cross-word transition (§4.5/§4.6).
    pub fn enter_state0(&mut self, score: Score, bp: BpIdx, frame: Frame) {
        if score > self.score[0] {
            self.score[0] = score;
            self.bp[0] = bp;
        }
        self.bestscore = self.bestscore.max(score);
        self.active_frame = frame;
    }

    /// For mpx roots: rewrite state 0's ssid to reflect the left-context of
    /// the predecessor that is entering it this frame (spec §4.6 step 2,
    /// "this is where dynamic left-context selection happens").
    pub fn set_entry_ssid(&mut self, ssid: Ssid) {
        if let SsidModel::Mpx(arr) = &mut self.ssid {
            arr[0] = ssid;
        }
    }

    /// Advance this instance one frame (spec §4.1).
    ///
    /// Processes target slots in reverse order (5 down to 0) so that, for
    /// target slot `i`, candidate predecessor slots `i-1`/`i-2` still hold
    /// their *previous*-frame scores when read. Slot 5 is the non-emitting
    /// exit: it receives no observation score. For mpx instances, the ssid
    /// of the winning predecessor is copied into the destination slot so the
    /// state chain keeps modeling the phone actually being traversed.
    pub fn evaluate(&mut self, tm: &dyn TransitionModel, senone_scores: &[Score]) -> Score {
        let prev = self.score;
        let prev_ssid = self.ssid;
        let mut next = prev;
        let mut next_bp = self.bp;
        let mut next_ssid = prev_ssid;

        for i in (0..NUM_SLOTS).rev() {
            let mut best: Option<(Score, usize)> = None;
            let lo = i.saturating_sub(2);
            for j in lo..=i {
                if j >= NUM_SLOTS || j > 4 {
                    continue;
                }
                if prev[j] <= WORST_SCORE {
                    continue;
                }
                let ssid_j = prev_ssid.ssid(j);
                if let Some(tprob) = tm.tprob(ssid_j, j, i) {
                    let cand = prev[j] + tprob;
                    if best.map_or(true, |(b, _)| cand > b) {
                        best = Some((cand, j));
                    }
                }
            }

            if let Some((score, src)) = best {
                let total = if i == 5 {
                    // Exit state: non-emitting, no observation score added.
                    score
                } else {
                    score + senone_scores[tm.obs_dist(prev_ssid.ssid(i), i) as usize]
                };
                next[i] = total;
                next_bp[i] = self.bp[src];
                if let (SsidModel::Mpx(dst), SsidModel::Mpx(src_arr)) =
                    (&mut next_ssid, &prev_ssid)
                {
                    dst[i] = src_arr[src];
                }
            } else {
                next[i] = WORST_SCORE;
            }
        }

        self.score = next;
        self.bp = next_bp;
        self.ssid = next_ssid;
        self.bestscore = self.score.iter().copied().max().unwrap_or(WORST_SCORE);
        self.bestscore
    }

    pub fn exit_score(&self) -> Score {
        self.score[5]
    }

    pub fn score_at(&self, state: usize) -> Score {
        self.score[state]
    }

    pub fn current_ssid(&self, state: usize) -> Ssid {
        self.ssid.ssid(state)
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A transition model whose probabilities and observation scores come
    /// straight from the generated test input, so `evaluate` is exercised
    /// against arbitrary (not just hand-picked) score landscapes.
    struct RandomTm<'a> {
        tprob: &'a [[Option<Score>; 6]; 6],
        obs: &'a [Score; 5],
    }

    impl TransitionModel for RandomTm<'_> {
        fn tprob(&self, _ssid: Ssid, from: usize, to: usize) -> Option<Score> {
            self.tprob[from][to]
        }
        fn obs_dist(&self, _ssid: Ssid, state: usize) -> u32 {
            state as u32
        }
        fn total_dists(&self) -> usize {
            5
        }
    }

    fn arb_tprob() -> impl Strategy<Value = [[Option<Score>; 6]; 6]> {
        // Only self/next/skip transitions are ever consulted by `evaluate`
        // (spec §4.1); every other cell stays `None` regardless of what the
        // generator picks, so only generate the cells that matter.
        proptest::collection::vec(-50..-1i32, 14).prop_map(|probs| {
            let mut t: [[Option<Score>; 6]; 6] = [[None; 6]; 6];
            let mut i = 0;
            for s in 0..5 {
                t[s][s] = Some(probs[i]);
                i += 1;
                if s + 1 < 6 {
                    t[s][s + 1] = Some(probs[i]);
                    i += 1;
                }
                if s + 2 < 6 && s < 4 {
                    t[s][s + 2] = Some(probs[i]);
                    i += 1;
                }
            }
            t
        })
    }

    proptest! {
        /// Spec §8 invariant: "For all i, i.bestscore = max(i.score[0..5])".
        #[test]
        fn bestscore_always_equals_max_of_slots(
            tprob in arb_tprob(),
            obs in proptest::array::uniform5(-200..0i32),
            entry_score in -500..0i32,
            n_steps in 1usize..6,
        ) {
            let tm = RandomTm { tprob: &tprob, obs: &obs };
            let mut hmm = HmmInstance::new(SsidModel::Single(0), 0);
            hmm.enter_state0(entry_score, NO_BP, 0);
            for _ in 0..n_steps {
                let senone_scores: Vec<Score> = obs.to_vec();
                let best = hmm.evaluate(&tm, &senone_scores);
                let actual_max = hmm.score.iter().copied().max().unwrap();
                prop_assert_eq!(best, actual_max);
                prop_assert_eq!(hmm.bestscore, actual_max);
            }
        }

        /// An instance that never receives `enter_state0` stays at
        /// `WORST_SCORE` everywhere no matter how many times it is evaluated
        /// (spec §3 invariant 5: "State scores are strictly less than
        /// WORST_SCORE only when inactive" — here inactive means untouched).
        #[test]
        fn never_entered_instance_stays_worst_score(
            tprob in arb_tprob(),
            obs in proptest::array::uniform5(-200..0i32),
            n_steps in 1usize..6,
        ) {
            let tm = RandomTm { tprob: &tprob, obs: &obs };
            let mut hmm = HmmInstance::new(SsidModel::Single(0), 0);
            for _ in 0..n_steps {
                let senone_scores: Vec<Score> = obs.to_vec();
                hmm.evaluate(&tm, &senone_scores);
            }
            prop_assert_eq!(hmm.bestscore, WORST_SCORE);
            prop_assert!(hmm.score.iter().all(|&s| s == WORST_SCORE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTm;
    impl TransitionModel for FixedTm {
        fn tprob(&self, _ssid: Ssid, from: usize, to: usize) -> Option<Score> {
            match (from, to) {
                (a, b) if a == b => Some(-10),
                (a, b) if b == a + 1 => Some(-20),
                (a, b) if b == a + 2 => Some(-40),
                _ => None,
            }
        }
        fn obs_dist(&self, _ssid: Ssid, state: usize) -> u32 {
            state as u32
        }
        fn total_dists(&self) -> usize {
            5
        }
    }

    #[test]
    fn bestscore_tracks_max_of_slots() {
        let tm = FixedTm;
        let mut hmm = HmmInstance::new(SsidModel::Single(0), 3);
        hmm.enter_state0(0, NO_BP, 0);
        let senone_scores = vec![-1, -2, -3, -4, -5];
        let best = hmm.evaluate(&tm, &senone_scores);
        assert_eq!(best, hmm.score.iter().copied().max().unwrap());
    }

    #[test]
    fn inactive_instance_yields_worst_score_everywhere() {
        let tm = FixedTm;
        let mut hmm = HmmInstance::new(SsidModel::Single(0), 3);
        let senone_scores = vec![-1, -2, -3, -4, -5];
        let best = hmm.evaluate(&tm, &senone_scores);
        assert_eq!(best, WORST_SCORE);
        assert!(hmm.score.iter().all(|&s| s == WORST_SCORE));
    }

    #[test]
    fn clear_scores_resets_to_worst() {
        let tm = FixedTm;
        let mut hmm = HmmInstance::new(SsidModel::Single(0), 3);
        hmm.enter_state0(0, NO_BP, 0);
        hmm.evaluate(&tm, &[-1, -2, -3, -4, -5]);
        hmm.clear_scores();
        assert_eq!(hmm.bestscore, WORST_SCORE);
        assert!(hmm.score.iter().all(|&s| s == WORST_SCORE));
    }
}
