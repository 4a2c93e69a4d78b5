//! C4: beam-search driver (spec §4.4, ordering guarantees in spec §5).
//! Grounded on `search.c:2185-2264` (`search_one_ply_fwd`).

use crate::acoustic::FrameScores;
use crate::decoder::Decoder;
use crate::types::WORST_SCORE;

impl Decoder {
    /// Advance the search by one frame (spec §4.4). Shared by both the tree
    /// pass and the flat second pass; `self.flat_pass` selects beams/weights.
    pub(crate) fn drive_one_frame(&mut self, frame: FrameScores<'_>) -> crate::error::Result<()> {
        if !self.utt_started {
            return Err(crate::error::SearchError::UttNotStarted);
        }
        if self.current_frame >= self.config.max_frames {
            tracing::warn!(frame = self.current_frame, "max_frames reached; truncating utterance");
            return Ok(());
        }

        let cf = self.current_frame;
        self.bptable.snapshot_frame_start(cf);

        // Step 2: renormalize if scores are at risk of integer-scale collapse.
        if self.best_score + 2 * self.global_beam() < WORST_SCORE {
            self.renormalize_scores(self.best_score);
        }

        self.best_score = WORST_SCORE;
        self.last_phone_best_score = WORST_SCORE;

        self.lookahead.advance(frame.phone_lookahead.as_ref());
        let decoding = self.lookahead.is_decoding_frame(self.frames_seen);
        self.frames_seen += 1;

        if decoding {
            self.evaluate_all(frame.senone_scores);
            self.lastphn_cand.clear();
            // The write-target slot shares its parity with two frames ago;
            // clear it before any `schedule_interior`/`schedule_word` call
            // below writes into it, or stale entries from that earlier cycle
            // would linger alongside this frame's (spec §3 invariant 3).
            self.active.clear_for_write(cf + 1);
            self.prune_root_chan();
            self.prune_nonroot_chan();
            self.last_phone_transition();
            self.prune_word_chan();

            if self.bptable.len() > self.bptable.frame_start_idx(cf) as usize {
                self.word_transition(self.num_ci_phones);
            }

            self.clear_pruned_roots_and_single_words(cf);
        }

        self.lm.next_frame();
        self.current_frame += 1;
        Ok(())
    }

    /// `compute_sen_active` + per-instance Viterbi evaluation (spec §4.3/§4.4
    /// step 4). Tracks `BestScore` and `LastPhoneBestScore`.
    fn evaluate_all(&mut self, senone_scores: &[crate::types::Score]) {
        let cf = self.current_frame;
        let finish = self.dict.finish_word();

        for r in &mut self.tree.roots {
            if !r.hmm.is_active(cf) {
                continue;
            }
            let s = r.hmm.evaluate(self.tm.as_ref(), senone_scores);
            self.best_score = self.best_score.max(s);
        }

        let interior: Vec<_> = self.active.interior_for(cf).to_vec();
        for id in interior {
            let node = &mut self.tree.nodes[id as usize];
            if !node.hmm.is_active(cf) {
                continue;
            }
            let s = node.hmm.evaluate(self.tm.as_ref(), senone_scores);
            self.best_score = self.best_score.max(s);
        }

        let active_words: Vec<_> = self.active.words_for(cf).to_vec();
        for w in active_words {
            if let Some(chans) = self.leaves.get_vec_mut(w) {
                for leaf in chans.iter_mut() {
                    if !leaf.hmm.is_active(cf) {
                        continue;
                    }
                    let s = leaf.hmm.evaluate(self.tm.as_ref(), senone_scores);
                    self.best_score = self.best_score.max(s);
                    if w != finish {
                        self.last_phone_best_score = self.last_phone_best_score.max(s);
                    }
                }
            }
        }

        for (i, &w) in self.tree.single_phone_wid.clone().iter().enumerate() {
            let hmm = &mut self.single_phone_hmms[i];
            if !hmm.is_active(cf) {
                continue;
            }
            let s = hmm.evaluate(self.tm.as_ref(), senone_scores);
            self.best_score = self.best_score.max(s);
            if w != finish {
                self.last_phone_best_score = self.last_phone_best_score.max(s);
            }
        }
    }

    /// Spec §4.4 step 7: the "UGLY!" score-clear pass (spec §9 design notes).
    fn clear_pruned_roots_and_single_words(&mut self, cf: crate::types::Frame) {
        let nf = cf + 1;
        for r in &mut self.tree.roots {
            if r.hmm.active_frame != nf {
                r.hmm.clear_scores();
            }
        }
        for hmm in &mut self.single_phone_hmms {
            if hmm.active_frame != nf {
                hmm.clear_scores();
            }
        }
    }
}
