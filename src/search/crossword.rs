//! C6: cross-word transition (spec §4.6). Grounded on `search.c:1536-1689`
//! (`word_transition`).

use crate::decoder::Decoder;
use crate::types::{BpIdx, CiPhone, Score, NO_BP, WORST_SCORE};

#[derive(Debug, Clone, Copy)]
struct BestBpRc {
    score: Score,
    path: BpIdx,
    lc: CiPhone,
}

impl Decoder {
    /// Best right-context map over this frame's word exits, `bestbp_rc[rc]`.
    /// Returns `None` if only `</s>` exited (no successor hypothesizing to do).
    fn bestbp_rc_map(&mut self, num_ci_phones: usize) -> Option<Vec<BestBpRc>> {
        let cf = self.current_frame;
        let finish = self.dict.finish_word();
        let mut map = vec![
            BestBpRc { score: WORST_SCORE, path: NO_BP, lc: 0 };
            num_ci_phones
        ];
        let mut any = false;

        let start = self.bptable.frame_start_idx(cf);
        let entries: Vec<_> = self.bptable.entries_in_frame(cf).to_vec();
        self.bptable.clear_word_lat_idx();

        for (local_i, e) in entries.iter().enumerate() {
            if e.wid == finish {
                continue;
            }
            any = true;
            let bp = start + local_i as u32;
            let de = self.dict.entry(e.wid);
            let last_ci = de.last_ci_phone();

            for rc in 0..num_ci_phones {
                let perm = self.rc_perm(e.r_diph, rc as CiPhone);
                let score = self.bptable.rc_score(e.s_idx, perm);
                if score > map[rc].score {
                    map[rc] = BestBpRc { score, path: bp, lc: last_ci };
                }
            }
        }

        any.then_some(map)
    }

    /// `word_transition` (spec §4.6).
    pub(crate) fn word_transition(&mut self, num_ci_phones: usize) {
        let cf = self.current_frame;
        let skip = self.config.skip_alt_frm != 0 && cf % self.config.skip_alt_frm == 0;

        let Some(bestbp_rc) = self.bestbp_rc_map(num_ci_phones) else {
            return;
        };
        // `bestbp_rc_map` also clears `WordLatIdx` for the next frame's
        // word-exit phase (spec §3 "WordLatIdx"); that bookkeeping runs even
        // when `skip_alt_frm` suppresses the transitions themselves below.
        if skip {
            return;
        }
        let nf = cf + 1;
        let thresh = self.best_score + self.global_beam();
        let pip = self.config.penalties.phone_insertion_penalty;
        let new_word_penalty = self.config.penalties.new_word_penalty;

        // 1. To HMM-tree roots.
        for ridx in 0..self.tree.roots.len() {
            let (ciphone, diphone, active_frame, score0) = {
                let r = &self.tree.roots[ridx];
                (r.ciphone, r.diphone, r.hmm.active_frame, r.hmm.score[0])
            };
            if !self.lookahead.predicted(ciphone) {
                continue;
            }
            let rc = &bestbp_rc[ciphone as usize];
            if rc.path == NO_BP {
                continue;
            }
            let newscore = rc.score + new_word_penalty + pip;
            if newscore <= thresh {
                continue;
            }
            if active_frame < cf || score0 < newscore {
                let ssid = self.dict.left_context_fwd(diphone, rc.lc);
                let r = &mut self.tree.roots[ridx];
                r.hmm.score[0] = newscore;
                r.hmm.bp[0] = rc.path;
                r.hmm.active_frame = nf;
                r.hmm.set_entry_ssid(ssid);
            }
        }

        // 2. To single-phone LM words (need per-predecessor LM scoring).
        let single_words: Vec<_> = self.tree.single_phone_wid.clone();
        for (i, &w) in single_words.iter().enumerate() {
            if w == self.dict.finish_word() {
                continue;
            }
            let entry = self.dict.entry(w).clone();
            if entry.is_filler {
                continue;
            }
            if !self.word_permitted_for_transition(w) {
                continue;
            }
            if !self.lookahead.predicted(entry.first_ci_phone()) {
                continue;
            }

            let mut best_dscr = WORST_SCORE;
            let mut best_bp = NO_BP;
            let start = self.bptable.frame_start_idx(cf);
            let frame_entries: Vec<_> = self.bptable.entries_in_frame(cf).to_vec();
            for (local_i, e) in frame_entries.iter().enumerate() {
                let perm = self.rc_perm(e.r_diph, entry.first_ci_phone());
                let score = self.bptable.rc_score(e.s_idx, perm);
                let lm = self.tg_score(e.prev_real_fwid, e.real_fwid, entry.fwid);
                let newscore = score + lm;
                if newscore > best_dscr {
                    best_dscr = newscore;
                    best_bp = start + local_i as u32;
                }
            }

            let newscore = best_dscr + pip;
            if newscore <= thresh || best_bp == NO_BP {
                continue;
            }
            let hmm = &mut self.single_phone_hmms[i];
            if hmm.active_frame < cf || hmm.score[0] < newscore {
                hmm.score[0] = newscore;
                hmm.bp[0] = best_bp;
                if entry.mpx {
                    let pred_last_ci = self.dict.entry(self.bptable.entry(best_bp).wid).last_ci_phone();
                    let ssid = self.dict.left_context_fwd(self.tree.diphone_for(entry.first_ci_phone()), pred_last_ci);
                    hmm.set_entry_ssid(ssid);
                }
                hmm.active_frame = nf;
            }
        }

        // 3. To <sil> and other filler words: no LM scoring.
        let silence_word = self.dict.silence_word();
        let silence_ci = self.dict.entry(silence_word).first_ci_phone();
        let sil_rc = &bestbp_rc[silence_ci as usize];
        if sil_rc.path != NO_BP {
            let new_sil = sil_rc.score + self.config.penalties.silence_word_penalty + pip;
            if new_sil > thresh {
                if let Some(i) = single_words.iter().position(|&w| w == silence_word) {
                    let hmm = &mut self.single_phone_hmms[i];
                    if hmm.active_frame < cf || hmm.score[0] < new_sil {
                        hmm.score[0] = new_sil;
                        hmm.bp[0] = sil_rc.path;
                        hmm.active_frame = nf;
                    }
                }
            }

            let new_filler = sil_rc.score + self.config.penalties.filler_word_penalty + pip;
            if new_filler > thresh {
                for (i, &w) in single_words.iter().enumerate() {
                    if w == silence_word || !self.dict.entry(w).is_filler {
                        continue;
                    }
                    let hmm = &mut self.single_phone_hmms[i];
                    if hmm.active_frame < cf || hmm.score[0] < new_filler {
                        hmm.score[0] = new_filler;
                        hmm.bp[0] = sil_rc.path;
                        hmm.active_frame = nf;
                    }
                }
            }
        }
    }
}
