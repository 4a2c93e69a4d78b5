//! C4/C5: pruning and intra-tree transitions (spec §4.5). Grounded on
//! `search.c:1045-1457` (`prune_root_chan`, `prune_nonroot_chan`,
//! `last_phone_transition`, `prune_word_chan`).

use crate::decoder::{Decoder, LastLtrans, LastPhnCand};
use crate::types::{Diphone, Frame, Score, WordId, NO_BP, NO_DIPHONE, WORST_SCORE};

impl Decoder {
    fn skip_this_frame(&self) -> bool {
        let skip = self.config.skip_alt_frm;
        skip != 0 && self.current_frame % skip == 0
    }

    /// `rcpermtab`: the identity/zero permutation for words with no
    /// right-context fan-out (`r_diph < 0`), else the dictionary's table.
    pub(crate) fn rc_perm(&self, r_diph: Diphone, ci: crate::types::CiPhone) -> usize {
        if r_diph == NO_DIPHONE {
            0
        } else {
            self.dict.right_context_fwd_perm(r_diph, ci)
        }
    }

    /// `lm_tg_score`/`lm_bg_score` dispatch per `use_3g_in_fwd_pass`, unweighted
    /// by any pass's LM weight (spec §9 open question #1).
    pub(crate) fn raw_tg_score(&self, w1: crate::types::Fwid, w2: crate::types::Fwid, w3: crate::types::Fwid) -> Score {
        if self.config.use_3g_in_fwd_pass {
            self.lm.trigram_score(w1, w2, w3)
        } else {
            self.lm.bigram_score(w2, w3)
        }
    }

    fn tg_score(&self, w1: crate::types::Fwid, w2: crate::types::Fwid, w3: crate::types::Fwid) -> Score {
        ((self.raw_tg_score(w1, w2, w3) as f64) * self.lw()).round() as Score
    }

    /// `prune_root_chan` (spec §4.5 para 1).
    pub(crate) fn prune_root_chan(&mut self) {
        let cf = self.current_frame;
        let nf = cf + 1;
        let thresh = self.best_score + self.global_beam();
        let newphone_thresh = self.best_score + self.config.beams.new_phone_log_beam_width;
        let lastphn_thresh = self.best_score + self.config.beams.last_phone_log_beam_width;
        let pip = self.config.penalties.phone_insertion_penalty;
        let new_word_penalty = self.config.penalties.new_word_penalty;
        let skip = self.skip_this_frame();

        for ridx in 0..self.tree.roots.len() {
            let (active_frame, bestscore, exit_score, exit_bp, ciphone, penult_head, mut child) = {
                let r = &self.tree.roots[ridx];
                (
                    r.hmm.active_frame,
                    r.hmm.bestscore,
                    r.hmm.exit_score(),
                    r.hmm.bp[5],
                    r.ciphone,
                    r.penult_phn_wid,
                    r.next,
                )
            };
            let _ = ciphone;
            if active_frame < cf {
                continue;
            }
            if bestscore <= thresh {
                continue;
            }
            self.tree.roots[ridx].hmm.active_frame = nf;
            if skip {
                continue;
            }

            let newphone_score = exit_score + pip;
            if newphone_score <= newphone_thresh {
                continue;
            }

            while let Some(id) = child {
                let child_ciphone = self.tree.nodes[id as usize].ciphone;
                if self.lookahead.predicted(child_ciphone) {
                    let node_active = self.tree.nodes[id as usize].hmm.active_frame;
                    let node_score0 = self.tree.nodes[id as usize].hmm.score[0];
                    if node_active < cf || node_score0 < newphone_score {
                        let node = &mut self.tree.nodes[id as usize].hmm;
                        node.score[0] = newphone_score;
                        node.bp[0] = exit_bp;
                        if node_active != nf {
                            node.active_frame = nf;
                            self.active.schedule_interior(nf, id);
                        }
                    }
                }
                child = self.tree.nodes[id as usize].alt;
            }

            if newphone_score > lastphn_thresh {
                let words: Vec<WordId> = self.tree.homophones(penult_head).collect();
                for w in words {
                    if !self.word_permitted_for_transition(w) {
                        continue;
                    }
                    let last_ci = self.dict.entry(w).last_ci_phone();
                    if self.lookahead.predicted(last_ci) {
                        self.lastphn_cand.push(LastPhnCand {
                            wid: w,
                            score: newphone_score - new_word_penalty,
                            bp: exit_bp,
                        });
                    }
                }
            }
        }
    }

    /// `prune_nonroot_chan` (spec §4.5 para 2).
    pub(crate) fn prune_nonroot_chan(&mut self) {
        let cf = self.current_frame;
        let nf = cf + 1;
        let thresh = self.best_score + self.global_beam();
        let newphone_thresh = self.best_score + self.config.beams.new_phone_log_beam_width;
        let lastphn_thresh = self.best_score + self.config.beams.last_phone_log_beam_width;
        let pip = self.config.penalties.phone_insertion_penalty;
        let new_word_penalty = self.config.penalties.new_word_penalty;
        let skip = self.skip_this_frame();

        let active: Vec<u32> = self.active.interior_for(cf).to_vec();
        for id in active {
            let (bestscore, exit_score, exit_bp, penult_head, mut child) = {
                let n = &self.tree.nodes[id as usize];
                (n.hmm.bestscore, n.hmm.exit_score(), n.hmm.bp[5], n.penult_phn_wid, n.next)
            };

            if bestscore > thresh {
                let already_scheduled = self.tree.nodes[id as usize].hmm.active_frame == nf;
                self.tree.nodes[id as usize].hmm.active_frame = nf;
                if !already_scheduled {
                    self.active.schedule_interior(nf, id);
                }

                if skip {
                    continue;
                }
                let newphone_score = exit_score + pip;
                if newphone_score > newphone_thresh {
                    while let Some(next_id) = child {
                        let next_ciphone = self.tree.nodes[next_id as usize].ciphone;
                        if self.lookahead.predicted(next_ciphone) {
                            let node_active = self.tree.nodes[next_id as usize].hmm.active_frame;
                            let node_score0 = self.tree.nodes[next_id as usize].hmm.score[0];
                            if node_active < cf || node_score0 < newphone_score {
                                let next_scheduled = node_active == nf;
                                let node = &mut self.tree.nodes[next_id as usize].hmm;
                                node.score[0] = newphone_score;
                                node.bp[0] = exit_bp;
                                node.active_frame = nf;
                                if !next_scheduled {
                                    self.active.schedule_interior(nf, next_id);
                                }
                            }
                        }
                        child = self.tree.nodes[next_id as usize].alt;
                    }

                    if newphone_score > lastphn_thresh {
                        let words: Vec<WordId> = self.tree.homophones(penult_head).collect();
                        for w in words {
                            if !self.word_permitted_for_transition(w) {
                                continue;
                            }
                            let last_ci = self.dict.entry(w).last_ci_phone();
                            if self.lookahead.predicted(last_ci) {
                                self.lastphn_cand.push(LastPhnCand {
                                    wid: w,
                                    score: newphone_score - new_word_penalty,
                                    bp: exit_bp,
                                });
                            }
                        }
                    }
                }
            } else if self.tree.nodes[id as usize].hmm.active_frame != nf {
                self.tree.nodes[id as usize].hmm.clear_scores();
            }
        }
    }

    /// `last_phone_transition` (spec §4.5 para 3).
    pub(crate) fn last_phone_transition(&mut self) {
        let cf = self.current_frame;
        let nf = cf + 1;

        let mut groups: std::collections::HashMap<Frame, Vec<usize>> = std::collections::HashMap::new();
        for i in 0..self.lastphn_cand.len() {
            let bp = self.lastphn_cand[i].bp;
            let (s_idx, r_diph, ef) = {
                let e = self.bptable.entry(bp);
                (e.s_idx, e.r_diph, e.frame)
            };
            let wid = self.lastphn_cand[i].wid;
            let ci0 = self.dict.entry(wid).first_ci_phone();
            let perm = self.rc_perm(r_diph, ci0);
            self.lastphn_cand[i].score -= self.bptable.rc_score(s_idx, perm);

            let sf = ef + 1;
            let needs_fresh = self.last_ltrans.get(&wid).map_or(true, |lt| lt.sf != sf);
            if needs_fresh {
                self.last_ltrans.insert(wid, LastLtrans { sf, dscr: WORST_SCORE, bp: NO_BP });
                groups.entry(ef).or_default().push(i);
            }
        }

        for (ef, idxs) in &groups {
            let entries: Vec<(u32, Diphone, crate::types::Fwid, crate::types::Fwid, crate::types::BpIdx)> = {
                let start = self.bptable.frame_start_idx(*ef);
                self.bptable
                    .entries_in_frame(*ef)
                    .iter()
                    .enumerate()
                    .map(|(local_i, e)| (e.s_idx, e.r_diph, e.prev_real_fwid, e.real_fwid, start + local_i as u32))
                    .collect()
            };

            for &cand_i in idxs {
                let wid = self.lastphn_cand[cand_i].wid;
                let de = self.dict.entry(wid);
                let ci0 = de.first_ci_phone();
                let fwid2 = de.fwid;
                for &(s_idx, r_diph, prev_real_fwid, real_fwid, bp_idx) in &entries {
                    let perm = self.rc_perm(r_diph, ci0);
                    let dscr = self.bptable.rc_score(s_idx, perm) + self.tg_score(prev_real_fwid, real_fwid, fwid2);
                    let lt = self.last_ltrans.get_mut(&wid).expect("inserted above");
                    if dscr > lt.dscr {
                        lt.dscr = dscr;
                        lt.bp = bp_idx;
                    }
                }
            }
        }

        let mut best = self.last_phone_best_score;
        for c in &mut self.lastphn_cand {
            let lt = self.last_ltrans[&c.wid];
            c.score += lt.dscr;
            c.bp = lt.bp;
            if c.score > best {
                best = c.score;
            }
        }
        self.last_phone_best_score = best;

        let thresh = best + self.config.beams.last_phone_alone_log_beam_width;
        let cands = std::mem::take(&mut self.lastphn_cand);
        for c in cands {
            if c.score <= thresh {
                continue;
            }
            let entry = self.dict.entry(c.wid).clone();
            self.leaves.alloc_all_rc(c.wid, self.dict.as_ref(), &entry);

            let mut any = false;
            if let Some(chans) = self.leaves.get_mut(c.wid) {
                for leaf in chans.iter_mut() {
                    if leaf.hmm.active_frame < cf || leaf.hmm.score[0] < c.score {
                        leaf.hmm.score[0] = c.score;
                        leaf.hmm.bp[0] = c.bp;
                        leaf.hmm.active_frame = nf;
                        any = true;
                    }
                }
            }
            if any {
                self.active.schedule_word(nf, c.wid);
            }
        }
    }

    /// `prune_word_chan` (spec §4.5 para 4).
    pub(crate) fn prune_word_chan(&mut self) {
        let cf = self.current_frame;
        let nf = cf + 1;
        let newword_thresh = self.last_phone_best_score + self.new_word_beam();
        let lastphn_thresh = self.last_phone_best_score + self.config.beams.last_phone_alone_log_beam_width;

        let words: Vec<WordId> = self.active.words_for(cf).to_vec();
        for w in words {
            let entry = self.dict.entry(w).clone();
            let rc_fanout = self.dict.right_context_fwd_size(entry.phones[entry.len() - 1] as Diphone).max(1) as u32;
            let r_diph = entry.phones[entry.len() - 1] as Diphone;

            let mut retained = false;
            if let Some(chans) = self.leaves.get_vec_mut(w) {
                let mut i = 0;
                while i < chans.len() {
                    let hmm = &mut chans[i].hmm;
                    if hmm.bestscore > lastphn_thresh {
                        hmm.active_frame = nf;
                        retained = true;
                        if hmm.exit_score() > newword_thresh {
                            let (score, bp, rc) = (hmm.exit_score(), hmm.bp[5], chans[i].rc_id as usize);
                            if let Some(idx) = self.bptable.save_bwd_ptr(w, cf, score, bp, rc, rc_fanout, r_diph) {
                                self.cache_new_bp_paths(idx);
                            }
                        }
                        i += 1;
                    } else if hmm.active_frame == nf {
                        i += 1;
                    } else {
                        chans.remove(i);
                    }
                }
            }

            if retained {
                self.active.schedule_word(nf, w);
            } else {
                self.active.deactivate_word(w);
                self.leaves.free_all_rc(w);
            }
        }

        for i in 0..self.tree.single_phone_wid.len() {
            let w = self.tree.single_phone_wid[i];
            let hmm = &mut self.single_phone_hmms[i];
            if hmm.active_frame < cf {
                continue;
            }
            if hmm.bestscore > lastphn_thresh {
                hmm.active_frame = nf;
                if hmm.exit_score() > newword_thresh {
                    if let Some(idx) = self.bptable.save_bwd_ptr(w, cf, hmm.exit_score(), hmm.bp[5], 0, 1, NO_DIPHONE) {
                        self.cache_new_bp_paths(idx);
                    }
                }
            }
        }
    }

    /// `cache_bptable_paths` wrapper binding the dictionary's filler/fwid
    /// lookups, invoked immediately on every newly appended BPTable entry.
    fn cache_new_bp_paths(&mut self, idx: crate::types::BpIdx) {
        let start_fwid = self.start_fwid;
        let dict = self.dict.as_ref();
        self.bptable.cache_bptable_paths(
            idx,
            start_fwid,
            |w| dict.entry(w).is_filler,
            |w| dict.fwid_of(w),
        );
    }
}
