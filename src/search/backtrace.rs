//! C9: back-trace and scoring (spec §4.9). Grounded on `search.c:2363-2661`
//! (`search_postprocess_bptable`, `seg_back_trace`, `compute_seg_scores`,
//! `renormalize_scores`).

use crate::decoder::Decoder;
use crate::error::{Result, SearchError};
use crate::hmm::HmmInstance;
use crate::hypothesis::{HypSegment, Hypothesis};
use crate::types::{BpIdx, Frame, Score, WordId, MAX_BACKTRACE_SEGMENTS, MIN_UTT_FRAMES, NO_BP, WORST_SCORE};

/// Natural-log scale divisor for the engine's fixed-point score units (spec
/// §3 "Numerics": scores are additive log-domain values on an internal
/// integer scale).
const LOG_SCALE: f64 = 8.0;

fn renorm_hmm(hmm: &mut HmmInstance, norm: Score) {
    for s in hmm.score.iter_mut() {
        if *s > WORST_SCORE {
            *s -= norm;
        }
    }
    if hmm.bestscore > WORST_SCORE {
        hmm.bestscore -= norm;
    }
}

impl Decoder {
    /// `renormalize_scores(norm)`: subtracts `norm` from every live state
    /// score above `WORST_SCORE` across every instance currently occupying
    /// an array slot (spec §4.9, §9 "UGLY!" score-clear notes apply equally
    /// here — inactive slots already sit at `WORST_SCORE` and are untouched).
    pub(crate) fn renormalize_scores(&mut self, norm: Score) {
        for r in &mut self.tree.roots {
            renorm_hmm(&mut r.hmm, norm);
        }
        for n in &mut self.tree.nodes {
            renorm_hmm(&mut n.hmm, norm);
        }
        let words: Vec<WordId> = self.leaves.active_words().collect();
        for w in words {
            if let Some(chans) = self.leaves.get_vec_mut(w) {
                for c in chans.iter_mut() {
                    renorm_hmm(&mut c.hmm, norm);
                }
            }
        }
        for hmm in &mut self.single_phone_hmms {
            renorm_hmm(hmm, norm);
        }
        self.renormalized = true;
        tracing::info!(norm, "renormalized live scores; bestpath rescoring disabled for this utterance");
    }

    /// `compute_seg_scores(lwf)` (spec §4.9): assigns `ascr`/`lscr` to every
    /// BPTable entry with a real predecessor, used both by back-trace and by
    /// the lattice dump.
    fn compute_seg_scores(&mut self, lwf: f64) {
        for idx in 0..self.bptable.len() as BpIdx {
            if self.bptable.entry(idx).bp == NO_BP {
                continue;
            }
            let (ascr, lscr) = self.seg_ascr_lscr(idx, lwf);
            let e = self.bptable.entry_mut(idx);
            e.ascr = ascr;
            e.lscr = lscr;
        }
    }

    /// Per-entry acoustic/language score split (spec §4.9 bullet list).
    /// `lscr` is the silence/filler penalty for filler words, else
    /// `lwf · lm_tg_score(prev_real_fwid, real_fwid, fwid)`. `ascr` is the
    /// path score less the predecessor's right-context exit score at this
    /// entry's first phone, less `lscr`.
    fn seg_ascr_lscr(&self, idx: BpIdx, lwf: f64) -> (Score, Score) {
        let e = self.bptable.entry(idx);
        let (wid, score, bp, prev_real_fwid, real_fwid) = (e.wid, e.score, e.bp, e.prev_real_fwid, e.real_fwid);
        let de = self.dict.entry(wid);
        let silence = self.dict.silence_word();

        let lscr = if de.is_filler {
            if wid == silence {
                self.config.penalties.silence_word_penalty
            } else {
                self.config.penalties.filler_word_penalty
            }
        } else {
            let raw = self.raw_tg_score(prev_real_fwid, real_fwid, de.fwid);
            ((raw as f64) * lwf).round() as Score
        };

        let first_ci = de.first_ci_phone();
        let pred = self.bptable.entry(bp);
        let (pred_s_idx, pred_r_diph) = (pred.s_idx, pred.r_diph);
        let perm = self.rc_perm(pred_r_diph, first_ci);
        let pred_exit = self.bptable.rc_score(pred_s_idx, perm);

        (score - pred_exit - lscr, lscr)
    }

    /// `search_postprocess_bptable(lwf, label)` (spec §4.9).
    pub(crate) fn back_trace(&mut self, lwf: f64) -> Result<Hypothesis> {
        if self.current_frame < MIN_UTT_FRAMES {
            tracing::warn!(frames = self.current_frame, "utterance shorter than the minimum; returning empty hypothesis");
            return Ok(Hypothesis::empty());
        }

        let terminal = self.terminal_bp_idx(lwf)?;
        self.compute_seg_scores(lwf);
        self.segment_back_trace(terminal, |idx| {
            let e = self.bptable.entry(idx);
            (e.ascr, e.lscr)
        })
    }

    /// Finds `</s>` in the final decoded frame, or synthesizes a terminal
    /// entry from the best-scoring exit in the latest non-empty frame (spec
    /// §7 "`</s>` never reached").
    fn terminal_bp_idx(&mut self, lwf: f64) -> Result<BpIdx> {
        let finish = self.dict.finish_word();
        let last_frame = self.current_frame.saturating_sub(1);

        if let Some(found) = Self::find_wid_in_frame_entries(&self.bptable, last_frame, finish) {
            return Ok(found);
        }

        let mut f = last_frame;
        while self.bptable.entries_in_frame(f).is_empty() && f > 0 {
            f -= 1;
        }
        let start = self.bptable.frame_start_idx(f);
        let entries = self.bptable.entries_in_frame(f).to_vec();
        let Some((local_i, best)) = entries.iter().enumerate().max_by_key(|(_, e)| e.score) else {
            tracing::warn!("no back-pointer entries at all; utterance produced no hypothesis");
            return Err(SearchError::BacktraceSegmentOverflow(0));
        };
        let best_idx = start + local_i as u32;

        let finish_fwid = self.dict.entry(finish).fwid;
        let raw = self.raw_tg_score(best.prev_real_fwid, best.real_fwid, finish_fwid);
        let lm = ((raw as f64) * lwf).round() as Score;
        let score = best.score + lm;

        let new_idx = self.bptable.append_synthetic(finish, f + 1, score, best_idx);
        let best_real_fwid = best.real_fwid;
        let e = self.bptable.entry_mut(new_idx);
        e.real_fwid = finish_fwid;
        e.prev_real_fwid = best_real_fwid;
        Ok(new_idx)
    }

    fn find_wid_in_frame_entries(bptable: &crate::bptable::BpTable, frame: Frame, wid: WordId) -> Option<BpIdx> {
        let start = bptable.frame_start_idx(frame);
        bptable
            .entries_in_frame(frame)
            .iter()
            .position(|e| e.wid == wid)
            .map(|local_i| start + local_i as BpIdx)
    }

    /// `seg_back_trace`: walks the back-pointer chain from `terminal` to the
    /// synthetic start entry, producing segments in utterance order (fillers
    /// retained; `Hypothesis::words` drops them for the display string).
    fn segment_back_trace(&self, terminal: BpIdx, ascr_lscr: impl Fn(BpIdx) -> (Score, Score)) -> Result<Hypothesis> {
        let mut chain = Vec::new();
        let mut cur = Some(terminal);
        while let Some(idx) = cur {
            let e = self.bptable.entry(idx);
            if e.bp == NO_BP {
                break;
            }
            chain.push(idx);
            if chain.len() > MAX_BACKTRACE_SEGMENTS {
                return Err(SearchError::BacktraceSegmentOverflow(MAX_BACKTRACE_SEGMENTS));
            }
            cur = Some(e.bp);
        }
        chain.reverse();

        let mut segments = Vec::with_capacity(chain.len());
        let mut total_ascr = 0;
        let mut total_lscr = 0;
        for &idx in &chain {
            let e = self.bptable.entry(idx);
            let sf = self.bptable.entry(e.bp).frame + 1;
            let ef = e.frame;
            let (ascr, lscr) = ascr_lscr(idx);
            total_ascr += ascr;
            total_lscr += lscr;
            segments.push(HypSegment {
                wid: e.wid,
                start_frame: sf,
                end_frame: ef,
                ascr,
                lscr,
                lattice_density: self.lattice_density_for_segment(sf, ef),
                phone_perplexity: self.phone_perplexity_for_segment(sf, ef),
            });
        }

        Ok(Hypothesis { segments, total_ascr, total_lscr })
    }

    /// `search_partial_result`: best live back-pointer's back-trace in the
    /// latest non-empty frame, computed without mutating the BPTable (spec
    /// §5 "without allocating" beyond the returned hypothesis itself).
    pub(crate) fn partial_back_trace(&self) -> Hypothesis {
        if self.bptable.is_empty() {
            return Hypothesis::empty();
        }
        let mut f = self.current_frame.saturating_sub(1);
        loop {
            if !self.bptable.entries_in_frame(f).is_empty() || f == 0 {
                break;
            }
            f -= 1;
        }
        let start = self.bptable.frame_start_idx(f);
        let entries = self.bptable.entries_in_frame(f);
        let Some((local_i, _)) = entries.iter().enumerate().max_by_key(|(_, e)| e.score) else {
            return Hypothesis::empty();
        };
        let terminal = start + local_i as u32;
        self.segment_back_trace(terminal, |idx| self.seg_ascr_lscr(idx, self.lw()))
            .unwrap_or_else(|_| Hypothesis::empty())
    }

    /// Glossary "Lattice density": distinct BPTable entries whose `[sf, ef]`
    /// interval covers frame f, averaged over `[start, end]`.
    fn lattice_density_for_segment(&self, start: Frame, end: Frame) -> f64 {
        if end < start {
            return 0.0;
        }
        let mut total = 0u64;
        for f in start..=end {
            let mut count = 0u64;
            for idx in 0..self.bptable.len() as BpIdx {
                let e = self.bptable.entry(idx);
                if e.bp == NO_BP {
                    continue;
                }
                let sf = self.bptable.entry(e.bp).frame + 1;
                if sf <= f && f <= e.frame {
                    count += 1;
                }
            }
            total += count;
        }
        total as f64 / (end - start + 1) as f64
    }

    /// Glossary "Phone perplexity": `exp(-Σ p(φ|f)·log p(φ|f))` from each
    /// recorded frame's `bestpscr`, averaged over `[start, end]`. Frames
    /// recorded without lookahead data (or when lookahead is disabled)
    /// contribute a perplexity of 1 (a single certain outcome).
    fn phone_perplexity_for_segment(&self, start: Frame, end: Frame) -> f64 {
        if end < start || self.recorded_frames.is_empty() {
            return 1.0;
        }
        let mut total = 0.0;
        let mut n = 0u64;
        for f in start..=end {
            let Some(rf) = self.recorded_frames.get(f as usize) else {
                continue;
            };
            total += match &rf.phone_lookahead {
                Some((bestpscr, _)) => Self::phone_perplexity_for_frame(bestpscr),
                None => 1.0,
            };
            n += 1;
        }
        if n == 0 {
            1.0
        } else {
            total / n as f64
        }
    }

    fn phone_perplexity_for_frame(bestpscr: &[Score]) -> f64 {
        if bestpscr.is_empty() {
            return 1.0;
        }
        let lps: Vec<f64> = bestpscr.iter().map(|&s| s as f64 / LOG_SCALE).collect();
        let max_lp = lps.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let sum_exp: f64 = lps.iter().map(|&lp| (lp - max_lp).exp()).sum();
        let log_z = max_lp + sum_exp.ln();
        let entropy: f64 = lps
            .iter()
            .map(|&lp| {
                let p = (lp - log_z).exp();
                if p > 0.0 {
                    -p * (lp - log_z)
                } else {
                    0.0
                }
            })
            .sum();
        entropy.exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_perplexity_is_one_for_a_single_dominant_phone() {
        let scores = vec![-1000, -1000, 0, -1000];
        let p = Decoder::phone_perplexity_for_frame(&scores);
        assert!((p - 1.0).abs() < 0.01, "one dominant phone should yield near-unity perplexity, got {p}");
    }

    #[test]
    fn phone_perplexity_grows_with_uniform_scores() {
        let uniform = vec![-100, -100, -100, -100];
        let p = Decoder::phone_perplexity_for_frame(&uniform);
        assert!((p - 4.0).abs() < 0.01, "four equally likely phones should yield perplexity ~4, got {p}");
    }
}
