//! C7: flat-lexicon second pass (spec §4.7).
//!
//! The reference builds a second, non-prefix-shared lexicon for this pass.
//! Viterbi correctness only depends on the HMM topology each word walks
//! through, not on whether two words happen to share the array cells that
//! hold their state scores, so this reuses [`crate::tree::SearchTree`] and
//! the C3/C4/C5/C6 driver code verbatim; only the per-frame candidate word
//! set (`flat_expand`) and the beam widths/LM weight (`flat_pass`) differ
//! from the tree pass. Grounded on the distilled spec's §4.7 narrative;
//! there is no single `search.c` routine this mirrors one-to-one.

use std::collections::HashMap;

use crate::acoustic::{FrameScores, PhoneLookaheadScores};
use crate::bptable::BpTable;
use crate::decoder::Decoder;
use crate::dict::Dictionary;
use crate::error::Result;
use crate::hypothesis::Hypothesis;
use crate::types::{Frame, WordId, MAX_SF_WIN, MIN_EF_WIDTH};

/// One word's observed `[sf, ef]` span in the tree pass's lattice, merged
/// across every tree-pass exit sharing the same `(sf, wid)`.
#[derive(Debug, Clone, Copy)]
struct FwdflatWordNode {
    wid: WordId,
    first_ef: Frame,
    last_ef: Frame,
}

/// `build_fwdflat_wordlist` (spec §4.7): scans every BPTable entry, derives
/// its `sf`, and merges by `(sf, wid)` into the widest observed `[ef, ef]`
/// interval. Intervals narrower than [`MIN_EF_WIDTH`] are dropped as too
/// speculative to justify a second pass, except for `</s>` which is kept
/// regardless of width as long as it reaches within one frame of the end of
/// the utterance.
fn build_fwdflat_wordlist(bptable: &BpTable, dict: &dyn Dictionary, utt_frames: Frame) -> HashMap<Frame, Vec<FwdflatWordNode>> {
    let finish = dict.finish_word();
    let mut by_sf: HashMap<(Frame, WordId), FwdflatWordNode> = HashMap::new();

    for idx in 0..bptable.len() as crate::types::BpIdx {
        let e = bptable.entry(idx);
        if e.bp == crate::types::NO_BP {
            continue;
        }
        let sf = bptable.entry(e.bp).frame + 1;
        let ef = e.frame;
        by_sf
            .entry((sf, e.wid))
            .and_modify(|n| {
                n.first_ef = n.first_ef.min(ef);
                n.last_ef = n.last_ef.max(ef);
            })
            .or_insert(FwdflatWordNode { wid: e.wid, first_ef: ef, last_ef: ef });
    }

    let mut map: HashMap<Frame, Vec<FwdflatWordNode>> = HashMap::new();
    for ((sf, wid), node) in by_sf {
        let width = node.last_ef.saturating_sub(node.first_ef) as i32;
        if wid == finish {
            if node.last_ef + 1 < utt_frames {
                continue;
            }
        } else if width < MIN_EF_WIDTH {
            continue;
        }
        map.entry(sf).or_default().push(node);
    }
    map
}

/// `fwdflat_wordlist`: every word id appearing anywhere in the wordlist map.
fn fwdflat_wordlist(map: &HashMap<Frame, Vec<FwdflatWordNode>>) -> Vec<WordId> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for nodes in map.values() {
        for n in nodes {
            if seen.insert(n.wid) {
                out.push(n.wid);
            }
        }
    }
    out
}

/// `get_expand_wordlist(f, win)` (spec §4.7): the words whose tree-pass start
/// frame lies within `win` frames of `f`, i.e. this frame's permitted
/// cross-word-transition successors during the flat pass.
fn get_expand_wordlist(map: &HashMap<Frame, Vec<FwdflatWordNode>>, f: Frame, win: i32) -> Vec<WordId> {
    let lo = f.saturating_sub(win.unsigned_abs());
    let hi = f + win.unsigned_abs();
    let mut out = Vec::new();
    for (&sf, nodes) in map {
        if sf >= lo && sf <= hi {
            out.extend(nodes.iter().map(|n| n.wid));
        }
    }
    out
}

impl Decoder {
    /// Reruns the driver over the same acoustic evidence restricted to the
    /// tree pass's own wordlist (spec §4.7). Returns `Ok(None)` when the tree
    /// pass produced nothing to expand, in which case `end_utt` keeps the
    /// tree-pass hypothesis.
    pub(crate) fn run_fwdflat_pass(&mut self) -> Result<Option<Hypothesis>> {
        let utt_frames = self.current_frame;
        let wordlist_map = build_fwdflat_wordlist(&self.bptable, self.dict.as_ref(), utt_frames);
        if wordlist_map.is_empty() {
            return Ok(None);
        }
        tracing::debug!(words = fwdflat_wordlist(&wordlist_map).len(), "starting flat-lexicon second pass");

        let frames = self.recorded_frames.clone();

        self.reset_runtime_state();
        self.flat_pass = true;
        self.utt_started = true;

        for rf in &frames {
            self.flat_expand = get_expand_wordlist(&wordlist_map, self.current_frame, MAX_SF_WIN);
            let phone_lookahead = rf
                .phone_lookahead
                .as_ref()
                .map(|(bestpscr, topsenscr)| PhoneLookaheadScores { bestpscr: bestpscr.as_slice(), topsenscr: *topsenscr });
            let fs = FrameScores { senone_scores: &rf.senone_scores, phone_lookahead };
            self.drive_one_frame(fs)?;
        }

        self.utt_started = false;
        let hyp = self.back_trace(self.config.lm_weights.fwdflat_lw)?;
        self.flat_pass = false;
        self.flat_expand.clear();
        Ok(Some(hyp))
    }
}
