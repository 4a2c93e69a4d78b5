//! C5: back-pointer lattice and per-right-context exit-score stack (spec §3
//! "BPTable (back-pointer lattice)", §4.6 "Save-backpointer"). Grounded on
//! `search.c:964-1044` (`cache_bptable_paths`, `save_bwd_ptr`).
//!
//! Struct-of-arrays is avoided here in favor of one `Vec<BpEntry>` (spec §9:
//! "acceptable and may be preferable for cache locality" — not mandatory);
//! this keeps the merge-on-duplicate-exit logic in one place without index
//! juggling across parallel vectors.

use crate::types::{BpIdx, Diphone, Frame, Fwid, Score, WordId, NO_BP, NO_DIPHONE, WORST_SCORE};

#[derive(Debug, Clone)]
pub struct BpEntry {
    pub wid: WordId,
    pub frame: Frame,
    pub bp: BpIdx,
    pub score: Score,
    /// Base offset into the BScoreStack; the block has `rc_fanout` slots.
    pub s_idx: u32,
    pub rc_fanout: u32,
    pub r_diph: Diphone,
    pub real_fwid: Fwid,
    pub prev_real_fwid: Fwid,
    pub ascr: Score,
    pub lscr: Score,
}

pub struct BpTable {
    entries: Vec<BpEntry>,
    capacity: usize,
    bscore_stack: Vec<Score>,
    bscore_capacity: usize,
    /// `BPTableIdx[f]`: index of the first entry emitted in frame f.
    frame_idx: Vec<BpIdx>,
    /// `WordLatIdx[w]`: this frame's current word-exit entry for w, cleared
    /// at the start of each new frame's word-exit phase.
    word_lat_idx: Vec<Option<BpIdx>>,
    overflow_warned: bool,
}

impl BpTable {
    pub fn new(capacity: usize, bscore_capacity: usize, num_words: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(1 << 20)),
            capacity,
            bscore_stack: Vec::with_capacity(bscore_capacity.min(1 << 22)),
            bscore_capacity,
            frame_idx: Vec::new(),
            word_lat_idx: vec![None; num_words],
            overflow_warned: false,
        }
    }

    /// Snapshot `BPTableIdx[f] = BPIdx` (spec §4.4 step 1), taken before any
    /// new entry for `f` is written (spec §5 ordering guarantee).
    pub fn snapshot_frame_start(&mut self, frame: Frame) {
        debug_assert_eq!(frame as usize, self.frame_idx.len());
        self.frame_idx.push(self.entries.len() as BpIdx);
    }

    pub fn frame_start_idx(&self, frame: Frame) -> BpIdx {
        self.frame_idx[frame as usize]
    }

    /// Cleared at the start of a frame's word-exit phase so duplicate exits
    /// of the same word within the frame merge instead of double-counting.
    pub fn clear_word_lat_idx(&mut self) {
        self.word_lat_idx.iter_mut().for_each(|s| *s = None);
    }

    pub fn entry(&self, idx: BpIdx) -> &BpEntry {
        &self.entries[idx as usize]
    }

    pub fn entry_mut(&mut self, idx: BpIdx) -> &mut BpEntry {
        &mut self.entries[idx as usize]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_in_frame(&self, frame: Frame) -> &[BpEntry] {
        let start = self.frame_idx[frame as usize] as usize;
        let end = self
            .frame_idx
            .get(frame as usize + 1)
            .map(|&i| i as usize)
            .unwrap_or(self.entries.len());
        &self.entries[start..end]
    }

    pub fn rc_score(&self, s_idx: u32, rc: usize) -> Score {
        self.bscore_stack[s_idx as usize + rc]
    }

    fn set_rc_score(&mut self, s_idx: u32, rc: usize, score: Score) {
        self.bscore_stack[s_idx as usize + rc] = score;
    }

    /// `save_bwd_ptr(w, score, path, rc)` (spec §4.6). Merges into this
    /// frame's existing exit for `w` if one exists, otherwise appends a new
    /// entry and allocates its rc-stack block. Silently drops the write past
    /// capacity after a one-shot warning (spec §7 recoverable conditions).
    /// Returns the new entry's index, or `None` if this merged into an
    /// existing exit or was dropped on overflow. Callers that need trigram
    /// context O(1) must follow a `Some` result with `cache_bptable_paths`.
    #[allow(clippy::too_many_arguments)]
    pub fn save_bwd_ptr(
        &mut self,
        wid: WordId,
        frame: Frame,
        score: Score,
        bp: BpIdx,
        rc: usize,
        rc_fanout: u32,
        r_diph: Diphone,
    ) -> Option<BpIdx> {
        if let Some(existing) = self.word_lat_idx[wid as usize] {
            let e = &mut self.entries[existing as usize];
            if score > e.score {
                e.score = score;
                e.bp = bp;
            }
            let s_idx = e.s_idx;
            if score > self.rc_score(s_idx, rc) {
                self.set_rc_score(s_idx, rc, score);
            }
            return None;
        }

        if self.entries.len() >= self.capacity {
            if !self.overflow_warned {
                tracing::warn!(capacity = self.capacity, "BPTable overflow; dropping further word exits for this utterance");
                self.overflow_warned = true;
            }
            return None;
        }

        let s_idx = self.bscore_stack.len() as u32;
        if (s_idx as usize + rc_fanout as usize) > self.bscore_capacity {
            if !self.overflow_warned {
                tracing::warn!("BScoreStack overflow; dropping further word exits for this utterance");
                self.overflow_warned = true;
            }
            return None;
        }
        self.bscore_stack.extend(std::iter::repeat(WORST_SCORE).take(rc_fanout as usize));
        self.set_rc_score(s_idx, rc, score);

        let idx = self.entries.len() as BpIdx;
        self.entries.push(BpEntry {
            wid,
            frame,
            bp,
            score,
            s_idx,
            rc_fanout,
            r_diph,
            real_fwid: 0,
            prev_real_fwid: 0,
            ascr: 0,
            lscr: 0,
        });
        self.word_lat_idx[wid as usize] = Some(idx);
        Some(idx)
    }

    pub fn overflowed(&self) -> bool {
        self.overflow_warned
    }

    /// Appends a synthetic terminal `</s>` entry unconditionally, bypassing
    /// the per-frame merge and capacity checks `save_bwd_ptr` applies (spec
    /// §4.9: "adjoin a synthetic `</s>` back-pointer").
    pub fn append_synthetic(&mut self, wid: WordId, frame: Frame, score: Score, bp: BpIdx) -> BpIdx {
        let s_idx = self.bscore_stack.len() as u32;
        self.bscore_stack.push(score);
        let idx = self.entries.len() as BpIdx;
        self.entries.push(BpEntry {
            wid,
            frame,
            bp,
            score,
            s_idx,
            rc_fanout: 1,
            r_diph: NO_DIPHONE,
            real_fwid: 0,
            prev_real_fwid: 0,
            ascr: 0,
            lscr: 0,
        });
        idx
    }

    /// `cache_bptable_paths`: walk back through filler predecessors to find
    /// `real_fwid` (nearest real-word fwid) and `prev_real_fwid` (one
    /// further back), cached so trigram scoring is O(1) at transition time.
    pub fn cache_bptable_paths(
        &mut self,
        idx: BpIdx,
        start_fwid: Fwid,
        is_filler: impl Fn(WordId) -> bool,
        fwid_of: impl Fn(WordId) -> Fwid,
    ) {
        let this_wid = self.entries[idx as usize].wid;
        let this_bp = self.entries[idx as usize].bp;

        let real_fwid = if is_filler(this_wid) {
            self.nearest_real_fwid(this_bp, start_fwid, &is_filler, &fwid_of)
        } else {
            fwid_of(this_wid)
        };

        let search_from = if is_filler(this_wid) {
            self.nearest_real_bp(this_bp, &is_filler)
        } else {
            Some(idx)
        };
        let prev_real_fwid = match search_from {
            Some(found) => {
                let bp_of_found = self.entries[found as usize].bp;
                self.nearest_real_fwid(bp_of_found, start_fwid, &is_filler, &fwid_of)
            }
            None => start_fwid,
        };

        let e = &mut self.entries[idx as usize];
        e.real_fwid = real_fwid;
        e.prev_real_fwid = prev_real_fwid;
    }

    fn nearest_real_bp(&self, mut bp: BpIdx, is_filler: &impl Fn(WordId) -> bool) -> Option<BpIdx> {
        loop {
            if bp == NO_BP {
                return None;
            }
            let e = &self.entries[bp as usize];
            if !is_filler(e.wid) {
                return Some(bp);
            }
            bp = e.bp;
        }
    }

    /// Walks back from `bp` through filler predecessors; falls back to
    /// `start_fwid` (the `<s>` context) once the chain is exhausted.
    fn nearest_real_fwid(
        &self,
        bp: BpIdx,
        start_fwid: Fwid,
        is_filler: &impl Fn(WordId) -> bool,
        fwid_of: &impl Fn(WordId) -> Fwid,
    ) -> Fwid {
        match self.nearest_real_bp(bp, is_filler) {
            Some(found) => fwid_of(self.entries[found as usize].wid),
            None => start_fwid,
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Spec §8 invariant: "For all w, at most one BPTable entry with
        /// (frame=f, wid=w)". Feeds an arbitrary sequence of `save_bwd_ptr`
        /// calls, all within the same frame and drawn from a small word
        /// pool so collisions are exercised, and checks the table never
        /// grows two entries for the same word in that frame.
        #[test]
        fn at_most_one_entry_per_frame_and_word(
            calls in proptest::collection::vec((0u32..4, -1000..0i32), 1..40),
        ) {
            let mut bp = BpTable::new(1000, 10_000, 4);
            bp.snapshot_frame_start(0);
            for (wid, score) in calls {
                bp.save_bwd_ptr(wid, 0, score, NO_BP, 0, 1, NO_DIPHONE);
            }

            let entries = bp.entries_in_frame(0);
            let mut seen = std::collections::HashSet::new();
            for e in entries {
                prop_assert!(seen.insert(e.wid), "word {} exited twice in the same frame", e.wid);
            }
        }
    }
}
