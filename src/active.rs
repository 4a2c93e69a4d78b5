//! C3: active-set management (spec §4.3).
//!
//! Two-frame ping-pong active lists indexed by `frame & 1` (spec §9 design
//! notes: "Index computation stays explicit — do not abstract it away").
//! Backing vectors are cleared and reused frame over frame rather than
//! reallocated, matching the reference's "append-counter + backing array"
//! discipline.

use crate::dict::TransitionModel;
use crate::hmm::HmmInstance;
use crate::tree::NodeId;
use crate::types::{Frame, WordId};

/// `active_chan_list[f & 1]` / `active_word_list[f & 1]` / `word_active[w]`.
#[derive(Debug, Default)]
pub struct ActiveLists {
    interior: [Vec<NodeId>; 2],
    words: [Vec<WordId>; 2],
    word_active: Vec<bool>,
}

impl ActiveLists {
    pub fn new(num_words: usize, node_capacity_hint: usize) -> Self {
        Self {
            interior: [
                Vec::with_capacity(node_capacity_hint),
                Vec::with_capacity(node_capacity_hint),
            ],
            words: [Vec::new(), Vec::new()],
            word_active: vec![false; num_words],
        }
    }

    #[inline]
    fn slot(frame: Frame) -> usize {
        (frame & 1) as usize
    }

    pub fn interior_for(&self, frame: Frame) -> &[NodeId] {
        &self.interior[Self::slot(frame)]
    }

    pub fn words_for(&self, frame: Frame) -> &[WordId] {
        &self.words[Self::slot(frame)]
    }

    /// Resets the write-target slot before this frame's scheduling begins.
    /// The slot currently holds whatever was scheduled two frames ago (same
    /// parity); `word_active` is reset only for the words that were in it,
    /// so a word that stays alive across many frames can be rescheduled here
    /// without `schedule_word`'s dedup guard mistaking it for still current.
    pub fn clear_for_write(&mut self, frame: Frame) {
        let slot = Self::slot(frame);
        self.interior[slot].clear();
        for &w in &self.words[slot] {
            self.word_active[w as usize] = false;
        }
        self.words[slot].clear();
    }

    pub fn schedule_interior(&mut self, frame: Frame, node: NodeId) {
        self.interior[Self::slot(frame)].push(node);
    }

    pub fn is_word_active(&self, w: WordId) -> bool {
        self.word_active[w as usize]
    }

    /// Schedule `w` as having a live leaf chain in `frame`; no-op (and
    /// invariant-preserving) if already scheduled (spec §3 invariant 3: a
    /// word appears in its active list exactly once).
    pub fn schedule_word(&mut self, frame: Frame, w: WordId) {
        if !self.word_active[w as usize] {
            self.word_active[w as usize] = true;
            self.words[Self::slot(frame)].push(w);
        }
    }

    pub fn deactivate_word(&mut self, w: WordId) {
        self.word_active[w as usize] = false;
    }
}

/// `compute_sen_active` (spec §4.3): mark senones needed by every currently
/// live instance, returned as a sorted, deduplicated list for the front end
/// so it may skip scoring unused senones.
pub fn compute_sen_active<'a>(
    tm: &dyn TransitionModel,
    frame: Frame,
    live_hmms: impl Iterator<Item = &'a HmmInstance>,
) -> Vec<u32> {
    let mut flags = vec![false; tm.total_dists()];
    for hmm in live_hmms {
        if !hmm.is_active(frame) {
            continue;
        }
        for state in 0..5 {
            let ssid = hmm.ssid.ssid(state);
            let dist = tm.obs_dist(ssid, state);
            if (dist as usize) < flags.len() {
                flags[dist as usize] = true;
            }
        }
    }

    flags
        .iter()
        .enumerate()
        .filter_map(|(i, &on)| on.then_some(i as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pong_lists_are_independent_per_parity() {
        let mut lists = ActiveLists::new(4, 8);
        lists.schedule_interior(0, 10);
        lists.schedule_interior(1, 20);
        assert_eq!(lists.interior_for(0), &[10]);
        assert_eq!(lists.interior_for(1), &[20]);
        assert_eq!(lists.interior_for(2), &[10], "frame 2 reads the same parity slot as frame 0");
    }

    #[test]
    fn clear_for_write_lets_a_long_lived_word_reschedule_every_frame() {
        let mut lists = ActiveLists::new(4, 8);
        lists.schedule_interior(0, 10);
        lists.schedule_word(0, 2);

        // Frame 2 shares frame 0's parity; without the reset a stale `10`
        // and a blocked-by-flag `2` would linger here forever.
        lists.clear_for_write(2);
        assert!(lists.interior_for(2).is_empty());
        assert!(lists.words_for(2).is_empty());
        assert!(!lists.is_word_active(2));

        lists.schedule_interior(2, 10);
        lists.schedule_word(2, 2);
        assert_eq!(lists.interior_for(2), &[10]);
        assert_eq!(lists.words_for(2), &[2]);
    }

    #[test]
    fn word_scheduled_at_most_once() {
        let mut lists = ActiveLists::new(4, 8);
        lists.schedule_word(0, 2);
        lists.schedule_word(0, 2);
        assert_eq!(lists.words_for(0), &[2]);
        assert!(lists.is_word_active(2));
        lists.deactivate_word(2);
        assert!(!lists.is_word_active(2));
    }
}
