//! Lazy per-word leaf-channel allocation for the last phone of multi-phone
//! words (spec §4.6 "right-context fan-out"). Grounded on
//! `search.c:1457-1536` (`alloc_all_rc`, `free_all_rc`).
//!
//! The reference keeps a singly linked list per word and diffs it against
//! the required ssid sequence so in-flight scores on unchanged entries
//! survive a reallocation within the same utterance. Reusing only applies
//! when the fan-out is already installed and keyed by the same right-context
//! diphone, so this simplifies to: keep the existing chain if the first
//! ssid still matches, otherwise rebuild the whole fan-out from scratch.

use std::collections::HashMap;

use crate::dict::{DictEntry, Dictionary};
use crate::hmm::{HmmInstance, SsidModel};
use crate::types::{Diphone, WordId};

pub struct LeafChan {
    pub hmm: HmmInstance,
    /// Index into the word's right-context permutation table (`rc_id`).
    pub rc_id: u32,
}

/// `word_chan[w]` for words that need per-right-context leaf HMMs.
#[derive(Default)]
pub struct LeafChans {
    chains: HashMap<WordId, Vec<LeafChan>>,
}

impl LeafChans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, w: WordId) -> Option<&[LeafChan]> {
        self.chains.get(&w).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, w: WordId) -> Option<&mut [LeafChan]> {
        self.chains.get_mut(&w).map(Vec::as_mut_slice)
    }

    /// Raw `Vec` access for pruning, which needs to drop individual leaves.
    pub fn get_vec_mut(&mut self, w: WordId) -> Option<&mut Vec<LeafChan>> {
        self.chains.get_mut(&w)
    }

    pub fn is_allocated(&self, w: WordId) -> bool {
        self.chains.contains_key(&w)
    }

    /// Allocate last-phone channels for every possible right context of `w`
    /// (spec assumes `w` uses context, i.e. has more than one phone).
    pub fn alloc_all_rc(&mut self, w: WordId, dict: &dyn Dictionary, entry: &DictEntry) {
        let diphone = entry.phones[entry.len() - 1] as Diphone;
        let sseq_rc = dict.right_context_fwd(diphone);

        let needs_rebuild = match self.chains.get(&w) {
            Some(existing) => existing.first().map(|c| c.hmm.current_ssid(0)) != sseq_rc.first().copied(),
            None => true,
        };

        if needs_rebuild {
            let last_ci = entry.last_ci_phone();
            let fresh = sseq_rc
                .iter()
                .enumerate()
                .map(|(i, &ssid)| LeafChan {
                    hmm: HmmInstance::new(SsidModel::Single(ssid), last_ci),
                    rc_id: i as u32,
                })
                .collect();
            self.chains.insert(w, fresh);
        }
    }

    pub fn free_all_rc(&mut self, w: WordId) {
        self.chains.remove(&w);
    }

    pub fn active_words(&self) -> impl Iterator<Item = WordId> + '_ {
        self.chains.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CiPhone, Ssid};

    struct FakeDict {
        rc: Vec<Ssid>,
    }
    impl Dictionary for FakeDict {
        fn entry(&self, _wid: WordId) -> &DictEntry {
            unimplemented!()
        }
        fn num_words(&self) -> u32 {
            0
        }
        fn word_ids(&self) -> Box<dyn Iterator<Item = WordId> + '_> {
            Box::new(std::iter::empty())
        }
        fn start_word(&self) -> WordId {
            0
        }
        fn finish_word(&self) -> WordId {
            0
        }
        fn silence_word(&self) -> WordId {
            0
        }
        fn right_context_fwd(&self, _diphone: Diphone) -> &[Ssid] {
            &self.rc
        }
        fn right_context_fwd_perm(&self, _diphone: Diphone, _ci: CiPhone) -> usize {
            0
        }
        fn left_context_fwd(&self, _diphone: Diphone, _left_ci: CiPhone) -> Ssid {
            0
        }
        fn diphone_of(&self, _ci_phone: CiPhone, _left_ci: CiPhone) -> Diphone {
            -1
        }
    }

    fn entry() -> DictEntry {
        DictEntry {
            wid: 5,
            fwid: 5,
            phones: vec![10, 20, 30],
            ci_phones: vec![1, 2, 3],
            mpx: false,
            is_filler: false,
        }
    }

    #[test]
    fn allocates_one_leaf_per_right_context() {
        let dict = FakeDict { rc: vec![100, 101, 102] };
        let mut leaves = LeafChans::new();
        leaves.alloc_all_rc(5, &dict, &entry());
        assert_eq!(leaves.get(5).unwrap().len(), 3);
    }

    #[test]
    fn reallocation_with_same_first_ssid_keeps_existing_chain() {
        let dict = FakeDict { rc: vec![100, 101] };
        let mut leaves = LeafChans::new();
        leaves.alloc_all_rc(5, &dict, &entry());
        leaves.get_mut(5).unwrap()[0].hmm.enter_state0(-10, 3, 1);
        leaves.alloc_all_rc(5, &dict, &entry());
        assert_eq!(leaves.get(5).unwrap()[0].hmm.score_at(0), -10);
    }

    #[test]
    fn free_drops_the_chain() {
        let dict = FakeDict { rc: vec![100] };
        let mut leaves = LeafChans::new();
        leaves.alloc_all_rc(5, &dict, &entry());
        leaves.free_all_rc(5);
        assert!(!leaves.is_allocated(5));
    }
}
