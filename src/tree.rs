//! C2: lexical search tree (spec §4.2).
//!
//! A prefix-sharing tree of non-root HMM instances, arena-allocated per spec
//! §9 design notes ("implement as arena-allocated node vectors indexed by
//! 32-bit handles... eliminates cyclic-ownership concerns while preserving
//! the exact traversal order"). Two axes: `next` (child, one phone deeper)
//! and `alt` (sibling, alternative ssid at the same depth from the same
//! parent). Grounded on `search.c:3219-3380` (`create_search_tree`).

use std::collections::HashMap;

use crate::dict::Dictionary;
use crate::hmm::{HmmInstance, SsidModel};
use crate::lm::LanguageModel;
use crate::types::{CiPhone, Diphone, Ssid, WordId, NO_DIPHONE};

/// Arena index into `SearchTree::nodes`.
pub type NodeId = u32;

/// A non-root tree node (`CHAN_T` in the reference source).
#[derive(Debug, Clone)]
pub struct InteriorNode {
    pub hmm: HmmInstance,
    pub sseqid: Ssid,
    pub ciphone: CiPhone,
    /// Child: next phone deeper, shared by every word continuing past this node.
    pub next: Option<NodeId>,
    /// Sibling: alternative ssid at the same depth from the same parent.
    pub alt: Option<NodeId>,
    /// Head of the homophone chain of words whose penultimate phone is this node.
    pub penult_phn_wid: Option<WordId>,
}

/// A root channel: one per unique initial phone/ssid across the active
/// vocabulary (`ROOT_CHAN_T`). May be `mpx` (spec §3 "Root channels").
#[derive(Debug, Clone)]
pub struct RootChan {
    pub hmm: HmmInstance,
    pub diphone: Diphone,
    pub ciphone: CiPhone,
    pub next: Option<NodeId>,
    pub penult_phn_wid: Option<WordId>,
}

/// The full lexical tree plus the out-of-tree word lists (spec §3, §4.2).
pub struct SearchTree {
    pub roots: Vec<RootChan>,
    pub nodes: Vec<InteriorNode>,
    /// Words with a single pronunciation phone (plus all filler words),
    /// permanently represented as standalone HMM instances, never freed
    /// (spec §4.5 `prune_word_chan`: "Permanently-allocated single-phone
    /// word instances are pruned analogously (never freed)").
    pub single_phone_wid: Vec<WordId>,
    /// `homophone_set[w]` = next word sharing the same penultimate-node
    /// identity, or `None` to terminate the chain.
    pub homophone_set: Vec<Option<WordId>>,
    first_phone_rchan_map: HashMap<Ssid, NodeId>,
}

impl SearchTree {
    pub fn empty(num_words: usize) -> Self {
        Self {
            roots: Vec::new(),
            nodes: Vec::new(),
            single_phone_wid: Vec::new(),
            homophone_set: vec![None; num_words],
            first_phone_rchan_map: HashMap::new(),
        }
    }

    /// `create_search_tree(use_lm)` (spec §4.2). When `lm` is `None`,
    /// `use_lm` is forced false: this is the `init_search_tree` call that
    /// estimates the maximal tree size over the entire dictionary.
    pub fn build(dict: &dyn Dictionary, lm: Option<&dyn LanguageModel>) -> Self {
        let mut tree = Self::empty(dict.num_words() as usize);
        let use_lm = lm.is_some();
        let start = dict.start_word();

        for wid in dict.word_ids() {
            if wid == start {
                // `<s>` is never a transition target.
                continue;
            }
            let entry = dict.entry(wid);

            if entry.is_filler {
                // Unconditional: bypasses the LM membership filter entirely.
                tree.single_phone_wid.push(wid);
                continue;
            }

            if use_lm {
                if let Some(lm) = lm {
                    if !lm.dictwd_in_lm(entry.fwid) {
                        continue;
                    }
                }
            }

            if entry.len() == 1 {
                tree.single_phone_wid.push(wid);
                continue;
            }

            let root_key = entry.phones[0];
            let root_idx = *tree.first_phone_rchan_map.entry(root_key).or_insert_with(|| {
                let idx = tree.roots.len() as NodeId;
                let ssid_model = if entry.mpx {
                    SsidModel::Mpx([entry.phones[0]; crate::types::NUM_SLOTS])
                } else {
                    SsidModel::Single(entry.phones[0])
                };
                tree.roots.push(RootChan {
                    hmm: HmmInstance::new(ssid_model, entry.ci_phones[0]),
                    diphone: entry.phones[0] as Diphone,
                    ciphone: entry.ci_phones[0],
                    next: None,
                    penult_phn_wid: None,
                });
                idx
            });

            if entry.len() == 2 {
                Self::attach_penult(&mut tree.homophone_set, &mut tree.roots[root_idx as usize].penult_phn_wid, wid);
                continue;
            }

            // Insert phone[1] at the root, then phones[2..len-1) as deeper nodes.
            let root_head = tree.roots[root_idx as usize].next;
            let mut cur = Self::insert_child(&mut tree.nodes, root_head, entry.phones[1], entry.ci_phones[1]);
            if root_head.is_none() {
                tree.roots[root_idx as usize].next = Some(cur);
            }

            for p in 2..entry.len() - 1 {
                let child_head = tree.nodes[cur as usize].next;
                let next_node = Self::insert_child(&mut tree.nodes, child_head, entry.phones[p], entry.ci_phones[p]);
                if child_head.is_none() {
                    tree.nodes[cur as usize].next = Some(next_node);
                }
                cur = next_node;
            }

            Self::attach_penult(&mut tree.homophone_set, &mut tree.nodes[cur as usize].penult_phn_wid, wid);
        }

        tree
    }

    /// Thread `wid` onto a penultimate-word chain (spec §3 "homophone_set").
    fn attach_penult(homophone_set: &mut [Option<WordId>], head: &mut Option<WordId>, wid: WordId) {
        match *head {
            None => *head = Some(wid),
            Some(mut j) => {
                while let Some(next) = homophone_set[j as usize] {
                    j = next;
                }
                homophone_set[j as usize] = Some(wid);
            }
        }
    }

    /// Find `ssid` among `head`'s sibling (`alt`) chain, or allocate and
    /// append a new node. Returns the node id holding `ssid`. Mirrors the
    /// `for (; hmm && hmm->sseqid != ph; hmm = hmm->alt) prev = hmm;` walk.
    fn insert_child(nodes: &mut Vec<InteriorNode>, head: Option<NodeId>, ssid: Ssid, ci: CiPhone) -> NodeId {
        let mut cursor = head;
        let mut prev: Option<NodeId> = None;
        while let Some(id) = cursor {
            if nodes[id as usize].sseqid == ssid {
                return id;
            }
            prev = cursor;
            cursor = nodes[id as usize].alt;
        }
        let new_id = nodes.len() as NodeId;
        nodes.push(InteriorNode {
            hmm: HmmInstance::new(SsidModel::Single(ssid), ci),
            sseqid: ssid,
            ciphone: ci,
            next: None,
            alt: None,
            penult_phn_wid: None,
        });
        if let Some(p) = prev {
            nodes[p as usize].alt = Some(new_id);
        }
        new_id
    }

    /// `delete_search_tree` (spec §4.2): resets the interior tree and each
    /// root's `next`/penultimate list to empty. Modeled as an arena reset
    /// rather than depth-first pointer freeing (spec §9 design notes).
    pub fn clear_interior(&mut self) {
        self.nodes.clear();
        self.first_phone_rchan_map.clear();
        for r in &mut self.roots {
            r.next = None;
            r.penult_phn_wid = None;
        }
        for h in &mut self.homophone_set {
            *h = None;
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_roots(&self) -> usize {
        self.roots.len()
    }

    /// `init_search_tree`: build once over the full dictionary (no LM
    /// filter) purely to discover the maximum interior-node count, sized
    /// with a slack of 128 (spec §4.2).
    pub fn max_capacity_hint(dict: &dyn Dictionary) -> usize {
        let probe = Self::build(dict, None);
        probe.num_nodes() + crate::types::ACTIVE_LIST_SLACK
    }

    /// Walk a word's homophone chain starting at `head`.
    pub fn homophones<'a>(&'a self, head: Option<WordId>) -> impl Iterator<Item = WordId> + 'a {
        let mut cur = head;
        std::iter::from_fn(move || {
            let w = cur?;
            cur = self.homophone_set[w as usize];
            Some(w)
        })
    }

    pub fn diphone_for(&self, ci: CiPhone) -> Diphone {
        self.roots
            .iter()
            .find(|r| r.ciphone == ci)
            .map(|r| r.diphone)
            .unwrap_or(NO_DIPHONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::DictEntry;

    struct FakeDict {
        entries: Vec<DictEntry>,
        start: WordId,
    }

    impl Dictionary for FakeDict {
        fn entry(&self, wid: WordId) -> &DictEntry {
            &self.entries[wid as usize]
        }
        fn num_words(&self) -> u32 {
            self.entries.len() as u32
        }
        fn word_ids(&self) -> Box<dyn Iterator<Item = WordId> + '_> {
            Box::new(0..self.entries.len() as u32)
        }
        fn start_word(&self) -> WordId {
            self.start
        }
        fn finish_word(&self) -> WordId {
            self.entries.len() as u32 - 1
        }
        fn silence_word(&self) -> WordId {
            0
        }
        fn right_context_fwd(&self, _d: Diphone) -> &[Ssid] {
            &[]
        }
        fn right_context_fwd_perm(&self, _d: Diphone, _ci: CiPhone) -> usize {
            0
        }
        fn left_context_fwd(&self, _d: Diphone, _left_ci: CiPhone) -> Ssid {
            0
        }
        fn diphone_of(&self, _ci: CiPhone, _left_ci: CiPhone) -> Diphone {
            NO_DIPHONE
        }
    }

    fn entry(wid: WordId, fwid: Fwid_, phones: &[Ssid], filler: bool) -> DictEntry {
        DictEntry {
            wid,
            fwid: fwid as u32,
            phones: phones.to_vec(),
            ci_phones: phones.iter().map(|&p| p as CiPhone).collect(),
            mpx: false,
            is_filler: filler,
        }
    }
    type Fwid_ = u32;

    #[test]
    fn two_word_dictionary_shares_root_by_first_phone() {
        // word0 = <s> (start, excluded), word1 = "CAT" [1,2,3], word2 = "CAR" [1,2,4]
        let dict = FakeDict {
            entries: vec![
                entry(0, 0, &[99], false),
                entry(1, 1, &[1, 2, 3], false),
                entry(2, 2, &[1, 2, 4], false),
            ],
            start: 0,
        };
        let tree = SearchTree::build(&dict, None);
        assert_eq!(tree.num_roots(), 1, "CAT and CAR share the root for phone 1");
        // Both words' final phone (3 vs 4) is a leaf/right-context, not a tree
        // node, so they also share the single interior node for phone 2 and
        // thread through its homophone chain.
        assert_eq!(tree.num_nodes(), 1);
        let node = &tree.nodes[0];
        assert_eq!(node.penult_phn_wid, Some(1));
        assert_eq!(tree.homophone_set[1], Some(2));
    }

    #[test]
    fn two_phone_word_attaches_directly_to_root_penult_list() {
        let dict = FakeDict {
            entries: vec![entry(0, 0, &[1, 2], false)],
            start: 1, // no real start word in this fixture
        };
        let tree = SearchTree::build(&dict, None);
        assert_eq!(tree.num_roots(), 1);
        assert_eq!(tree.num_nodes(), 0);
        assert_eq!(tree.roots[0].penult_phn_wid, Some(0));
    }

    #[test]
    fn filler_words_go_to_single_phone_list_unconditionally() {
        let dict = FakeDict {
            entries: vec![entry(0, 0, &[1, 2, 3, 4], true)],
            start: 1,
        };
        let tree = SearchTree::build(&dict, None);
        assert_eq!(tree.single_phone_wid, vec![0]);
        assert_eq!(tree.num_roots(), 0);
    }
}
