//! Read-only dictionary boundary (spec §1 "treated as external collaborators"
//! and §6 "Consumed from collaborators: Dictionary").
//!
//! The search core never loads a pronunciation dictionary or builds phonetic
//! context tables itself; it only indexes the tables this trait exposes.

use crate::types::{CiPhone, Diphone, Fwid, Score, Ssid, WordId};

/// One pronunciation entry (spec §3 "Dictionary entry").
#[derive(Debug, Clone)]
pub struct DictEntry {
    pub wid: WordId,
    pub fwid: Fwid,
    /// Context-dependent phone (ssid) sequence, root to leaf.
    pub phones: Vec<Ssid>,
    /// Parallel CI-phone sequence, same length as `phones`.
    pub ci_phones: Vec<CiPhone>,
    /// True iff this word's first phone must have its left context chosen
    /// dynamically at entry (spec §3 "mpx flag").
    pub mpx: bool,
    /// True for `<sil>`, noise words, `</s>` (spec §4.2).
    pub is_filler: bool,
}

impl DictEntry {
    pub fn len(&self) -> usize {
        self.phones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phones.is_empty()
    }

    pub fn first_ci_phone(&self) -> CiPhone {
        self.ci_phones[0]
    }

    pub fn last_ci_phone(&self) -> CiPhone {
        *self.ci_phones.last().expect("dictionary entries are non-empty")
    }
}

/// Read-only view over the pronunciation dictionary and its precomputed
/// context tables (spec §6). The search core treats every method here as a
/// cheap, side-effect-free lookup; none of it is owned or mutated by the core.
pub trait Dictionary {
    fn entry(&self, wid: WordId) -> &DictEntry;

    fn num_words(&self) -> u32;

    /// Iterate dictionary word ids in a stable order (used to build the tree).
    fn word_ids(&self) -> Box<dyn Iterator<Item = WordId> + '_>;

    fn fwid_of(&self, wid: WordId) -> Fwid {
        self.entry(wid).fwid
    }

    /// `<s>` is never a transition target (spec §4.2); identifies it for the
    /// tree builder to skip.
    fn start_word(&self) -> WordId;
    fn finish_word(&self) -> WordId;
    fn silence_word(&self) -> WordId;

    /// Right-context fan-out ids for a final diphone: which ssid each
    /// following CI-phone maps to, in traversal order.
    fn right_context_fwd(&self, diphone: Diphone) -> &[Ssid];
    /// Permutation: index of `right_context_fwd` that a given following
    /// CI-phone maps to.
    fn right_context_fwd_perm(&self, diphone: Diphone, ci: CiPhone) -> usize;
    fn right_context_fwd_size(&self, diphone: Diphone) -> usize {
        self.right_context_fwd(diphone).len()
    }

    /// Left-context remap: given a root's diphone and the CI-phone of the
    /// predecessor word's last phone, the ssid to install at state 0 (spec §4.6 step 2).
    fn left_context_fwd(&self, diphone: Diphone, left_ci: CiPhone) -> Ssid;

    /// The diphone index for a (ci_phone, left_context_ci_phone) pair, or
    /// `NO_DIPHONE` if the phone has no left-context dependence recorded.
    fn diphone_of(&self, ci_phone: CiPhone, left_ci: CiPhone) -> Diphone;
}

/// Per-state transition-probability lookup for a senone-sequence id (spec §3).
/// 14 transitions total: self/next/skip for each of states 0..3, plus the two
/// terminal transitions out of state 4.
pub trait TransitionModel {
    /// `tprob(ssid, from_state, to_state)`; returns `None` if the transition
    /// does not exist in the topology.
    fn tprob(&self, ssid: Ssid, from_state: usize, to_state: usize) -> Option<Score>;
    /// Observation-distribution index feeding state `state` of `ssid`.
    fn obs_dist(&self, ssid: Ssid, state: usize) -> u32;
    /// Total number of observation distributions (`TotalDists`, spec §6),
    /// used to size the active-senone flag array (spec §4.3).
    fn total_dists(&self) -> usize;
}
