//! The search facade (spec §9 design notes: "encapsulate in a single
//! `Decoder` context passed by reference through the core"). Owns every
//! piece of formerly-global state from the reference source and exposes the
//! per-utterance lifecycle: [`Decoder::start_utt`], repeated
//! [`Decoder::process_frame`], [`Decoder::end_utt`].

use std::collections::HashMap;

use crate::active::ActiveLists;
use crate::bptable::BpTable;
use crate::config::DecoderConfig;
use crate::dict::Dictionary;
use crate::error::{Result, SearchError};
use crate::hmm::{HmmInstance, SsidModel};
use crate::hypothesis::{Hypothesis, LatticeDump, LatticeRecord, SearchStats};
use crate::leaf::LeafChans;
use crate::lm::LanguageModel;
use crate::lookahead::PhoneLookahead;
use crate::tree::SearchTree;
use crate::types::{BpIdx, Frame, Fwid, Score, WordId, NO_BP, WORST_SCORE};

/// A last-phone transition candidate awaiting LM attachment (spec §4.5,
/// `lastphn_cand_t`).
#[derive(Debug, Clone, Copy)]
pub(crate) struct LastPhnCand {
    pub wid: WordId,
    pub score: Score,
    pub bp: BpIdx,
}

/// One word's cached best last-phone transition for a given start frame
/// (spec §4.5, `last_ltrans_t`).
#[derive(Debug, Clone, Copy)]
pub(crate) struct LastLtrans {
    pub sf: Frame,
    pub dscr: Score,
    pub bp: BpIdx,
}

/// One already-scored frame, retained only when the flat second pass is
/// enabled (spec §4.7: it reruns the whole frame loop over the same
/// acoustic evidence with a different topology).
#[derive(Debug, Clone)]
pub(crate) struct RecordedFrame {
    pub(crate) senone_scores: Vec<Score>,
    pub(crate) phone_lookahead: Option<(Vec<Score>, Score)>,
}

pub struct Decoder {
    pub(crate) config: DecoderConfig,
    pub(crate) dict: Box<dyn Dictionary>,
    pub(crate) lm: Box<dyn LanguageModel>,
    pub(crate) tm: Box<dyn crate::dict::TransitionModel>,

    pub(crate) tree: SearchTree,
    pub(crate) active: ActiveLists,
    pub(crate) bptable: BpTable,
    pub(crate) leaves: LeafChans,
    pub(crate) lookahead: PhoneLookahead,
    pub(crate) single_phone_hmms: Vec<HmmInstance>,

    pub(crate) lastphn_cand: Vec<LastPhnCand>,
    pub(crate) last_ltrans: HashMap<WordId, LastLtrans>,

    pub(crate) current_frame: Frame,
    pub(crate) best_score: Score,
    pub(crate) last_phone_best_score: Score,
    pub(crate) renormalized: bool,
    pub(crate) frames_seen: u32,
    pub(crate) utt_started: bool,
    pub(crate) num_ci_phones: usize,
    pub(crate) start_fwid: Fwid,

    /// `false` during the tree pass, `true` while replaying the flat pass
    /// (spec §4.7); selects which beam widths and LM weight apply.
    pub(crate) flat_pass: bool,
    /// This frame's permitted cross-word-transition successors during the
    /// flat pass (`get_expand_wordlist`); unused in the tree pass.
    pub(crate) flat_expand: Vec<WordId>,

    pub(crate) recorded_frames: Vec<RecordedFrame>,
    stats: SearchStats,
}

impl Decoder {
    pub fn new(
        config: DecoderConfig,
        dict: Box<dyn Dictionary>,
        lm: Box<dyn LanguageModel>,
        tm: Box<dyn crate::dict::TransitionModel>,
        num_ci_phones: usize,
        filler_ci_phones: Vec<crate::types::CiPhone>,
    ) -> Self {
        let node_hint = SearchTree::max_capacity_hint(dict.as_ref());
        let num_words = dict.num_words() as usize;
        let start_fwid = dict.fwid_of(dict.start_word());
        Self {
            tree: SearchTree::empty(num_words),
            active: ActiveLists::new(num_words, node_hint),
            bptable: BpTable::new(
                config.bptable_capacity(dict.num_words()),
                config.bscorestack_capacity(dict.num_words()),
                num_words,
            ),
            leaves: LeafChans::new(),
            lookahead: PhoneLookahead::new(num_ci_phones, config.topsen_window, config.topsen_thresh, filler_ci_phones),
            single_phone_hmms: Vec::new(),
            lastphn_cand: Vec::new(),
            last_ltrans: HashMap::new(),
            current_frame: 0,
            best_score: WORST_SCORE,
            last_phone_best_score: WORST_SCORE,
            renormalized: false,
            frames_seen: 0,
            utt_started: false,
            num_ci_phones,
            start_fwid,
            flat_pass: false,
            flat_expand: Vec::new(),
            recorded_frames: Vec::new(),
            stats: SearchStats::default(),
            config,
            dict,
            lm,
            tm,
        }
    }

    /// `create_search_tree` + per-utterance state reset (spec §4.2/§5).
    pub fn start_utt(&mut self) -> Result<()> {
        if self.config.topsen_window < 1 {
            return Err(SearchError::InvalidTopsenWindow(self.config.topsen_window));
        }

        self.tree = SearchTree::build(self.dict.as_ref(), Some(self.lm.as_ref()));
        self.validate_mpx_consistency()?;

        self.single_phone_hmms = self
            .tree
            .single_phone_wid
            .iter()
            .map(|&w| {
                let entry = self.dict.entry(w);
                HmmInstance::new(SsidModel::Single(entry.phones[0]), entry.first_ci_phone())
            })
            .collect();

        self.recorded_frames.clear();
        self.stats = SearchStats::default();

        self.reset_runtime_state();
        self.utt_started = true;
        Ok(())
    }

    /// Per-pass runtime reset shared by [`Decoder::start_utt`] and the flat
    /// second pass (spec §4.7): rewinds the BPTable, active lists and search
    /// clocks without touching the tree, the single-phone HMM set, or the
    /// frame recordings the flat pass itself is about to replay.
    pub(crate) fn reset_runtime_state(&mut self) {
        let num_words = self.dict.num_words() as usize;
        self.bptable = BpTable::new(
            self.config.bptable_capacity(self.dict.num_words()),
            self.config.bscorestack_capacity(self.dict.num_words()),
            num_words,
        );
        self.active = ActiveLists::new(num_words, self.tree.num_nodes() + crate::types::ACTIVE_LIST_SLACK);
        self.leaves = LeafChans::new();
        self.lastphn_cand.clear();
        self.last_ltrans.clear();
        self.current_frame = 0;
        self.best_score = WORST_SCORE;
        self.last_phone_best_score = WORST_SCORE;
        self.renormalized = false;
        self.frames_seen = 0;
        self.lookahead.reset();
        for hmm in &mut self.single_phone_hmms {
            hmm.clear_scores();
            hmm.active_frame = 0;
        }
        for r in &mut self.tree.roots {
            r.hmm.clear_scores();
            r.hmm.active_frame = 0;
        }

        // Seed the start word as a zero-cost entry so later filler-chain
        // walks in `cache_bptable_paths` terminate at it. `drive_one_frame`
        // takes its own `snapshot_frame_start(0)` once frame 0 actually
        // runs, so the seed entry lands before frame 0's own bucket starts
        // rather than inside it.
        let start_word = self.dict.start_word();
        self.bptable.save_bwd_ptr(start_word, 0, 0, NO_BP, 0, 1, crate::types::NO_DIPHONE);
        self.seed_roots_from_start();
    }

    /// A root is keyed only by its first phone's ssid, so two entries that
    /// share a root but disagree on `mpx` would leave the root's left-context
    /// handling undefined (spec §7 "HMM-tree words inconsistent in mpx flag").
    fn validate_mpx_consistency(&self) -> Result<()> {
        let mut seen: HashMap<crate::types::Ssid, bool> = HashMap::new();
        let start = self.dict.start_word();
        for wid in self.dict.word_ids() {
            if wid == start {
                continue;
            }
            let entry = self.dict.entry(wid);
            if entry.is_filler || entry.len() < 2 {
                continue;
            }
            match seen.get(&entry.phones[0]) {
                Some(&mpx) if mpx != entry.mpx => {
                    return Err(SearchError::InconsistentMpxFlag { wid });
                }
                _ => {
                    seen.insert(entry.phones[0], entry.mpx);
                }
            }
        }
        Ok(())
    }

    /// Install the `<s>` exit as the entry score for every root and
    /// single-phone word, so the very first real frame can transition in.
    fn seed_roots_from_start(&mut self) {
        let start_bp = 0;
        for ridx in 0..self.tree.roots.len() {
            let r = &mut self.tree.roots[ridx];
            r.hmm.enter_state0(0, start_bp, 0);
        }
        for hmm in &mut self.single_phone_hmms {
            hmm.enter_state0(0, start_bp, 0);
        }
    }

    pub fn process_frame(&mut self, frame: crate::acoustic::FrameScores<'_>) -> Result<()> {
        if self.config.fwdflat_enabled {
            self.recorded_frames.push(RecordedFrame {
                senone_scores: frame.senone_scores.to_vec(),
                phone_lookahead: frame
                    .phone_lookahead
                    .as_ref()
                    .map(|pl| (pl.bestpscr.to_vec(), pl.topsenscr)),
            });
        }
        self.stats.frames_decoded += 1;
        self.stats.lastphn_cand_total += self.lastphn_cand.len() as u64;
        self.drive_one_frame(frame)
    }

    pub fn end_utt(&mut self) -> Result<Hypothesis> {
        self.utt_started = false;
        self.stats.bptable_entries = self.bptable.len();
        self.stats.bptable_overflowed = self.bptable.overflowed();
        self.stats.renormalized = self.renormalized;

        let tree_hyp = self.back_trace(self.config.lm_weights.fwdtree_lw)?;

        if self.config.fwdflat_enabled && !self.recorded_frames.is_empty() {
            match self.run_fwdflat_pass() {
                Ok(Some(flat_hyp)) => return Ok(flat_hyp),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "fwdflat pass failed; returning tree-pass hypothesis"),
            }
        }
        Ok(tree_hyp)
    }

    pub fn partial_result(&self) -> Hypothesis {
        self.partial_back_trace()
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn word_list(&self) -> Vec<WordId> {
        self.dict.word_ids().collect()
    }

    /// `search_dump_lattice`/`search_dump_lattice_ascii` (spec §6 "Lattice
    /// dump"): one record per BPTable entry, `sf` derived from the
    /// predecessor's exit frame. Call after [`Decoder::end_utt`], whose
    /// `back_trace` call leaves every entry's `ascr`/`lscr` populated over
    /// the whole table (not just the back-traced path); the synthetic seed
    /// entry for `<s>` (no predecessor) is skipped since it is not a real
    /// word-exit event.
    pub fn lattice_dump(&self) -> LatticeDump {
        let mut records = Vec::new();
        for idx in 0..self.bptable.len() as BpIdx {
            let e = self.bptable.entry(idx);
            if e.bp == NO_BP {
                continue;
            }
            let sf = self.bptable.entry(e.bp).frame + 1;
            records.push(LatticeRecord {
                sf: sf as u16,
                ef: e.frame as u16,
                score: e.score,
                ascr: e.ascr,
                lscr: e.lscr,
                bp: e.bp as u16,
                wid: e.wid as u16,
            });
        }
        LatticeDump { records }
    }

    /// Whether the caller asked for n-best alternates (spec §9 open question
    /// #2). TODO: wire this up to an n-best back-trace over the BPTable once
    /// a second hypothesis is actually requested anywhere.
    pub fn hyp_alternates(&self) -> bool {
        self.config.hyp_alternates
    }

    /// Accepted for API compatibility with callers that size their own
    /// channel pools; the search core manages its own pruning and does not
    /// consult this value (spec §9 open question #3).
    pub fn set_channels_per_frame_target(&mut self, _target: i32) {}

    /// `search_set_current_lm`: swap the active LM between utterances (spec
    /// §3 "Lifecycle": "Interior tree rebuilt (and freed) whenever the
    /// active LM changes"). The next [`Decoder::start_utt`] rebuilds the
    /// tree from the new LM's vocabulary; this eagerly drops the old
    /// interior tree rather than leaving a stale one reachable in the
    /// meantime.
    pub fn set_current_lm(&mut self, lm: Box<dyn LanguageModel>) {
        self.lm = lm;
        self.tree.clear_interior();
    }

    pub(crate) fn global_beam(&self) -> Score {
        if self.flat_pass {
            self.config.beams.fwdflat_log_beam_width
        } else {
            self.config.beams.log_beam_width
        }
    }

    pub(crate) fn new_word_beam(&self) -> Score {
        if self.flat_pass {
            self.config.beams.fwdflat_log_word_beam_width
        } else {
            self.config.beams.new_word_log_beam_width
        }
    }

    pub(crate) fn lw(&self) -> f64 {
        if self.flat_pass {
            self.config.lm_weights.fwdflat_lw
        } else {
            self.config.lm_weights.fwdtree_lw
        }
    }

    pub(crate) fn word_permitted_for_transition(&self, w: WordId) -> bool {
        !self.flat_pass || self.flat_expand.contains(&w)
    }

    /// `compute_sen_active` (spec §4.4 step 2): the senone set needed by
    /// every instance live in the current frame, handed to the acoustic
    /// front end so it may skip scoring the rest. Callers that don't set
    /// `compute_all_senones` should call this between `process_frame`
    /// invocations and score only these distributions on the next frame.
    pub fn senone_active(&self) -> crate::acoustic::SenoneActive {
        let cf = self.current_frame;
        let roots = self.tree.roots.iter().map(|r| &r.hmm);
        let interior = self.active.interior_for(cf).iter().map(|&id| &self.tree.nodes[id as usize].hmm);
        let leaves = self.active.words_for(cf).iter().flat_map(|&w| {
            self.leaves
                .get(w)
                .into_iter()
                .flat_map(|chans| chans.iter().map(|c| &c.hmm))
        });
        let singles = self.single_phone_hmms.iter();

        let ids = if self.config.compute_all_senones {
            (0..self.tm.total_dists() as u32).collect()
        } else {
            crate::active::compute_sen_active(self.tm.as_ref(), cf, roots.chain(interior).chain(leaves).chain(singles))
        };
        crate::acoustic::SenoneActive { ids }
    }
}
