//! Shared toy collaborators for the end-to-end tests: a dictionary of
//! single-phone words (so every word lives in `single_phone_wid` and the
//! lexical tree itself stays empty), a fixed forward-only transition model,
//! and a neutral language model. None of this represents a real acoustic
//! front end or LM store (spec §1 Non-goals); it only exercises the search
//! core's own lifecycle against literal, hand-picked inputs.

use std::collections::HashMap;

use ps_search::{CiPhone, Diphone, DictEntry, Dictionary, Fwid, LanguageModel, Score, Ssid, TransitionModel, WordId, NO_DIPHONE};

pub struct ToyWord {
    pub text: &'static str,
    pub is_filler: bool,
}

pub struct ToyDict {
    entries: Vec<DictEntry>,
    texts: Vec<&'static str>,
    start: WordId,
    finish: WordId,
    silence: WordId,
}

impl ToyDict {
    /// Builds a dictionary where word `i`'s single phone is ssid `i` (so the
    /// observation table can key directly off word index).
    pub fn new(words: &[ToyWord], start: usize, finish: usize, silence: usize) -> Self {
        let mut entries = Vec::with_capacity(words.len());
        let mut texts = Vec::with_capacity(words.len());
        for (i, w) in words.iter().enumerate() {
            entries.push(DictEntry {
                wid: i as WordId,
                fwid: i as Fwid,
                phones: vec![i as Ssid],
                ci_phones: vec![i as CiPhone],
                mpx: false,
                is_filler: w.is_filler,
            });
            texts.push(w.text);
        }
        Self {
            entries,
            texts,
            start: start as WordId,
            finish: finish as WordId,
            silence: silence as WordId,
        }
    }

    pub fn word_text(&self, wid: WordId) -> &'static str {
        self.texts[wid as usize]
    }
}

impl Dictionary for ToyDict {
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
        self.finish
    }
    fn silence_word(&self) -> WordId {
        self.silence
    }
    fn right_context_fwd(&self, _diphone: Diphone) -> &[Ssid] {
        &[]
    }
    fn right_context_fwd_perm(&self, _diphone: Diphone, _ci: CiPhone) -> usize {
        0
    }
    fn left_context_fwd(&self, _diphone: Diphone, _left_ci: CiPhone) -> Ssid {
        0
    }
    fn diphone_of(&self, _ci_phone: CiPhone, _left_ci: CiPhone) -> Diphone {
        NO_DIPHONE
    }
}

/// Five emitting states plus a non-emitting exit, strictly forward (no
/// self-loop, no skip): a word needs exactly five frames of evaluation past
/// its entry to expose a valid exit score. Every ssid shares this topology;
/// only the observation scores distinguish one word from another.
pub struct ToyTm {
    num_words: usize,
}

impl ToyTm {
    pub fn new(num_words: usize) -> Self {
        Self { num_words }
    }

    /// One senone-score vector, five slots per word (`ssid * 5 + state`),
    /// every word's slots set to `background` except `favored`'s, set to
    /// `favored_score`.
    pub fn senone_scores(&self, favored: Option<Ssid>, favored_score: Score, background: Score) -> Vec<Score> {
        let mut v = vec![background; self.num_words * 5];
        if let Some(f) = favored {
            let base = f as usize * 5;
            for s in &mut v[base..base + 5] {
                *s = favored_score;
            }
        }
        v
    }

    /// Same as `senone_scores` but favoring every ssid in `favored`, so a
    /// multi-phone word's whole pronunciation can be boosted in one vector.
    pub fn senone_scores_favoring(&self, favored: &[Ssid], favored_score: Score, background: Score) -> Vec<Score> {
        let mut v = vec![background; self.num_words * 5];
        for &f in favored {
            let base = f as usize * 5;
            for s in &mut v[base..base + 5] {
                *s = favored_score;
            }
        }
        v
    }
}

impl TransitionModel for ToyTm {
    fn tprob(&self, _ssid: Ssid, from: usize, to: usize) -> Option<Score> {
        match (from, to) {
            (0, 1) | (1, 2) | (2, 3) | (3, 4) | (4, 5) => Some(-5),
            _ => None,
        }
    }
    fn obs_dist(&self, ssid: Ssid, state: usize) -> u32 {
        ssid * 5 + state as u32
    }
    fn total_dists(&self) -> usize {
        self.num_words * 5
    }
}

/// A dictionary of literal, fully-specified [`DictEntry`] values, for tests
/// that need multi-phone words (and so exercise the lexical tree's shared
/// roots/interior nodes/homophone lists, lazy leaf allocation, and mpx root
/// rewriting), unlike [`ToyDict`]'s single-phone-per-word fixtures. Every
/// final phone's right-context fan-out is a single entry keyed by the final
/// phone's own ssid, and every mpx root's left-context remap just echoes the
/// root's own diphone back (tests here only need the mpx rewrite to leave a
/// root's effective ssid unchanged across a cross-word re-entry, not to pin
/// a specific left-context-dependent variant).
pub struct TreeDict {
    entries: Vec<DictEntry>,
    texts: Vec<&'static str>,
    start: WordId,
    finish: WordId,
    silence: WordId,
    /// `right_context_fwd(diphone)` table, one single-entry fan-out per
    /// distinct final-phone diphone seen across `entries`.
    right_context: HashMap<Diphone, Vec<Ssid>>,
}

impl TreeDict {
    pub fn new(entries: Vec<(&'static str, DictEntry)>, start: usize, finish: usize, silence: usize) -> Self {
        let texts = entries.iter().map(|(t, _)| *t).collect();
        let entries: Vec<DictEntry> = entries.into_iter().map(|(_, e)| e).collect();

        let mut right_context = HashMap::new();
        for e in &entries {
            if e.is_empty() {
                continue;
            }
            let last = e.phones[e.len() - 1];
            right_context.entry(last as Diphone).or_insert_with(|| vec![last]);
        }

        Self {
            entries,
            texts,
            start: start as WordId,
            finish: finish as WordId,
            silence: silence as WordId,
            right_context,
        }
    }

    pub fn word_text(&self, wid: WordId) -> &'static str {
        self.texts[wid as usize]
    }
}

impl Dictionary for TreeDict {
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
        self.finish
    }
    fn silence_word(&self) -> WordId {
        self.silence
    }
    fn right_context_fwd(&self, diphone: Diphone) -> &[Ssid] {
        self.right_context.get(&diphone).map(Vec::as_slice).unwrap_or(&[])
    }
    fn right_context_fwd_perm(&self, _diphone: Diphone, _ci: CiPhone) -> usize {
        0
    }
    fn left_context_fwd(&self, diphone: Diphone, _left_ci: CiPhone) -> Ssid {
        diphone as Ssid
    }
    fn diphone_of(&self, _ci_phone: CiPhone, _left_ci: CiPhone) -> Diphone {
        NO_DIPHONE
    }
}

/// Always scores 0: no bigram/trigram preference between any pair of words,
/// so acoustic dominance alone decides the winning path.
pub struct NeutralLm;

impl LanguageModel for NeutralLm {
    fn bigram_score(&self, _w1: Fwid, _w2: Fwid) -> Score {
        0
    }
    fn trigram_score(&self, _w1: Fwid, _w2: Fwid, _w3: Fwid) -> Score {
        0
    }
    fn next_frame(&mut self) {}
    fn dictwd_in_lm(&self, _fwid: Fwid) -> bool {
        true
    }
}

#[allow(dead_code)]
pub fn neutral_lm_map() -> HashMap<(Fwid, Fwid), Score> {
    HashMap::new()
}
