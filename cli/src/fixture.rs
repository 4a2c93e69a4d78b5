//! JSON fixture format for driving [`ps_search::Decoder`] without a real
//! acoustic front end or LM store (both are out of scope for the search
//! core itself, spec §1). A fixture bundles a tiny pronunciation
//! dictionary, a hand-written transition model, right/left-context fan-out
//! tables, bigram/trigram scores, and a literal per-frame senone-score dump
//! — exactly the shape of spec §8's "End-to-end scenarios (literal
//! inputs)".

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use ps_search::{CiPhone, Diphone, DictEntry, Dictionary, Fwid, LanguageModel, Score, Ssid, TransitionModel, WordId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FixtureWord {
    pub text: String,
    pub fwid: Fwid,
    pub phones: Vec<Ssid>,
    pub ci_phones: Vec<CiPhone>,
    #[serde(default)]
    pub mpx: bool,
    #[serde(default)]
    pub is_filler: bool,
}

#[derive(Debug, Deserialize)]
pub struct RightContextEntry {
    pub ssids: Vec<Ssid>,
    /// `ci_phone -> index into ssids`.
    pub perm: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionEntry {
    /// `(from_state, to_state, log_prob)` triples; missing pairs have no transition.
    pub tprob: Vec<(usize, usize, Score)>,
    /// Observation-distribution id per emitting state (length 5).
    pub obs: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneLookaheadFrame {
    pub bestpscr: Vec<Score>,
    pub topsenscr: Score,
}

#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub words: Vec<FixtureWord>,
    pub start_word: String,
    pub finish_word: String,
    pub silence_word: String,
    pub num_ci_phones: usize,
    #[serde(default)]
    pub filler_ci_phones: Vec<CiPhone>,
    pub total_dists: usize,
    /// Keyed by ssid (as a decimal string, JSON object keys are always strings).
    pub transitions: HashMap<String, TransitionEntry>,
    /// Keyed by diphone (as a decimal string).
    #[serde(default)]
    pub right_context_fwd: HashMap<String, RightContextEntry>,
    /// `diphone -> (left_ci -> ssid)`, both keyed as decimal strings.
    #[serde(default)]
    pub left_context_fwd: HashMap<String, HashMap<String, Ssid>>,
    /// `ci_phone -> (left_ci -> diphone)`, both keyed as decimal strings.
    #[serde(default)]
    pub diphone_of: HashMap<String, HashMap<String, Diphone>>,
    /// `"w1_w2" -> score`, fwids as decimal strings joined by `_`.
    #[serde(default)]
    pub bigram: HashMap<String, Score>,
    /// `"w1_w2_w3" -> score`.
    #[serde(default)]
    pub trigram: HashMap<String, Score>,
    pub frames: Vec<Vec<Score>>,
    #[serde(default)]
    pub lookahead_frames: Vec<PhoneLookaheadFrame>,
}

impl Fixture {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing fixture {}", path.display()))
    }
}

/// Read-only dictionary/LM/transition-model views over a loaded [`Fixture`],
/// built once at startup (spec §6 "Consumed from collaborators").
pub struct FixtureModel {
    entries: Vec<DictEntry>,
    texts: Vec<String>,
    start: WordId,
    finish: WordId,
    silence: WordId,
    right_context: HashMap<Diphone, RightContextEntry>,
    left_context: HashMap<(Diphone, CiPhone), Ssid>,
    diphone_of: HashMap<(CiPhone, CiPhone), Diphone>,
    transitions: HashMap<Ssid, TransitionEntry>,
    bigram: HashMap<(Fwid, Fwid), Score>,
    trigram: HashMap<(Fwid, Fwid, Fwid), Score>,
    total_dists: usize,
}

fn parse_key(s: &str) -> Result<i64> {
    s.parse::<i64>().with_context(|| format!("fixture key {s:?} is not an integer"))
}

impl FixtureModel {
    pub fn build(fx: &Fixture) -> Result<Self> {
        let mut entries = Vec::with_capacity(fx.words.len());
        let mut texts = Vec::with_capacity(fx.words.len());
        let mut by_text: HashMap<&str, WordId> = HashMap::new();

        for (i, w) in fx.words.iter().enumerate() {
            if w.phones.len() != w.ci_phones.len() {
                bail!("word {:?}: phones and ci_phones must be the same length", w.text);
            }
            entries.push(DictEntry {
                wid: i as WordId,
                fwid: w.fwid,
                phones: w.phones.clone(),
                ci_phones: w.ci_phones.clone(),
                mpx: w.mpx,
                is_filler: w.is_filler,
            });
            texts.push(w.text.clone());
            by_text.insert(w.text.as_str(), i as WordId);
        }

        let start = *by_text.get(fx.start_word.as_str()).with_context(|| format!("start word {:?} not in dictionary", fx.start_word))?;
        let finish = *by_text.get(fx.finish_word.as_str()).with_context(|| format!("finish word {:?} not in dictionary", fx.finish_word))?;
        let silence = *by_text.get(fx.silence_word.as_str()).with_context(|| format!("silence word {:?} not in dictionary", fx.silence_word))?;

        let mut right_context = HashMap::new();
        for (k, v) in &fx.right_context_fwd {
            right_context.insert(parse_key(k)? as Diphone, RightContextEntry {
                ssids: v.ssids.clone(),
                perm: v.perm.clone(),
            });
        }

        let mut left_context = HashMap::new();
        for (diph, inner) in &fx.left_context_fwd {
            let diph = parse_key(diph)? as Diphone;
            for (lc, ssid) in inner {
                left_context.insert((diph, parse_key(lc)? as CiPhone), *ssid);
            }
        }

        let mut diphone_of = HashMap::new();
        for (ci, inner) in &fx.diphone_of {
            let ci = parse_key(ci)? as CiPhone;
            for (lc, diph) in inner {
                diphone_of.insert((ci, parse_key(lc)? as CiPhone), *diph);
            }
        }

        let mut transitions = HashMap::new();
        for (k, v) in &fx.transitions {
            transitions.insert(parse_key(k)? as Ssid, TransitionEntry {
                tprob: v.tprob.clone(),
                obs: v.obs.clone(),
            });
        }

        let mut bigram = HashMap::new();
        for (k, &score) in &fx.bigram {
            let (a, b) = k.split_once('_').with_context(|| format!("bigram key {k:?} must be \"w1_w2\""))?;
            bigram.insert((a.parse()?, b.parse()?), score);
        }
        let mut trigram = HashMap::new();
        for (k, &score) in &fx.trigram {
            let mut parts = k.split('_');
            let (a, b, c) = (
                parts.next().with_context(|| format!("trigram key {k:?} malformed"))?,
                parts.next().with_context(|| format!("trigram key {k:?} malformed"))?,
                parts.next().with_context(|| format!("trigram key {k:?} malformed"))?,
            );
            trigram.insert((a.parse()?, b.parse()?, c.parse()?), score);
        }

        Ok(Self {
            entries,
            texts,
            start,
            finish,
            silence,
            right_context,
            left_context,
            diphone_of,
            transitions,
            bigram,
            trigram,
            total_dists: fx.total_dists,
        })
    }

    pub fn word_text(&self, wid: WordId) -> &str {
        self.texts.get(wid as usize).map(String::as_str).unwrap_or("<unk>")
    }
}

impl Dictionary for FixtureModel {
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
        self.right_context.get(&diphone).map(|e| e.ssids.as_slice()).unwrap_or(&[])
    }

    fn right_context_fwd_perm(&self, diphone: Diphone, ci: CiPhone) -> usize {
        self.right_context
            .get(&diphone)
            .and_then(|e| e.perm.get(&ci.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn left_context_fwd(&self, diphone: Diphone, left_ci: CiPhone) -> Ssid {
        self.left_context.get(&(diphone, left_ci)).copied().unwrap_or(diphone.max(0) as Ssid)
    }

    fn diphone_of(&self, ci_phone: CiPhone, left_ci: CiPhone) -> Diphone {
        self.diphone_of.get(&(ci_phone, left_ci)).copied().unwrap_or(ps_search::NO_DIPHONE)
    }
}

impl TransitionModel for FixtureModel {
    fn tprob(&self, ssid: Ssid, from_state: usize, to_state: usize) -> Option<Score> {
        self.transitions.get(&ssid)?.tprob.iter().find(|&&(f, t, _)| f == from_state && t == to_state).map(|&(_, _, p)| p)
    }

    fn obs_dist(&self, ssid: Ssid, state: usize) -> u32 {
        self.transitions.get(&ssid).and_then(|e| e.obs.get(state)).copied().unwrap_or(0)
    }

    fn total_dists(&self) -> usize {
        self.total_dists
    }
}

/// A fixed LM table driven purely by the fixture's bigram/trigram maps; any
/// pair/triple absent from the table scores as `0` (neutral), since the
/// fixture format has no notion of backoff weights (spec §9 open question
/// #1 leaves the bigram-fallback policy to the LM implementation).
pub struct FixtureLm {
    bigram: HashMap<(Fwid, Fwid), Score>,
    trigram: HashMap<(Fwid, Fwid, Fwid), Score>,
    vocab: std::collections::HashSet<Fwid>,
}

impl FixtureLm {
    pub fn build(fx: &FixtureModel) -> Self {
        let vocab = fx.entries.iter().map(|e| e.fwid).collect();
        Self {
            bigram: fx.bigram.clone(),
            trigram: fx.trigram.clone(),
            vocab,
        }
    }
}

impl LanguageModel for FixtureLm {
    fn bigram_score(&self, w1: Fwid, w2: Fwid) -> Score {
        self.bigram.get(&(w1, w2)).copied().unwrap_or(0)
    }

    fn trigram_score(&self, w1: Fwid, w2: Fwid, w3: Fwid) -> Score {
        self.trigram.get(&(w1, w2, w3)).copied().unwrap_or_else(|| self.bigram_score(w2, w3))
    }

    fn next_frame(&mut self) {}

    fn dictwd_in_lm(&self, fwid: Fwid) -> bool {
        self.vocab.contains(&fwid)
    }
}
