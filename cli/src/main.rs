//! Demo CLI driving [`ps_search::Decoder`] over a JSON fixture dump (spec
//! §6's CLI-adjacent knobs; no audio front end or real LM/dictionary store
//! lives here — those are out of scope for the search core, spec §1).

mod fixture;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ps_search::{Decoder, DecoderConfig, Dictionary as _, TransitionModel as _};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fixture::{Fixture, FixtureLm, FixtureModel};

#[derive(Parser, Debug)]
#[command(
    name = "ps-search",
    about = "Drive the lexical-tree Viterbi beam search over a JSON senone-score fixture",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Path to a fixture JSON file (dictionary, transition model, LM tables, per-frame senone scores).
    fixture: PathBuf,

    /// Optional `DecoderConfig` JSON overriding the defaults (beam widths, penalties, LM weights, ...).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format for the final hypothesis.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Also print the per-utterance profiling counters (spec §7 "Informational").
    #[arg(long, default_value_t = false)]
    stats: bool,

    /// Dump the BPTable as a lattice after decoding instead of just the best hypothesis.
    #[arg(long, default_value_t = false)]
    lattice: bool,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let fx = Fixture::load(&cli.fixture)?;
    let model = FixtureModel::build(&fx)?;
    let lm = FixtureLm::build(&model);

    let config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => DecoderConfig::default(),
    };

    let num_ci_phones = fx.num_ci_phones;
    let filler_ci_phones = fx.filler_ci_phones.clone();
    let frames = fx.frames.clone();
    let lookahead_frames = fx.lookahead_frames.clone();

    // The dictionary, LM, and transition model all need to outlive the
    // decoder's trait objects; `model` is moved in twice behind separate
    // boxes because `Dictionary` and `TransitionModel` are both implemented
    // on `FixtureModel` but the `Decoder` constructor wants two distinct
    // trait objects, so we share ownership through an `Arc`.
    let model = std::sync::Arc::new(model);
    let dict_box: Box<dyn ps_search::Dictionary> = Box::new(ArcDict(model.clone()));
    let tm_box: Box<dyn ps_search::TransitionModel> = Box::new(ArcTm(model.clone()));

    let mut decoder = Decoder::new(config, dict_box, Box::new(lm), tm_box, num_ci_phones, filler_ci_phones);

    info!(frames = frames.len(), "starting utterance");
    decoder.start_utt().context("start_utt failed")?;

    for (i, senone_scores) in frames.iter().enumerate() {
        let phone_lookahead = lookahead_frames.get(i).map(|f| ps_search::PhoneLookaheadScores {
            bestpscr: f.bestpscr.as_slice(),
            topsenscr: f.topsenscr,
        });
        let frame = ps_search::FrameScores { senone_scores, phone_lookahead };
        decoder.process_frame(frame).with_context(|| format!("processing frame {i}"))?;
    }

    let hyp = decoder.end_utt().context("end_utt failed")?;

    match cli.format {
        OutputFormat::Text => {
            let words = hyp.words(|w| model.word_text(w), |w| model.entry(w).is_filler);
            println!("{words}");
            println!("score: ascr={} lscr={} total={}", hyp.total_ascr, hyp.total_lscr, hyp.total_score());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&hyp)?);
        }
    }

    if cli.stats {
        let stats = decoder.stats();
        eprintln!("{stats:?}");
    }

    if cli.lattice {
        print_lattice(&decoder, &model);
    }

    Ok(())
}

/// Dumps the decoder's full BPTable as a lattice (spec §6 "Lattice dump"
/// ASCII variant): one row per word-exit event recorded during whichever
/// pass produced the returned hypothesis, not just the entries on its own
/// back-traced path.
fn print_lattice(decoder: &Decoder, model: &FixtureModel) {
    let dump = decoder.lattice_dump();
    print!("{}", dump.to_ascii(|wid| model.word_text(wid as u32).to_string()));
}

/// Thin `Arc`-backed forwarding wrapper so one [`FixtureModel`] can back two
/// distinct trait-object parameters of [`Decoder::new`].
struct ArcDict(std::sync::Arc<FixtureModel>);
impl ps_search::Dictionary for ArcDict {
    fn entry(&self, wid: ps_search::WordId) -> &ps_search::DictEntry {
        self.0.entry(wid)
    }
    fn num_words(&self) -> u32 {
        self.0.num_words()
    }
    fn word_ids(&self) -> Box<dyn Iterator<Item = ps_search::WordId> + '_> {
        self.0.word_ids()
    }
    fn start_word(&self) -> ps_search::WordId {
        self.0.start_word()
    }
    fn finish_word(&self) -> ps_search::WordId {
        self.0.finish_word()
    }
    fn silence_word(&self) -> ps_search::WordId {
        self.0.silence_word()
    }
    fn right_context_fwd(&self, diphone: ps_search::Diphone) -> &[ps_search::Ssid] {
        self.0.right_context_fwd(diphone)
    }
    fn right_context_fwd_perm(&self, diphone: ps_search::Diphone, ci: ps_search::CiPhone) -> usize {
        self.0.right_context_fwd_perm(diphone, ci)
    }
    fn left_context_fwd(&self, diphone: ps_search::Diphone, left_ci: ps_search::CiPhone) -> ps_search::Ssid {
        self.0.left_context_fwd(diphone, left_ci)
    }
    fn diphone_of(&self, ci_phone: ps_search::CiPhone, left_ci: ps_search::CiPhone) -> ps_search::Diphone {
        self.0.diphone_of(ci_phone, left_ci)
    }
}

struct ArcTm(std::sync::Arc<FixtureModel>);
impl ps_search::TransitionModel for ArcTm {
    fn tprob(&self, ssid: ps_search::Ssid, from_state: usize, to_state: usize) -> Option<ps_search::Score> {
        self.0.tprob(ssid, from_state, to_state)
    }
    fn obs_dist(&self, ssid: ps_search::Ssid, state: usize) -> u32 {
        self.0.obs_dist(ssid, state)
    }
    fn total_dists(&self) -> usize {
        self.0.total_dists()
    }
}

/// Initialize tracing with an env-driven filter (default INFO), mirroring
/// the pack's `sezkp-cli` initialization.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry().with(filter).with(fmt_layer).try_init();
}
