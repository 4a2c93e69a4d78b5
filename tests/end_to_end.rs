//! End-to-end scenarios driving [`ps_search::Decoder`] over literal,
//! hand-traced inputs (no real acoustic front end or dictionary store; see
//! `tests/common`). Most of these use a single-phone-per-word dictionary, so
//! the lexical tree itself stays empty and each word lives as a permanent
//! standalone HMM instance — the simplest slice of the engine that still
//! exercises the full per-utterance lifecycle. The last scenario uses a
//! multi-phone dictionary instead, to exercise the shared lexical tree,
//! homophone disambiguation, and mpx root rewriting end-to-end.

mod common;

use ps_search::{DictEntry, Decoder, DecoderConfig, FrameScores};

use common::{NeutralLm, ToyDict, ToyTm, ToyWord, TreeDict};

const START: usize = 0;
const FINISH: usize = 1;
const SILENCE: usize = 2;
const WORD_A: usize = 3;
const WORD_B: usize = 4;

fn dict() -> ToyDict {
    ToyDict::new(
        &[
            ToyWord { text: "<s>", is_filler: false },
            ToyWord { text: "</s>", is_filler: false },
            ToyWord { text: "<sil>", is_filler: true },
            ToyWord { text: "A", is_filler: false },
            ToyWord { text: "B", is_filler: false },
        ],
        START,
        FINISH,
        SILENCE,
    )
}

fn new_decoder(config: DecoderConfig) -> Decoder {
    let dict = dict();
    let num_words = dict.num_words() as usize;
    Decoder::new(config, Box::new(dict), Box::new(NeutralLm), Box::new(ToyTm::new(num_words)), num_words, vec![SILENCE as u16])
}

fn base_config() -> DecoderConfig {
    DecoderConfig {
        fwdflat_enabled: false,
        ..Default::default()
    }
}

#[test]
fn utterance_below_minimum_length_yields_empty_hypothesis() {
    let mut decoder = new_decoder(base_config());
    let tm = ToyTm::new(5);
    let scores = tm.senone_scores(None, 0, -100);

    decoder.start_utt().expect("start_utt");
    for _ in 0..3 {
        decoder.process_frame(FrameScores { senone_scores: &scores, phone_lookahead: None }).expect("process_frame");
    }
    let hyp = decoder.end_utt().expect("end_utt");

    assert!(hyp.segments.is_empty(), "fewer than MIN_UTT_FRAMES frames must produce no segments");
    assert_eq!(hyp.total_ascr, 0);
    assert_eq!(hyp.total_lscr, 0);
}

/// Word A's single phone is scored far better than every other word's every
/// frame. Nothing in this dictionary ever gets pruned (the default beams are
/// many orders of magnitude wider than the few-thousand-point gap between A
/// and its rivals), so the back-trace's winner-take-all max-score selection
/// at each cross-word transition is the only thing standing between A and a
/// hypothesis full of noise; this pins that it actually holds.
#[test]
fn dominant_word_wins_every_cross_word_transition() {
    let mut decoder = new_decoder(base_config());
    let tm = ToyTm::new(5);
    let scores = tm.senone_scores(Some(WORD_A as u32), 0, -2000);

    decoder.start_utt().expect("start_utt");
    for _ in 0..10 {
        decoder.process_frame(FrameScores { senone_scores: &scores, phone_lookahead: None }).expect("process_frame");
    }
    let hyp = decoder.end_utt().expect("end_utt");

    assert!(!hyp.segments.is_empty(), "ten frames should clear MIN_UTT_FRAMES and produce a hypothesis");
    // `</s>` never comes from a real exit here (it is entered once at frame 0
    // and `word_transition` skips re-entering the finish word every cycle),
    // so `terminal_bp_idx` always ends up synthesizing one trailing `</s>`
    // segment on top of whichever word's exits actually won each cycle.
    assert!(
        hyp.segments.iter().all(|s| s.wid == WORD_A as u32 || s.wid == FINISH as u32),
        "every real segment should be the dominant word, got {:?}",
        hyp.segments.iter().map(|s| s.wid).collect::<Vec<_>>()
    );

    let dict = dict();
    let words = hyp.words(|w| dict.word_text(w), |_| false);
    assert!(!words.contains('B'), "the losing word must never surface in the final hypothesis: {words:?}");
}

/// Single-phone words are permanently resident and keep cycling through
/// their topology for as long as the utterance runs; a word's own HMM takes
/// exactly five frames (`NUM_STATES`) to walk from entry to exit under
/// `ToyTm`'s strictly forward topology, so a ten-frame utterance completes
/// the cycle twice, followed by the synthesized trailing `</s>` segment
/// `terminal_bp_idx` always appends when the finish word never wins one on
/// its own.
#[test]
fn dominant_word_completes_two_full_cycles_in_ten_frames() {
    let mut decoder = new_decoder(base_config());
    let tm = ToyTm::new(5);
    let scores = tm.senone_scores(Some(WORD_A as u32), 0, -2000);

    decoder.start_utt().expect("start_utt");
    for _ in 0..10 {
        decoder.process_frame(FrameScores { senone_scores: &scores, phone_lookahead: None }).expect("process_frame");
    }
    let hyp = decoder.end_utt().expect("end_utt");

    assert_eq!(hyp.segments.len(), 3, "segments: {:?}", hyp.segments);
    assert_eq!(hyp.segments[0].wid, WORD_A as u32);
    assert_eq!(hyp.segments[0].end_frame, 4);
    assert_eq!(hyp.segments[1].wid, WORD_A as u32);
    assert_eq!(hyp.segments[1].end_frame, 9);
    assert_eq!(hyp.segments[2].wid, FINISH as u32);
    assert_eq!(hyp.segments[2].end_frame, 10);
}

/// Shrinks `BpTable`'s capacity to its 25-per-frame floor via `max_frames`
/// and then gives every one of ~150 distinct single-phone words an
/// identical, simultaneous first exit, forcing the table past capacity.
/// The table must drop the overflow silently (after one warning) rather
/// than panic, and `SearchStats` must report it.
#[test]
fn bptable_overflow_is_reported_without_panicking() {
    const NUM_FILLER: usize = 150;

    let mut words = vec![
        ToyWord { text: "<s>", is_filler: false },
        ToyWord { text: "</s>", is_filler: false },
        ToyWord { text: "<sil>", is_filler: true },
    ];
    for _ in 0..NUM_FILLER {
        words.push(ToyWord { text: "W", is_filler: false });
    }
    let dict = ToyDict::new(&words, 0, 1, 2);
    let num_words = dict.num_words() as usize;

    let config = DecoderConfig {
        fwdflat_enabled: false,
        max_frames: 5,
        ..Default::default()
    };
    let mut decoder = Decoder::new(config, Box::new(dict), Box::new(NeutralLm), Box::new(ToyTm::new(num_words)), num_words, vec![2]);

    let tm = ToyTm::new(num_words);
    let scores = tm.senone_scores(None, 0, -10);

    decoder.start_utt().expect("start_utt");
    for _ in 0..5 {
        decoder.process_frame(FrameScores { senone_scores: &scores, phone_lookahead: None }).expect("process_frame");
    }
    let _ = decoder.end_utt().expect("end_utt must not error even once the table has overflowed");

    let stats = decoder.stats();
    assert!(stats.bptable_overflowed, "150 simultaneous word exits into a 25-per-frame*5-frame table must overflow");
}

/// A senone score far more negative than `WORST_SCORE` pushes `BestScore`
/// past the `best_score + 2*global_beam() < WORST_SCORE` renormalization
/// trigger after a single frame; the next frame's `drive_one_frame` call
/// must catch it before it does any further damage to the additive scale.
#[test]
fn extreme_negative_scores_trigger_renormalization() {
    let mut decoder = new_decoder(base_config());
    let tm = ToyTm::new(5);
    let scores = tm.senone_scores(None, 0, -600_000_000);

    decoder.start_utt().expect("start_utt");
    decoder.process_frame(FrameScores { senone_scores: &scores, phone_lookahead: None }).expect("frame 0");
    decoder.process_frame(FrameScores { senone_scores: &scores, phone_lookahead: None }).expect("frame 1");
    let _ = decoder.end_utt().expect("end_utt");

    assert!(decoder.stats().renormalized, "a score collapse this large must trip renormalization");
}

const TREE_START: usize = 0;
const TREE_FINISH: usize = 1;
const TREE_SILENCE: usize = 2;
const WID_CAT: usize = 3;
const WID_CAR: usize = 4;
const WID_CART: usize = 5;
const WID_DOG: usize = 6;

/// CAT/CAR/CART/DOG share a lexical tree the way spec §8 scenario 3
/// describes it: CAT and CAR share a root (ssid 10) and one interior node
/// (ssid 20), diverging only at their final phone (CAT: 30, CAR: 31) as
/// homophone-list siblings; CART walks through CAT's whole pronunciation and
/// one further interior node (ssid 80) before its own exit; DOG is an
/// unrelated single-root word. All four are `mpx` except DOG, so this also
/// exercises the mpx root rewrite on both shared and unshared roots.
fn tree_dict() -> TreeDict {
    let word = |wid: usize, phones: &[u32]| DictEntry {
        wid: wid as ps_search::WordId,
        fwid: wid as ps_search::Fwid,
        phones: phones.to_vec(),
        ci_phones: phones.iter().map(|&p| p as ps_search::CiPhone).collect(),
        mpx: true,
        is_filler: false,
    };

    TreeDict::new(
        vec![
            ("<s>", DictEntry { mpx: false, is_filler: false, ..word(TREE_START, &[100]) }),
            ("</s>", DictEntry { mpx: false, is_filler: false, ..word(TREE_FINISH, &[101]) }),
            ("<sil>", DictEntry { mpx: false, is_filler: true, ..word(TREE_SILENCE, &[102]) }),
            ("CAT", word(WID_CAT, &[10, 20, 30])),
            ("CAR", word(WID_CAR, &[10, 20, 31])),
            ("CART", word(WID_CART, &[10, 20, 30, 80])),
            ("DOG", DictEntry { mpx: false, ..word(WID_DOG, &[40, 50, 60]) }),
        ],
        TREE_START,
        TREE_FINISH,
        TREE_SILENCE,
    )
}

/// Every ssid used by `tree_dict` fits under this with room to spare; `ToyTm`
/// keys its senone-score vector as `ssid * 5 + state`, so the vector only
/// needs to be wide enough to cover the largest ssid in play (102), not the
/// word count.
const TREE_SSID_SPACE: usize = 128;

/// Drives the CAT/CAR/CART/DOG tree far enough (three cross-word cycles'
/// worth of frames) for the shared root/interior nodes, the homophone
/// disambiguation between CAT and CAR, CART's extra interior node past
/// CAT's own exit point, and the cross-word mpx root rewrite back into the
/// tree to all run at least once, while keeping every other word's senones
/// scored far worse than CAT's.
#[test]
fn shared_tree_prefix_disambiguates_to_the_dominant_word() {
    let mut decoder = {
        let dict = tree_dict();
        Decoder::new(
            base_config(),
            Box::new(dict),
            Box::new(NeutralLm),
            Box::new(ToyTm::new(TREE_SSID_SPACE)),
            TREE_SSID_SPACE,
            vec![102],
        )
    };
    let tm = ToyTm::new(TREE_SSID_SPACE);
    let scores = tm.senone_scores_favoring(&[10, 20, 30], 0, -2000);

    decoder.start_utt().expect("start_utt");
    for _ in 0..45 {
        decoder.process_frame(FrameScores { senone_scores: &scores, phone_lookahead: None }).expect("process_frame");
    }
    let hyp = decoder.end_utt().expect("end_utt");

    assert!(!hyp.segments.is_empty(), "45 frames should clear MIN_UTT_FRAMES and produce a hypothesis");

    let dict = tree_dict();
    let words = hyp.words(|w| dict.word_text(w), |w| dict.entry(w).is_filler);
    let tokens: Vec<&str> = words.split_whitespace().collect();
    assert!(!tokens.contains(&"CAR"), "the homophone sibling must never win: {tokens:?}");
    assert!(!tokens.contains(&"CART"), "the extra-interior-node word must never win: {tokens:?}");
    assert!(!tokens.contains(&"DOG"), "the unrelated root must never win: {tokens:?}");
    assert!(tokens.contains(&"CAT"), "the dominant shared-prefix word must surface: {tokens:?}");
}
