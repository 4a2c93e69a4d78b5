//! Output types produced after an utterance finishes (spec §6 "Produced to
//! collaborators"). Grounded on `search.c:2363-2661`
//! (`search_postprocess_bptable`, `search_hyp_to_str`, dump routines).

use serde::{Deserialize, Serialize};

use crate::types::{Frame, Score, WordId};

/// One word in the final hypothesis, with scoring and profiling detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypSegment {
    pub wid: WordId,
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub ascr: Score,
    pub lscr: Score,
    /// Distinct BPTable entries whose interval covers this segment, averaged
    /// per frame (spec GLOSSARY "Lattice density").
    pub lattice_density: f64,
    /// `exp(-Σ p(φ|f)·log p(φ|f))` over this segment's frames (spec GLOSSARY
    /// "Phone perplexity").
    pub phone_perplexity: f64,
}

/// A finished utterance's hypothesis: word sequence plus score split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub segments: Vec<HypSegment>,
    pub total_ascr: Score,
    pub total_lscr: Score,
}

impl Hypothesis {
    pub fn empty() -> Self {
        Self { segments: Vec::new(), total_ascr: 0, total_lscr: 0 }
    }

    /// Space-separated word string, fillers dropped (`search_remove_context`).
    pub fn words<'a>(&'a self, fwid_to_str: impl Fn(WordId) -> &'a str + 'a, is_filler: impl Fn(WordId) -> bool) -> String {
        self.segments
            .iter()
            .filter(|s| !is_filler(s.wid))
            .map(|s| fwid_to_str(s.wid))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn total_score(&self) -> Score {
        self.total_ascr + self.total_lscr
    }
}

/// Profiling counters accumulated over an utterance (spec §7 "Informational").
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub frames_decoded: u32,
    pub bptable_entries: usize,
    pub lastphn_cand_total: u64,
    pub bptable_overflowed: bool,
    pub renormalized: bool,
}

/// One record of the binary/ASCII lattice dump (spec §6 "Lattice dump").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatticeRecord {
    pub sf: u16,
    pub ef: u16,
    pub score: i32,
    pub ascr: i32,
    pub lscr: i32,
    pub bp: u16,
    pub wid: u16,
}

pub struct LatticeDump {
    pub records: Vec<LatticeRecord>,
}

impl LatticeDump {
    pub fn to_ascii(&self, word_str: impl Fn(u16) -> String) -> String {
        let mut out = String::from("sf\tef\tscore\tascr\tlscr\tbp\tword\n");
        for r in &self.records {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                r.sf,
                r.ef,
                r.score,
                r.ascr,
                r.lscr,
                r.bp,
                word_str(r.wid)
            ));
        }
        out
    }

    /// Binary record layout: `{sf(u16), ef(u16), score(i32), ascr(i32), lscr(i32), bp(u16), wid(u16)}`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.records.len() * 20);
        for r in &self.records {
            buf.extend_from_slice(&r.sf.to_le_bytes());
            buf.extend_from_slice(&r.ef.to_le_bytes());
            buf.extend_from_slice(&r.score.to_le_bytes());
            buf.extend_from_slice(&r.ascr.to_le_bytes());
            buf.extend_from_slice(&r.lscr.to_le_bytes());
            buf.extend_from_slice(&r.bp.to_le_bytes());
            buf.extend_from_slice(&r.wid.to_le_bytes());
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_dump_has_header_and_one_row_per_record() {
        let dump = LatticeDump {
            records: vec![LatticeRecord { sf: 0, ef: 10, score: -100, ascr: -80, lscr: -20, bp: 0, wid: 3 }],
        };
        let text = dump.to_ascii(|w| format!("w{w}"));
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("w3"));
    }

    #[test]
    fn binary_dump_is_twenty_bytes_per_record() {
        let dump = LatticeDump {
            records: vec![
                LatticeRecord { sf: 0, ef: 1, score: 0, ascr: 0, lscr: 0, bp: 0, wid: 0 },
                LatticeRecord { sf: 1, ef: 2, score: 0, ascr: 0, lscr: 0, bp: 0, wid: 1 },
            ],
        };
        // 2+2+4+4+4+2+2 = 20 bytes per record (spec §6 "Lattice dump").
        assert_eq!(dump.to_bytes().len(), 40);
    }
}
