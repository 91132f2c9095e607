use std::fmt;

use crate::error::Issue;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Strand {
    Plus,
    Minus,
}

impl Strand {
    /// Parses a strand column. Anything other than `+`/`-` is reported and yields `None`.
    pub fn from_char(x: char, issues: &mut Vec<Issue>) -> Option<Strand> {
        match x {
            '+' => Some(Strand::Plus),
            '-' => Some(Strand::Minus),
            _ => {
                issues.push(Issue::warning(format!("Invalid strand [{x}], feature skipped")));
                None
            }
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Plus => write!(f, "+"),
            Strand::Minus => write!(f, "-"),
        }
    }
}

/// Half-open interval on the forward strand of a chromosome, 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicInterval {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
}

impl GenomicInterval {
    pub fn new(chromosome: impl Into<String>, start: u64, end: u64) -> Self {
        Self { chromosome: chromosome.into(), start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

/// One exon of a transcript model.
///
/// `start..end` is genomic, 0-based half-open. `tx_start` is the 0-based index in the spliced
/// transcript of the exon's first base in transcript orientation (its genomic start on `+`,
/// its genomic end - 1 on `-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exon {
    pub start: u64,
    pub end: u64,
    pub tx_start: u64,
}

impl Exon {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the 0-based transcript index falls into this exon.
    pub fn contains_tx(&self, tx_index: u64) -> bool {
        tx_index >= self.tx_start && tx_index < self.tx_start + self.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptModel {
    pub id: String,
    pub chromosome: String,
    pub strand: Strand,
    /// Ordered in transcript orientation: ascending genomic position on `+`, descending on `-`.
    pub exons: Vec<Exon>,
    /// Number of transcript bases before `c.1`.
    pub coding_offset: u64,
    /// 0-based exclusive transcript index of the coding end; `c.*1` is the base right after it.
    pub coding_end: u64,
}

impl TranscriptModel {
    /// Total length of the spliced transcript.
    pub fn size(&self) -> u64 {
        self.exons.iter().map(Exon::len).sum()
    }

    /// Maps a 1-based transcript position to a 0-based forward-strand genome coordinate.
    pub fn genomic_position(&self, tx_position: i64) -> Option<u64> {
        if tx_position < 1 {
            return None;
        }
        let tx_index = (tx_position - 1) as u64;
        let exon = self.exons.iter().find(|e| e.contains_tx(tx_index))?;
        let delta = tx_index - exon.tx_start;
        Some(match self.strand {
            Strand::Plus => exon.start + delta,
            Strand::Minus => exon.end - 1 - delta,
        })
    }

    /// Inverse of [`TranscriptModel::genomic_position`] for exonic bases.
    pub fn transcript_position(&self, genomic: u64) -> Option<i64> {
        let exon = self.exons.iter().find(|e| genomic >= e.start && genomic < e.end)?;
        let delta = match self.strand {
            Strand::Plus => genomic - exon.start,
            Strand::Minus => exon.end - 1 - genomic,
        };
        Some((exon.tx_start + delta) as i64 + 1)
    }
}

/// Output convention for genomic records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariantStyle {
    /// 0-based offset with minimal (possibly empty) alleles.
    #[default]
    Minimal,
    /// 1-based position, indels carry an anchoring reference base.
    Vcf,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicVariant {
    pub chromosome: String,
    pub offset: u64,
    pub reference: String,
    pub alternate: String,
}

impl GenomicVariant {
    pub fn is_snv(&self) -> bool {
        self.reference.len() == 1 && self.alternate.len() == 1
    }
}

impl fmt::Display for GenomicVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
        write!(
            f,
            "{}:{} {}>{}",
            self.chromosome,
            self.offset,
            shown(&self.reference),
            shown(&self.alternate)
        )
    }
}

/// One exon (or CDS) feature read from an annotation file, before grouping into transcripts.
/// Coordinates are already 0-based half-open.
#[derive(Debug, Clone)]
pub struct TranscriptRegion {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub transcript_id: String,
    pub region_id: String,
    pub kind: RegionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Exon,
    Coding,
}
