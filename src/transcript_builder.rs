use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::Path;

use anyhow::Result;
use bio::data_structures::interval_tree::IntervalTree;
use log::info;

use crate::error::Issue;
use crate::gff3::parse_gff3_to_regions;
use crate::refgene::parse_refgene;
use crate::structures::{Exon, RegionKind, Strand, TranscriptModel, TranscriptRegion};

/// Builds a validated transcript model from genomic exon intervals (0-based half-open).
///
/// `coding` is the genomic span `[cds_start, cds_end)` of the coding sequence; `None` or an
/// empty span marks a non-coding transcript whose whole length is addressed as coding.
pub fn assemble_transcript(
    id: String,
    chromosome: String,
    strand: Strand,
    mut intervals: Vec<(u64, u64)>,
    coding: Option<(u64, u64)>,
) -> Result<TranscriptModel> {
    if intervals.is_empty() {
        anyhow::bail!("Transcript {} has no exons.", id);
    }
    if let Some(bad) = intervals.iter().find(|(start, end)| start >= end) {
        anyhow::bail!("Transcript {} has an empty or inverted exon {:?}.", id, bad);
    }

    // Sort exons depending on the strand
    match strand {
        Strand::Plus => intervals.sort_by_key(|(start, _)| *start),
        Strand::Minus => intervals.sort_by(|a, b| b.0.cmp(&a.0)),
    }

    // Check for overlapping exons
    let mut interval_tree = IntervalTree::new();
    for (start, end) in &intervals {
        let interval = *start..*end;
        if let Some(overlap) = interval_tree.find(interval.clone()).next() {
            anyhow::bail!(
                "Transcript {} in chromosome {} has overlapping exons: {:?} overlaps with interval {:?}.",
                id, chromosome, interval, overlap.interval()
            );
        }
        interval_tree.insert(interval, ());
    }

    let mut tx_start = 0;
    let exons: Vec<Exon> = intervals
        .into_iter()
        .map(|(start, end)| {
            let exon = Exon { start, end, tx_start };
            tx_start += end - start;
            exon
        })
        .collect();

    let mut model = TranscriptModel {
        id,
        chromosome,
        strand,
        exons,
        coding_offset: 0,
        coding_end: tx_start,
    };

    if let Some((cds_start, cds_end)) = coding.filter(|(s, e)| s < e) {
        let first = model.transcript_position(cds_start);
        let last = model.transcript_position(cds_end - 1);
        let (Some(first), Some(last)) = (first, last) else {
            anyhow::bail!(
                "Transcript {} has coding boundaries {}-{} outside its exons.",
                model.id, cds_start, cds_end
            );
        };
        let (five_prime, three_prime) = match strand {
            Strand::Plus => (first, last),
            Strand::Minus => (last, first),
        };
        model.coding_offset = (five_prime - 1) as u64;
        model.coding_end = three_prime as u64;
    }

    Ok(model)
}

/// Build transcripts from exon and CDS regions read from a feature file.
pub fn build_transcripts_from_regions(
    transcript_regions: Vec<TranscriptRegion>,
    issues: &mut Vec<Issue>,
) -> Result<Vec<TranscriptModel>> {
    struct Pending {
        chromosome: String,
        strand: Strand,
        exons: Vec<(u64, u64)>,
        coding: Option<(u64, u64)>,
    }

    // Collect regions grouped by transcript ID, keeping first-seen order
    let mut order = Vec::new();
    let mut transcript_map: HashMap<String, Pending> = HashMap::new();

    for tr in transcript_regions {
        let entry = match transcript_map.entry(tr.transcript_id.clone()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                order.push(tr.transcript_id.clone());
                e.insert(Pending {
                    chromosome: tr.chromosome.clone(),
                    strand: tr.strand,
                    exons: Vec::new(),
                    coding: None,
                })
            }
        };

        // Sanity-check chromosome consistency
        if entry.chromosome != tr.chromosome {
            anyhow::bail!(
                "Transcript {} has regions from multiple chromosomes: {} vs {}",
                tr.transcript_id, entry.chromosome, tr.chromosome
            );
        }
        if entry.strand != tr.strand {
            anyhow::bail!("Transcript {} has mixed strands.", tr.transcript_id);
        }

        match tr.kind {
            RegionKind::Exon => entry.exons.push((tr.start, tr.end)),
            RegionKind::Coding => {
                entry.coding = Some(match entry.coding {
                    Some((s, e)) => (s.min(tr.start), e.max(tr.end)),
                    None => (tr.start, tr.end),
                })
            }
        }
    }

    let mut transcripts = Vec::with_capacity(order.len());
    for id in order {
        let Some(mut pending) = transcript_map.remove(&id) else {
            continue;
        };
        if pending.exons.is_empty() {
            match pending.coding {
                Some(span) => {
                    issues.push(Issue::warning(format!(
                        "Transcript {id} has no exon features; using its coding span as the only exon"
                    )));
                    pending.exons.push(span);
                }
                None => continue,
            }
        }
        transcripts.push(assemble_transcript(
            id,
            pending.chromosome,
            pending.strand,
            pending.exons,
            pending.coding,
        )?);
    }

    Ok(transcripts)
}

/// Drops a trailing `.N` version suffix from an accession.
fn unversioned(id: &str) -> &str {
    match id.rsplit_once('.') {
        Some((base, version)) if !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => id,
    }
}

/// Read-only transcript models keyed by identifier.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    transcripts: HashMap<String, TranscriptModel>,
    by_base: HashMap<String, String>,
}

impl TranscriptStore {
    /// Indexes the models. Repeated identifiers keep the first model and are reported.
    ///
    /// This is first-wins, not last-wins: a later definition of the same identifier in the
    /// annotation never replaces an earlier one, it only adds a warning to `issues`.
    pub fn new(models: Vec<TranscriptModel>, issues: &mut Vec<Issue>) -> Self {
        let mut store = Self::default();
        for model in models {
            if store.transcripts.contains_key(&model.id) {
                issues.push(Issue::warning(format!(
                    "Transcript {} is defined more than once; keeping the first definition on {}",
                    model.id, store.transcripts[&model.id].chromosome
                )));
                continue;
            }
            store
                .by_base
                .entry(unversioned(&model.id).to_string())
                .or_insert_with(|| model.id.clone());
            store.transcripts.insert(model.id.clone(), model);
        }
        store
    }

    /// Loads a GFF3 file (`.gff3`/`.gff`) or a refGene/genePred table (anything else).
    pub fn from_path<P: AsRef<Path>>(path: P, issues: &mut Vec<Issue>) -> Result<Self> {
        let path = path.as_ref();
        let is_gff = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("gff3") || e.eq_ignore_ascii_case("gff"));

        let models = if is_gff {
            let regions = parse_gff3_to_regions(path, &["exon".to_string()], issues)?;
            build_transcripts_from_regions(regions, issues)?
        } else {
            parse_refgene(path, issues)?
        };
        let store = Self::new(models, issues);
        if store.is_empty() {
            issues.push(Issue::fatal(format!("No transcripts found in {}", path.display())));
        }
        info!("Loaded {} transcripts from {}", store.len(), path.display());
        Ok(store)
    }

    /// Exact match first, then ignoring the accession version on either side.
    pub fn lookup(&self, id: &str) -> Option<&TranscriptModel> {
        if let Some(model) = self.transcripts.get(id) {
            return Some(model);
        }
        let base = unversioned(id);
        self.transcripts
            .get(base)
            .or_else(|| self.by_base.get(base).and_then(|full| self.transcripts.get(full)))
    }

    pub fn len(&self) -> usize {
        self.transcripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcripts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;

    fn region(tx: &str, start: u64, end: u64, strand: Strand, kind: RegionKind) -> TranscriptRegion {
        TranscriptRegion {
            chromosome: "chr1".into(),
            start,
            end,
            strand,
            transcript_id: tx.into(),
            region_id: format!("{tx}-{start}"),
            kind,
        }
    }

    #[test]
    fn test_assemble_plus_with_utr() {
        let model = assemble_transcript(
            "tx".into(),
            "chr1".into(),
            Strand::Plus,
            vec![(50, 60), (10, 20)],
            Some((15, 55)),
        )
        .unwrap();
        assert_eq!(model.exons[0], Exon { start: 10, end: 20, tx_start: 0 });
        assert_eq!(model.exons[1], Exon { start: 50, end: 60, tx_start: 10 });
        assert_eq!(model.coding_offset, 5);
        assert_eq!(model.coding_end, 15);
    }

    #[test]
    fn test_assemble_minus_with_utr() {
        let model = assemble_transcript(
            "tx".into(),
            "chr1".into(),
            Strand::Minus,
            vec![(10, 20), (50, 60)],
            Some((15, 55)),
        )
        .unwrap();
        assert_eq!(model.exons[0], Exon { start: 50, end: 60, tx_start: 0 });
        // genomic 54 is the first coding base in transcript orientation
        assert_eq!(model.coding_offset, 5);
        assert_eq!(model.coding_end, 15);
        assert_eq!(model.genomic_position(model.coding_offset as i64 + 1), Some(54));
    }

    #[test]
    fn test_assemble_rejects_overlap_and_noncoding_defaults() {
        let err = assemble_transcript("tx".into(), "chr1".into(), Strand::Plus, vec![(10, 20), (15, 30)], None);
        assert!(err.is_err());

        let model = assemble_transcript("nc".into(), "chr1".into(), Strand::Plus, vec![(10, 20)], Some((20, 20)))
            .unwrap();
        assert_eq!((model.coding_offset, model.coding_end), (0, 10));
    }

    #[test]
    fn test_build_from_regions_and_mixed_strands() {
        let mut issues = Vec::new();
        let regions = vec![
            region("tx1", 0, 3, Strand::Plus, RegionKind::Exon),
            region("tx1", 4, 8, Strand::Plus, RegionKind::Exon),
            region("tx1", 1, 3, Strand::Plus, RegionKind::Coding),
            region("tx1", 4, 6, Strand::Plus, RegionKind::Coding),
            region("tx2", 20, 26, Strand::Minus, RegionKind::Coding),
        ];
        let models = build_transcripts_from_regions(regions, &mut issues).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "tx1");
        assert_eq!((models[0].coding_offset, models[0].coding_end), (1, 5));
        assert_eq!(models[1].size(), 6);
        assert_eq!(issues.len(), 1);

        let regions = vec![
            region("tx1", 0, 3, Strand::Plus, RegionKind::Exon),
            region("tx1", 4, 8, Strand::Minus, RegionKind::Exon),
        ];
        assert!(build_transcripts_from_regions(regions, &mut issues).is_err());
    }

    #[test]
    fn test_store_lookup_ignores_versions() {
        let mut issues = Vec::new();
        let a = assemble_transcript("NM_000546.6".into(), "chr17".into(), Strand::Minus, vec![(0, 10)], None).unwrap();
        let b = assemble_transcript("NM_007294".into(), "chr17".into(), Strand::Minus, vec![(0, 10)], None).unwrap();
        let dup = assemble_transcript("NM_007294".into(), "chrY".into(), Strand::Minus, vec![(0, 10)], None).unwrap();
        let store = TranscriptStore::new(vec![a, b, dup], &mut issues);

        assert_eq!(store.len(), 2);
        assert_eq!(issues.len(), 1);
        assert_eq!(store.lookup("NM_000546").unwrap().id, "NM_000546.6");
        assert_eq!(store.lookup("NM_000546.5").unwrap().id, "NM_000546.6");
        assert_eq!(store.lookup("NM_007294.4").unwrap().chromosome, "chr17");
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(issues[0].message.contains("keeping the first definition on chr17"));
        assert!(store.lookup("NM_999999").is_none());
    }
}
