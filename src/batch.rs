//! Row-by-row translation of a variant table.
//!
//! Every row ends up exactly once in either [`BatchResult::records`] or
//! [`BatchResult::rejected`], in input order. A failing row never stops the batch.

use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::{ConverterConfig, Filters};
use crate::error::ConvertError;
use crate::genome::SequenceProvider;
use crate::hgvs;
use crate::mapper;
use crate::structures::GenomicVariant;
use crate::transcript_builder::TranscriptStore;

/// Passthrough columns of one input row, in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationRow {
    columns: Vec<(String, String)>,
}

impl AnnotationRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.columns.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AnnotationRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { columns: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

/// Input row: the variant notation cell plus the columns carried to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRow {
    pub descriptor: String,
    pub annotations: AnnotationRow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason {
    AlleleTooLong { length: usize, max: usize },
    NotSnv,
    IdenticalAlleles,
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::AlleleTooLong { length, max } => {
                write!(f, "allele of {length} bases exceeds the limit of {max}")
            }
            FilterReason::NotSnv => write!(f, "not a single-nucleotide variant"),
            FilterReason::IdenticalAlleles => write!(f, "reference equals alternate"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Failed(ConvertError),
    Filtered(FilterReason),
}

impl Rejection {
    pub fn status(&self) -> &'static str {
        match self {
            Rejection::Failed(err) => err.kind(),
            Rejection::Filtered(_) => "Filtered",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Failed(err) => write!(f, "{err}"),
            Rejection::Filtered(reason) => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedRecord {
    pub row_index: usize,
    pub variant: GenomicVariant,
    pub annotations: AnnotationRow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub row_index: usize,
    pub descriptor: String,
    pub reason: Rejection,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub records: Vec<TranslatedRecord>,
    pub rejected: Vec<RejectedRow>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.records.len() + self.rejected.len()
    }

    pub fn failed(&self) -> usize {
        self.rejected.iter().filter(|r| matches!(r.reason, Rejection::Failed(_))).count()
    }

    pub fn filtered(&self) -> usize {
        self.rejected.iter().filter(|r| matches!(r.reason, Rejection::Filtered(_))).count()
    }
}

/// Applies the length, SNV and identity filters, in that order.
pub fn apply_filters(variant: &GenomicVariant, filters: &Filters) -> Result<(), FilterReason> {
    let length = variant.reference.len().max(variant.alternate.len());
    if length > filters.max_allele_length {
        return Err(FilterReason::AlleleTooLong { length, max: filters.max_allele_length });
    }
    if filters.snp_only && !variant.is_snv() {
        return Err(FilterReason::NotSnv);
    }
    if variant.reference == variant.alternate {
        return Err(FilterReason::IdenticalAlleles);
    }
    Ok(())
}

/// Full descriptor for a table cell: bare `c.`/`n.` notations get `transcript_id` prepended.
pub fn descriptor_for(transcript_id: &str, cell: &str) -> String {
    let cell = cell.trim();
    if cell.contains(':') {
        cell.to_string()
    } else {
        format!("{transcript_id}:{cell}")
    }
}

pub struct Translator<'a, G: ?Sized> {
    store: &'a TranscriptStore,
    genome: &'a G,
    config: &'a ConverterConfig,
}

impl<'a, G: SequenceProvider + ?Sized> Translator<'a, G> {
    pub fn new(store: &'a TranscriptStore, genome: &'a G, config: &'a ConverterConfig) -> Self {
        Self { store, genome, config }
    }

    /// Parses, maps and styles one full descriptor.
    pub fn convert(&self, descriptor: &str) -> Result<GenomicVariant, ConvertError> {
        let edit = hgvs::parse(descriptor, |id| self.store.lookup(id))?;
        let model = self
            .store
            .lookup(&edit.transcript_id)
            .ok_or_else(|| ConvertError::UnknownTranscript(edit.transcript_id.clone()))?;
        let variant = mapper::map(&edit, model, self.genome, self.config.justify)?;
        mapper::apply_style(variant, self.config.style, self.genome)
    }

    fn process(&self, row: &VariantRow) -> (String, Result<GenomicVariant, Rejection>) {
        let descriptor = descriptor_for(&self.config.transcript_id, &row.descriptor);
        let outcome = self
            .convert(&descriptor)
            .map_err(Rejection::Failed)
            .and_then(|variant| {
                apply_filters(&variant, &self.config.filters).map_err(Rejection::Filtered)?;
                Ok(variant)
            });
        (descriptor, outcome)
    }

    fn collect(
        rows: &[VariantRow],
        outcomes: Vec<(String, Result<GenomicVariant, Rejection>)>,
        started: Instant,
    ) -> BatchResult {
        let mut result = BatchResult::default();
        for (row_index, (row, (descriptor, outcome))) in rows.iter().zip(outcomes).enumerate() {
            match outcome {
                Ok(variant) => result.records.push(TranslatedRecord {
                    row_index,
                    variant,
                    annotations: row.annotations.clone(),
                }),
                Err(reason) => {
                    match &reason {
                        Rejection::Failed(err) => {
                            warn!("Row {}: {} failed [{}]: {}", row_index, descriptor, err.kind(), err)
                        }
                        Rejection::Filtered(why) => debug!("Row {}: {} filtered: {}", row_index, descriptor, why),
                    }
                    result.rejected.push(RejectedRow { row_index, descriptor, reason });
                }
            }
        }
        info!(
            "Translated {} of {} rows ({} failed, {} filtered) in {:.2?}",
            result.records.len(),
            result.total(),
            result.failed(),
            result.filtered(),
            started.elapsed()
        );
        result
    }

    pub fn translate(&self, rows: &[VariantRow]) -> BatchResult {
        let started = Instant::now();
        let outcomes = rows.iter().map(|row| self.process(row)).collect();
        Self::collect(rows, outcomes, started)
    }
}

impl<'a, G: SequenceProvider + Sync + ?Sized> Translator<'a, G> {
    /// Same result as [`Translator::translate`], rows processed on the rayon pool.
    pub fn translate_parallel(&self, rows: &[VariantRow]) -> BatchResult {
        let started = Instant::now();
        let outcomes = rows.par_iter().map(|row| self.process(row)).collect();
        Self::collect(rows, outcomes, started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Issue;
    use crate::genome::InMemoryGenome;
    use crate::structures::{Strand, VariantStyle};
    use crate::transcript_builder::assemble_transcript;

    fn store() -> TranscriptStore {
        let model = assemble_transcript("NM_0001".into(), "chr1".into(), Strand::Plus, vec![(1000, 1100)], None)
            .unwrap();
        // chrZ is absent from the test genome
        let unplaced = assemble_transcript("NM_0003".into(), "chrZ".into(), Strand::Plus, vec![(0, 10)], None)
            .unwrap();
        let mut issues: Vec<Issue> = Vec::new();
        TranscriptStore::new(vec![model, unplaced], &mut issues)
    }

    fn genome() -> InMemoryGenome {
        let mut chr1: Vec<u8> = b"ACGT".iter().cycle().take(1200).copied().collect();
        chr1[1049] = b'A';
        chr1[1060..1064].copy_from_slice(b"GGGG");
        InMemoryGenome::from_sequences([("chr1", std::str::from_utf8(&chr1).unwrap())])
    }

    fn row(cell: &str, tag: &str) -> VariantRow {
        VariantRow {
            descriptor: cell.to_string(),
            annotations: [("Protein nomenclature", tag), ("cDNA Nomenclature", cell)].into_iter().collect(),
        }
    }

    fn rows() -> Vec<VariantRow> {
        vec![
            row("c.50A>G", "p.1"),
            row("c.50C>G", "p.2"),
            row("c.62delG", "p.3"),
            row("garbage", "p.4"),
            row("NM_0001:c.5000A>G", "p.5"),
            row("NM_0009:c.5A>G", "p.6"),
            row("c.61_62insTTT", "p.7"),
        ]
    }

    #[test]
    fn test_descriptor_for() {
        assert_eq!(descriptor_for("NM_1", " c.5A>G "), "NM_1:c.5A>G");
        assert_eq!(descriptor_for("NM_1", "NM_2:c.5A>G"), "NM_2:c.5A>G");
    }

    #[test]
    fn test_filters_in_order() {
        let filters = Filters { max_allele_length: 2, snp_only: true };
        let v = |r: &str, a: &str| GenomicVariant {
            chromosome: "chr1".into(),
            offset: 0,
            reference: r.into(),
            alternate: a.into(),
        };
        assert_eq!(
            apply_filters(&v("ACG", ""), &filters),
            Err(FilterReason::AlleleTooLong { length: 3, max: 2 })
        );
        assert_eq!(apply_filters(&v("AC", "A"), &filters), Err(FilterReason::NotSnv));
        assert_eq!(apply_filters(&v("A", "A"), &filters), Err(FilterReason::IdenticalAlleles));
        assert_eq!(apply_filters(&v("A", "G"), &filters), Ok(()));
    }

    #[test]
    fn test_translate_keeps_order_and_accounts_for_every_row() {
        let store = store();
        let genome = genome();
        let config = ConverterConfig::new("NM_0001");
        let result = Translator::new(&store, &genome, &config).translate(&rows());

        assert_eq!(result.total(), 7);
        let kept: Vec<usize> = result.records.iter().map(|r| r.row_index).collect();
        assert_eq!(kept, vec![0, 2, 6]);
        assert_eq!(result.records[0].variant.offset, 1049);
        assert_eq!(result.records[0].annotations.get("Protein nomenclature"), Some("p.1"));
        assert_eq!(result.records[1].variant.offset, 1060);

        let statuses: Vec<(usize, &str)> =
            result.rejected.iter().map(|r| (r.row_index, r.reason.status())).collect();
        assert_eq!(
            statuses,
            vec![
                (1, "ReferenceMismatch"),
                (3, "MalformedDescriptor"),
                (4, "PositionOutsideTranscript"),
                (5, "UnknownTranscript"),
            ]
        );
        assert_eq!(result.rejected[1].descriptor, "NM_0001:garbage");
    }

    #[test]
    fn test_snp_only_and_length_filters() {
        let store = store();
        let genome = genome();
        let config = ConverterConfig::new("NM_0001").snp_only(true);
        let result = Translator::new(&store, &genome, &config).translate(&rows());
        assert_eq!(result.records.len(), 1);
        assert!(result.records.iter().all(|r| r.variant.is_snv()));
        assert_eq!(result.filtered(), 2);

        let config = ConverterConfig::new("NM_0001").max_allele_length(2);
        let result = Translator::new(&store, &genome, &config).translate(&rows());
        assert_eq!(result.records.len(), 2);
        assert_eq!(
            result.rejected.iter().find(|r| r.row_index == 6).map(|r| &r.reason),
            Some(&Rejection::Filtered(FilterReason::AlleleTooLong { length: 3, max: 2 }))
        );
    }

    #[test]
    fn test_vcf_style_is_filtered_on_anchored_alleles() {
        let store = store();
        let genome = genome();
        let config = ConverterConfig::new("NM_0001").style(VariantStyle::Vcf).max_allele_length(3);
        let result = Translator::new(&store, &genome, &config).translate(&rows());
        let kept: Vec<usize> = result.records.iter().map(|r| r.row_index).collect();
        // the anchored TTT insertion is four bases long
        assert_eq!(kept, vec![0, 2]);
        assert_eq!(result.records[0].variant.offset, 1050);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let store = store();
        let genome = genome();
        let config = ConverterConfig::new("NM_0001").threads(4);
        let translator = Translator::new(&store, &genome, &config);
        let rows: Vec<VariantRow> = rows().into_iter().cycle().take(70).collect();
        let sequential = translator.translate(&rows);
        let parallel = translator.translate_parallel(&rows);
        assert_eq!(sequential.records, parallel.records);
        assert_eq!(sequential.rejected, parallel.rejected);
    }

    #[test]
    fn test_sequence_and_overflow_failures_do_not_stop_the_batch() {
        let store = store();
        let genome = genome();
        let config = ConverterConfig::new("NM_0001");
        let rows = vec![
            row("c.50A>G", "p.1"),
            row("NM_0003:c.1A>G", "p.2"),
            row("c.9223372036854775807A>G", "p.3"),
            row("c.*9223372036854775807A>G", "p.4"),
            row("c.62delG", "p.5"),
        ];
        let result = Translator::new(&store, &genome, &config).translate(&rows);

        assert_eq!(result.total(), 5);
        let kept: Vec<usize> = result.records.iter().map(|r| r.row_index).collect();
        assert_eq!(kept, vec![0, 4]);
        let statuses: Vec<(usize, &str)> =
            result.rejected.iter().map(|r| (r.row_index, r.reason.status())).collect();
        assert_eq!(
            statuses,
            vec![(1, "SequenceNotFound"), (2, "MalformedDescriptor"), (3, "MalformedDescriptor")]
        );
    }
}
