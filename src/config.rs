//! Run configuration handed from the command line to the translator.

pub use crate::normalize::Justify;
pub use crate::structures::VariantStyle;

/// Default cap on allele length, keeps large rearrangements out of the output.
pub const DEFAULT_MAX_ALLELE_LENGTH: usize = 200;

/// Passthrough columns of a UMD mutation table.
pub const UMD_COLUMNS: [&str; 10] = [
    "Protein nomenclature",
    "cDNA Nomenclature",
    "Exon",
    "Codon",
    "Structure",
    "HCD",
    "Rearrangement",
    "Mutation type",
    "Mutational event",
    "# records",
];

pub const DEFAULT_DESCRIPTOR_COLUMN: &str = "cDNA Nomenclature";
pub const DEFAULT_REQUIRED_COLUMN: &str = "Protein nomenclature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub max_allele_length: usize,
    pub snp_only: bool,
}

impl Default for Filters {
    fn default() -> Self {
        Self { max_allele_length: DEFAULT_MAX_ALLELE_LENGTH, snp_only: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    /// Transcript prefixed to bare `c.` descriptors.
    pub transcript_id: String,
    pub filters: Filters,
    pub justify: Justify,
    pub style: VariantStyle,
    /// When false rows are passed through without translation.
    pub convert: bool,
    pub threads: usize,
}

impl ConverterConfig {
    pub fn new(transcript_id: impl Into<String>) -> Self {
        Self {
            transcript_id: transcript_id.into(),
            filters: Filters::default(),
            justify: Justify::default(),
            style: VariantStyle::default(),
            convert: true,
            threads: 1,
        }
    }

    pub fn snp_only(mut self, snp_only: bool) -> Self {
        self.filters.snp_only = snp_only;
        self
    }

    pub fn max_allele_length(mut self, max: usize) -> Self {
        self.filters.max_allele_length = max;
        self
    }

    pub fn justify(mut self, justify: Justify) -> Self {
        self.justify = justify;
        self
    }

    pub fn style(mut self, style: VariantStyle) -> Self {
        self.style = style;
        self
    }

    pub fn convert(mut self, convert: bool) -> Self {
        self.convert = convert;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }
}
