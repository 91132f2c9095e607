use thiserror::Error;

use crate::structures::GenomicInterval;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Fatal,
}

/// Diagnostic raised while loading annotation files. Warnings do not stop loading.
#[derive(Debug, Clone)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    pub fn warning(msg: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, message: msg.into() }
    }
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self { severity: Severity::Fatal, message: msg.into() }
    }
}

/// Failure converting a single variant row. None of these abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("sequence {region} not available: {reason}")]
    SequenceNotFound { region: GenomicInterval, reason: String },

    #[error("unknown transcript '{0}'")]
    UnknownTranscript(String),

    #[error("malformed descriptor '{descriptor}': {reason}")]
    MalformedDescriptor { descriptor: String, reason: String },

    #[error("position {position} lies outside transcript {transcript} (length {length})")]
    PositionOutsideTranscript { transcript: String, position: i64, length: u64 },

    #[error("reference mismatch at {chromosome}:{offset}: descriptor declares '{declared}', genome has '{found}'")]
    ReferenceMismatch { chromosome: String, offset: u64, declared: String, found: String },

    #[error("reference and alternate alleles are identical")]
    NullVariant,
}

impl ConvertError {
    pub(crate) fn malformed(descriptor: &str, reason: impl Into<String>) -> Self {
        ConvertError::MalformedDescriptor { descriptor: descriptor.to_string(), reason: reason.into() }
    }

    /// Stable name of the failure category, used in rejection reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ConvertError::SequenceNotFound { .. } => "SequenceNotFound",
            ConvertError::UnknownTranscript(_) => "UnknownTranscript",
            ConvertError::MalformedDescriptor { .. } => "MalformedDescriptor",
            ConvertError::PositionOutsideTranscript { .. } => "PositionOutsideTranscript",
            ConvertError::ReferenceMismatch { .. } => "ReferenceMismatch",
            ConvertError::NullVariant => "NullVariant",
        }
    }
}
