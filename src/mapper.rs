//! Transcript-to-genome coordinate mapping.

use crate::error::ConvertError;
use crate::genome::SequenceProvider;
use crate::hgvs::{EditKind, VariantEdit};
use crate::normalize::{self, Alleles, Justify};
use crate::structures::{GenomicVariant, Strand, TranscriptModel, VariantStyle};

fn to_string(bases: &[u8]) -> String {
    String::from_utf8_lossy(bases).into_owned()
}

/// Maps a parsed edit onto the genome and normalizes it.
///
/// The declared reference bases are checked against the genome; alleles come back in
/// forward-strand orientation with a 0-based offset and no shared flanking bases.
pub fn map<G: SequenceProvider + ?Sized>(
    edit: &VariantEdit,
    model: &TranscriptModel,
    genome: &G,
    justify: Justify,
) -> Result<GenomicVariant, ConvertError> {
    let outside = |position: i64| ConvertError::PositionOutsideTranscript {
        transcript: model.id.clone(),
        position,
        length: model.size(),
    };
    let first = model
        .genomic_position(edit.transcript_position)
        .ok_or_else(|| outside(edit.transcript_position))?;
    let last = model
        .genomic_position(edit.transcript_end)
        .ok_or_else(|| outside(edit.transcript_end))?;

    let (start, end) = if edit.kind == EditKind::Insertion {
        // new bases follow the first flanking base in transcript orientation
        let point = match model.strand {
            Strand::Plus => first + 1,
            Strand::Minus => first,
        };
        (point, point)
    } else {
        (first.min(last), first.max(last) + 1)
    };

    let reference = genome.fetch(&model.chromosome, start, end)?;
    if let Some(declared) = &edit.ref_allele {
        let declared = normalize::orient(declared, model.strand);
        if declared != reference {
            return Err(ConvertError::ReferenceMismatch {
                chromosome: model.chromosome.clone(),
                offset: start,
                declared: to_string(&declared),
                found: to_string(&reference),
            });
        }
    }

    let alternate = match edit.kind {
        EditKind::Duplication => [reference.as_slice(), reference.as_slice()].concat(),
        EditKind::Identity => reference.clone(),
        _ => normalize::orient(&edit.alt_allele, model.strand),
    };
    if reference == alternate {
        return Err(ConvertError::NullVariant);
    }

    let trimmed = normalize::trim(Alleles { offset: start, reference, alternate });
    if trimmed.reference == trimmed.alternate {
        return Err(ConvertError::NullVariant);
    }
    let normalized = normalize::justify(genome, &model.chromosome, trimmed, justify)?;

    Ok(GenomicVariant {
        chromosome: model.chromosome.clone(),
        offset: normalized.offset,
        reference: to_string(&normalized.reference),
        alternate: to_string(&normalized.alternate),
    })
}

/// Converts a minimal record from [`map`] into the requested output convention.
pub fn apply_style<G: SequenceProvider + ?Sized>(
    variant: GenomicVariant,
    style: VariantStyle,
    genome: &G,
) -> Result<GenomicVariant, ConvertError> {
    match style {
        VariantStyle::Minimal => Ok(variant),
        VariantStyle::Vcf => {
            let anchored = normalize::anchor_vcf(
                genome,
                &variant.chromosome,
                Alleles::new(variant.offset, variant.reference.as_bytes(), variant.alternate.as_bytes()),
            )?;
            Ok(GenomicVariant {
                chromosome: variant.chromosome,
                offset: anchored.offset,
                reference: to_string(&anchored.reference),
                alternate: to_string(&anchored.alternate),
            })
        }
    }
}

/// Writes a minimal single-base substitution back as a `c.` descriptor on `model`.
/// `None` for other variant types or positions outside the exons.
pub fn describe_substitution(variant: &GenomicVariant, model: &TranscriptModel) -> Option<String> {
    if !variant.is_snv() || variant.chromosome != model.chromosome {
        return None;
    }
    let tx = model.transcript_position(variant.offset)?;
    let coding_offset = model.coding_offset as i64;
    let coding_end = model.coding_end as i64;
    let position = if tx <= coding_offset {
        format!("-{}", coding_offset - tx + 1)
    } else if tx > coding_end {
        format!("*{}", tx - coding_end)
    } else {
        (tx - coding_offset).to_string()
    };
    let reference = normalize::orient(variant.reference.as_bytes(), model.strand);
    let alternate = normalize::orient(variant.alternate.as_bytes(), model.strand);
    Some(format!(
        "{}:c.{}{}>{}",
        model.id,
        position,
        to_string(&reference),
        to_string(&alternate)
    ))
}
