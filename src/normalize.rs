//! Allele normalization on the genome forward strand.
//!
//! All offsets are 0-based. A normalized pair has no shared leading or trailing bases; pure
//! insertions and deletions inside repeats are then moved to the left-most (default) or
//! right-most equivalent position, so every representation of the same change ends up at a
//! single deterministic offset.

use bio::alphabets::dna;
use log::debug;

use crate::error::ConvertError;
use crate::genome::SequenceProvider;
use crate::structures::{GenomicInterval, Strand};

/// Bases fetched per step while walking through a repeat.
const SHIFT_WINDOW: u64 = 64;

/// Direction in which indels are moved through repeats, relative to the genome forward strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Justify {
    /// Towards lower coordinates (VCF convention).
    #[default]
    Left,
    /// Towards higher coordinates.
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alleles {
    pub offset: u64,
    pub reference: Vec<u8>,
    pub alternate: Vec<u8>,
}

impl Alleles {
    pub fn new(offset: u64, reference: &[u8], alternate: &[u8]) -> Self {
        Self { offset, reference: reference.to_vec(), alternate: alternate.to_vec() }
    }

    fn is_indel(&self) -> bool {
        self.reference.is_empty() != self.alternate.is_empty()
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    dna::revcomp(seq)
}

/// Bases given in transcript orientation, as they read on the genome forward strand.
pub fn orient(seq: &[u8], strand: Strand) -> Vec<u8> {
    match strand {
        Strand::Plus => seq.to_vec(),
        Strand::Minus => reverse_complement(seq),
    }
}

/// Strips shared trailing bases, then shared leading bases, moving the offset past the latter.
pub fn trim(mut alleles: Alleles) -> Alleles {
    while !alleles.reference.is_empty()
        && !alleles.alternate.is_empty()
        && alleles.reference.last() == alleles.alternate.last()
    {
        alleles.reference.pop();
        alleles.alternate.pop();
    }

    let prefix = alleles
        .reference
        .iter()
        .zip(alleles.alternate.iter())
        .take_while(|(r, a)| r == a)
        .count();
    alleles.reference.drain(..prefix);
    alleles.alternate.drain(..prefix);
    alleles.offset += prefix as u64;
    alleles
}

fn contig_length<G: SequenceProvider + ?Sized>(genome: &G, chromosome: &str, offset: u64) -> Result<u64, ConvertError> {
    genome.contig_length(chromosome).ok_or_else(|| ConvertError::SequenceNotFound {
        region: GenomicInterval::new(chromosome, offset, offset),
        reason: "unknown contig".into(),
    })
}

/// Moves an indel through the surrounding repeat. Substitutions and complex pairs are returned
/// unchanged. Expects trimmed alleles.
pub fn justify<G: SequenceProvider + ?Sized>(
    genome: &G,
    chromosome: &str,
    alleles: Alleles,
    direction: Justify,
) -> Result<Alleles, ConvertError> {
    if !alleles.is_indel() {
        return Ok(alleles);
    }

    let Alleles { mut offset, mut reference, mut alternate } = alleles;
    let deletion = !reference.is_empty();
    let span = reference.len() as u64;
    let allele = if deletion { &mut reference } else { &mut alternate };
    let original = offset;

    match direction {
        Justify::Left => {
            'walk: while offset > 0 {
                let from = offset.saturating_sub(SHIFT_WINDOW);
                let upstream = genome.fetch(chromosome, from, offset)?;
                for &base in upstream.iter().rev() {
                    if base == b'N' || allele.last() != Some(&base) {
                        break 'walk;
                    }
                    allele.rotate_right(1);
                    offset -= 1;
                }
            }
        }
        Justify::Right => {
            let length = contig_length(genome, chromosome, offset)?;
            'walk: while offset + span < length {
                let from = offset + span;
                let downstream = genome.fetch(chromosome, from, (from + SHIFT_WINDOW).min(length))?;
                for &base in &downstream {
                    if base == b'N' || allele.first() != Some(&base) {
                        break 'walk;
                    }
                    allele.rotate_left(1);
                    offset += 1;
                }
            }
        }
    }

    if offset != original {
        debug!("Shifted indel on {} from {} to {}", chromosome, original, offset);
    }
    Ok(Alleles { offset, reference, alternate })
}

/// VCF representation: 1-based position, indels anchored on the preceding base (or the following
/// base when the event starts the contig).
pub fn anchor_vcf<G: SequenceProvider + ?Sized>(
    genome: &G,
    chromosome: &str,
    alleles: Alleles,
) -> Result<Alleles, ConvertError> {
    let Alleles { offset, mut reference, mut alternate } = alleles;
    if !reference.is_empty() && !alternate.is_empty() {
        return Ok(Alleles { offset: offset + 1, reference, alternate });
    }

    if offset > 0 {
        let base = genome.fetch(chromosome, offset - 1, offset)?;
        reference.splice(0..0, base.iter().copied());
        alternate.splice(0..0, base.iter().copied());
        Ok(Alleles { offset, reference, alternate })
    } else {
        let after = reference.len() as u64;
        let base = genome.fetch(chromosome, after, after + 1)?;
        reference.extend_from_slice(&base);
        alternate.extend_from_slice(&base);
        Ok(Alleles { offset: 1, reference, alternate })
    }
}
