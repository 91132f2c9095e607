//! UCSC refGene / genePred tables.
//!
//! Columns: `[bin] name chrom strand txStart txEnd cdsStart cdsEnd exonCount exonStarts exonEnds ...`,
//! 0-based half-open, comma-terminated exon lists. The leading `bin` column of `refGene.txt`
//! is optional.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::Issue;
use crate::structures::{Strand, TranscriptModel};
use crate::transcript_builder::assemble_transcript;

fn parse_coordinate_list(field: &str) -> Result<Vec<u64>> {
    field
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<u64>().with_context(|| format!("bad coordinate '{s}'")))
        .collect()
}

/// Parses one table row into a transcript model. `Ok(None)` for rows that should be skipped.
pub fn parse_refgene_line(line: &str, issues: &mut Vec<Issue>) -> Result<Option<TranscriptModel>> {
    let cols: Vec<&str> = line.split('\t').collect();
    // Strand sits in column 3 when the bin column is present, in column 2 otherwise.
    let skip = match (cols.get(2), cols.get(3)) {
        (_, Some(&"+")) | (_, Some(&"-")) => 1,
        (Some(&"+"), _) | (Some(&"-"), _) => 0,
        _ => {
            issues.push(Issue::warning(format!(
                "Skipping refGene row without a strand column: {}",
                line.chars().take(60).collect::<String>()
            )));
            return Ok(None);
        }
    };
    let cols = &cols[skip..];
    if cols.len() < 10 {
        anyhow::bail!("refGene row has {} columns, expected at least 10", cols.len() + skip);
    }

    let name = cols[0].to_owned();
    let chromosome = cols[1].to_owned();
    let strand = match Strand::from_char(cols[2].chars().next().unwrap_or('.'), issues) {
        Some(strand) => strand,
        None => return Ok(None),
    };
    let number = |i: usize| -> Result<u64> {
        cols[i]
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Transcript {name}: bad number '{}'", cols[i]))
    };
    let cds_start = number(5)?;
    let cds_end = number(6)?;
    let exon_count = number(7)? as usize;
    let starts = parse_coordinate_list(cols[8]).with_context(|| format!("Transcript {name}: exonStarts"))?;
    let ends = parse_coordinate_list(cols[9]).with_context(|| format!("Transcript {name}: exonEnds"))?;

    if starts.len() != exon_count || ends.len() != exon_count {
        anyhow::bail!(
            "Transcript {} declares {} exons but lists {} starts and {} ends",
            name, exon_count, starts.len(), ends.len()
        );
    }

    let exons = starts.into_iter().zip(ends).collect();
    let model = assemble_transcript(name, chromosome, strand, exons, Some((cds_start, cds_end)))?;
    Ok(Some(model))
}

/// Reads every transcript of a refGene/genePred file.
pub fn parse_refgene(path: &Path, issues: &mut Vec<Issue>) -> Result<Vec<TranscriptModel>> {
    let reader = BufReader::new(File::open(path).with_context(|| format!("Cannot open {}", path.display()))?);
    let mut transcripts = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let parsed = parse_refgene_line(&line, issues)
            .with_context(|| format!("{}:{}", path.display(), line_no + 1))?;
        transcripts.extend(parsed);
    }

    Ok(transcripts)
}
