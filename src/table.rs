//! Delimited row source and report sinks for the command-line tool.

use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::batch::{AnnotationRow, RejectedRow, TranslatedRecord, VariantRow};

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    }
}

/// Reads variant rows from a header-bearing table (tab separated, or comma separated for `.csv`).
///
/// `columns` are copied into each row's annotations in the given order; columns missing from the
/// header are reported once and carried as empty values. Rows whose `require_column` cell is
/// empty are dropped.
pub fn read_rows(
    path: &Path,
    descriptor_column: &str,
    columns: &[String],
    require_column: Option<&str>,
) -> Result<Vec<VariantRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Cannot open variant table {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h.trim() == name);

    let descriptor_index = position(descriptor_column).with_context(|| {
        format!("Column '{}' not found in {}", descriptor_column, path.display())
    })?;
    let required_index = match require_column {
        Some(name) => Some(
            position(name).with_context(|| format!("Column '{}' not found in {}", name, path.display()))?,
        ),
        None => None,
    };
    let column_indices: Vec<Option<usize>> = columns
        .iter()
        .map(|name| {
            let index = position(name);
            if index.is_none() {
                warn!("Column '{}' not present in {}, written empty", name, path.display());
            }
            index
        })
        .collect();

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        let cell = |index: Option<usize>| index.and_then(|i| record.get(i)).unwrap_or("").trim();

        if required_index.is_some() && cell(required_index).is_empty() {
            dropped += 1;
            continue;
        }

        let annotations: AnnotationRow = columns
            .iter()
            .zip(&column_indices)
            .map(|(name, index)| (name.as_str(), cell(*index)))
            .collect();
        rows.push(VariantRow { descriptor: cell(Some(descriptor_index)).to_string(), annotations });
    }

    info!("Read {} rows from {} ({} without required value dropped)", rows.len(), path.display(), dropped);
    Ok(rows)
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("Cannot create {}", path.display()))
}

/// Writes `chrom, offset, ref, alt` followed by the passthrough columns.
pub fn write_records(path: &Path, records: &[TranslatedRecord], columns: &[String]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    let mut header = vec!["chrom", "offset", "ref", "alt"];
    header.extend(columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    for record in records {
        let variant = &record.variant;
        let offset = variant.offset.to_string();
        let mut line = vec![
            variant.chromosome.as_str(),
            offset.as_str(),
            variant.reference.as_str(),
            variant.alternate.as_str(),
        ];
        line.extend(columns.iter().map(|c| record.annotations.get(c).unwrap_or("")));
        writer.write_record(&line)?;
    }
    writer.flush()?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Writes the passthrough columns only, used when conversion is switched off.
pub fn write_passthrough(path: &Path, rows: &[VariantRow], columns: &[String]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(columns.iter().map(|c| row.annotations.get(c).unwrap_or("")))?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

pub fn write_rejections(path: &Path, rejected: &[RejectedRow]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(["row", "descriptor", "status", "reason"])?;
    for row in rejected {
        writer.write_record([
            row.row_index.to_string(),
            row.descriptor.clone(),
            row.reason.status().to_string(),
            row.reason.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{FilterReason, Rejection};
    use crate::error::ConvertError;
    use crate::structures::GenomicVariant;
    use std::fs;
    use tempfile::tempdir;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_read_rows_drops_rows_without_required_value() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("rows.tsv");
        fs::write(
            &path,
            "Protein nomenclature\tcDNA Nomenclature\tExon\n\
             p.R175H\tc.524G>A\t5\n\
             \tc.1A>G\t1\n\
             p.R248Q\tc.743G>A\n",
        )?;

        let cols = columns(&["Protein nomenclature", "Exon", "Codon"]);
        let rows = read_rows(&path, "cDNA Nomenclature", &cols, Some("Protein nomenclature"))?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].descriptor, "c.524G>A");
        assert_eq!(rows[0].annotations.get("Exon"), Some("5"));
        assert_eq!(rows[0].annotations.get("Codon"), Some(""));
        assert_eq!(rows[1].annotations.get("Exon"), Some(""));

        let all = read_rows(&path, "cDNA Nomenclature", &cols, None)?;
        assert_eq!(all.len(), 3);
        Ok(())
    }

    #[test]
    fn test_read_rows_csv_and_missing_descriptor_column() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("rows.csv");
        fs::write(&path, "variant,note\nc.5A>G,x\n")?;
        let rows = read_rows(&path, "variant", &columns(&["note"]), None)?;
        assert_eq!(rows[0].descriptor, "c.5A>G");
        assert_eq!(rows[0].annotations.get("note"), Some("x"));

        assert!(read_rows(&path, "cDNA Nomenclature", &[], None).is_err());
        Ok(())
    }

    #[test]
    fn test_write_records_and_rejections() -> Result<()> {
        let dir = tempdir()?;
        let cols = columns(&["Protein nomenclature"]);
        let records = vec![TranslatedRecord {
            row_index: 0,
            variant: GenomicVariant {
                chromosome: "chr17".into(),
                offset: 7675087,
                reference: "C".into(),
                alternate: "T".into(),
            },
            annotations: [("Protein nomenclature", "p.R175H")].into_iter().collect(),
        }];
        let out = dir.path().join("result.tsv");
        write_records(&out, &records, &cols)?;
        assert_eq!(
            fs::read_to_string(&out)?,
            "chrom\toffset\tref\talt\tProtein nomenclature\nchr17\t7675087\tC\tT\tp.R175H\n"
        );

        let rejected = vec![
            RejectedRow {
                row_index: 1,
                descriptor: "NM_1:c.5Q>G".into(),
                reason: Rejection::Failed(ConvertError::UnknownTranscript("NM_1".into())),
            },
            RejectedRow {
                row_index: 2,
                descriptor: "NM_1:c.5del".into(),
                reason: Rejection::Filtered(FilterReason::NotSnv),
            },
        ];
        let failures = dir.path().join("failures.tsv");
        write_rejections(&failures, &rejected)?;
        let text = fs::read_to_string(&failures)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "row\tdescriptor\tstatus\treason");
        assert!(lines[1].starts_with("1\tNM_1:c.5Q>G\tUnknownTranscript\t"));
        assert_eq!(lines[2], "2\tNM_1:c.5del\tFiltered\tnot a single-nucleotide variant");
        Ok(())
    }

    #[test]
    fn test_write_passthrough() -> Result<()> {
        let dir = tempdir()?;
        let cols = columns(&["Exon", "Codon"]);
        let rows = vec![VariantRow {
            descriptor: "c.1A>G".into(),
            annotations: [("Exon", "1"), ("Codon", "1")].into_iter().collect(),
        }];
        let out = dir.path().join("plain.tsv");
        write_passthrough(&out, &rows, &cols)?;
        assert_eq!(fs::read_to_string(&out)?, "Exon\tCodon\n1\t1\n");
        Ok(())
    }
}
