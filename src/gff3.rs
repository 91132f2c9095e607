use crate::error::Issue;
use crate::structures::{RegionKind, Strand, TranscriptRegion};
use anyhow::Context;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reads exon-like features (`feature_types`) and CDS features from a GFF3 file.
///
/// GFF3 is 1-based inclusive; the returned regions are 0-based half-open.
pub fn parse_gff3_to_regions(
    gff3_path: &Path,
    feature_types: &[String],
    issues: &mut Vec<Issue>,
) -> anyhow::Result<Vec<TranscriptRegion>> {
    let feature_set: HashSet<&str> = feature_types.iter().map(|s| s.as_str()).collect();
    let reader = BufReader::new(
        File::open(gff3_path).with_context(|| format!("Cannot open {}", gff3_path.display()))?,
    );
    let mut regions = Vec::new();

    let mut warn_missing_feature_parent = false;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.starts_with("##FASTA") {
            break;
        }
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }

        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != 9 {
            continue;
        }

        let feature_type = cols[2];
        let kind = if feature_type == "CDS" {
            RegionKind::Coding
        } else if feature_set.contains(feature_type) {
            RegionKind::Exon
        } else {
            continue;
        };

        let chromosome = cols[0].to_owned();
        let start = cols[3]
            .parse::<u64>()
            .with_context(|| format!("Line {}: bad start '{}'", line_no + 1, cols[3]))?;
        let end = cols[4]
            .parse::<u64>()
            .with_context(|| format!("Line {}: bad end '{}'", line_no + 1, cols[4]))?;
        if start == 0 || end < start {
            anyhow::bail!("Line {}: invalid feature span {}-{}", line_no + 1, start, end);
        }
        let strand_char = cols[6].chars().next().unwrap_or('.');

        let attributes = parse_attributes(cols[8]);

        let region_id = attributes
            .get("ID")
            .cloned()
            .unwrap_or_else(|| format!("{}:{}:{}-{}", feature_type, chromosome, start, end));

        let transcript_ids = if let Some(parent) = attributes.get("Parent") {
            // A CDS or exon shared by several isoforms lists them all.
            parent.split(',').map(|p| transcript_name(p.trim())).collect::<Vec<_>>()
        } else {
            if !warn_missing_feature_parent {
                issues.push(Issue::warning(
                    "Feature missing Parent attribute; using feature ID as transcript ID",
                ));
                warn_missing_feature_parent = true;
            }
            vec![transcript_name(&region_id)]
        };

        if let Some(strand) = Strand::from_char(strand_char, issues) {
            for transcript_id in transcript_ids {
                regions.push(TranscriptRegion {
                    chromosome: chromosome.clone(),
                    start: start - 1,
                    end,
                    region_id: region_id.clone(),
                    strand,
                    transcript_id,
                    kind,
                });
            }
        }
    }

    Ok(regions)
}

/// Strips the Ensembl `transcript:` and NCBI `rna-` ID prefixes.
fn transcript_name(id: &str) -> String {
    id.strip_prefix("transcript:")
        .or_else(|| id.strip_prefix("rna-"))
        .unwrap_or(id)
        .to_owned()
}

fn parse_attributes(attr_str: &str) -> HashMap<String, String> {
    attr_str
        .trim_end_matches(';')
        .split(';')
        .filter_map(|attr| attr.split_once('='))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Severity;
    use std::io::Write;

    #[test]
    fn test_parse_attributes_basic() {
        let attrs = parse_attributes("ID=exon1;Parent=tx1;");
        assert_eq!(attrs.get("ID"), Some(&"exon1".to_string()));
        assert_eq!(attrs.get("Parent"), Some(&"tx1".to_string()));
    }

    #[test]
    fn test_parse_gff3_to_regions_simple() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chr1	src	gene	1	10	.	+	.	ID=gene1;").unwrap();
        writeln!(file, "chr1	src	mRNA	1	10	.	+	.	ID=rna-NM_1.2;Parent=gene1;").unwrap();
        writeln!(file, "chr1	src	exon	1	5	.	+	.	ID=ex1;Parent=rna-NM_1.2;").unwrap();
        writeln!(file, "chr1	src	exon	6	10	.	+	.	ID=ex2;Parent=rna-NM_1.2;").unwrap();
        writeln!(file, "chr1	src	CDS	3	8	.	+	0	ID=cds1;Parent=rna-NM_1.2;").unwrap();
        let mut issues = Vec::new();
        let regions = parse_gff3_to_regions(file.path(), &["exon".to_string()], &mut issues).unwrap();
        assert!(issues.is_empty());
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].transcript_id, "NM_1.2");
        assert_eq!((regions[0].start, regions[0].end), (0, 5));
        assert_eq!(regions[2].kind, RegionKind::Coding);
        assert_eq!((regions[2].start, regions[2].end), (2, 8));
    }

    #[test]
    fn test_missing_parents_and_shared_features() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chr1\tsrc\texon\t1\t5\t.\t+\t.\tID=ex1;Parent=transcript:tx1,transcript:tx2").unwrap();
        writeln!(file, "chr1\tsrc\texon\t6\t10\t.\t+\t.\tID=ex2").unwrap();
        writeln!(file, "chr1\tsrc\texon\t12\t14\t.\t?\t.\tID=ex3;Parent=tx1").unwrap();
        let mut issues = Vec::new();
        let regions = parse_gff3_to_regions(file.path(), &["exon".to_string()], &mut issues).unwrap();
        assert_eq!(regions.len(), 3);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|e| matches!(e.severity, Severity::Warning)));
        assert_eq!(regions[0].transcript_id, "tx1");
        assert_eq!(regions[1].transcript_id, "tx2");
        assert_eq!(regions[2].transcript_id, "ex2");
    }
}
