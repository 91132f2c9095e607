use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::{error, info, warn};

use cdnalift::batch::Translator;
use cdnalift::config::{
    ConverterConfig, DEFAULT_DESCRIPTOR_COLUMN, DEFAULT_MAX_ALLELE_LENGTH, DEFAULT_REQUIRED_COLUMN, Justify,
    UMD_COLUMNS, VariantStyle,
};
use cdnalift::error::{Issue, Severity};
use cdnalift::genome::open_genome;
use cdnalift::table::{read_rows, write_passthrough, write_records, write_rejections};
use cdnalift::transcript_builder::TranscriptStore;

fn command() -> Command {
    Command::new("cdnalift")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Translate cDNA variant descriptions from a mutation table into normalized genomic variants.")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("TABLE")
                .help("Variant table (tab separated, or comma separated for .csv)")
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("ts")
                .short('t')
                .long("ts")
                .value_name("TRANSCRIPT")
                .help("Transcript id prefixed to bare c. descriptors, e.g. NM_000546.5"),
        )
        .arg(
            Arg::new("ref")
                .short('r')
                .long("ref")
                .value_name("GENOME_FASTA")
                .help("Genome FASTA; a .fai index next to it enables random access")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("gene")
                .short('g')
                .long("gene")
                .value_name("ANNOTATION")
                .help("Transcript models: refGene/genePred table, or GFF3 (.gff3/.gff)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("convert")
                .short('c')
                .long("convert")
                .help("Translate descriptors to genomic variants; otherwise only copy the columns")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("snp")
                .short('s')
                .long("snp")
                .help("Keep single-nucleotide variants only")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-len")
                .short('m')
                .long("max-len")
                .value_name("BASES")
                .help("Longest reference or alternate allele kept (default 200)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT_TSV")
                .value_parser(value_parser!(PathBuf))
                .default_value("./result.tsv"),
        )
        .arg(
            Arg::new("failures")
                .long("failures")
                .value_name("REPORT_TSV")
                .help("Write rows that failed or were filtered, with the reason")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("justify")
                .long("justify")
                .help("Direction indels are shifted within repeats, on the genome forward strand")
                .value_parser(["left", "right"])
                .default_value("left"),
        )
        .arg(
            Arg::new("vcf")
                .long("vcf")
                .help("1-based positions with anchored indel alleles")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("columns")
                .long("columns")
                .value_name("COLUMNS")
                .help("Passthrough columns, comma-separated (defaults to the UMD table columns)"),
        )
        .arg(
            Arg::new("descriptor-column")
                .long("descriptor-column")
                .value_name("COLUMN")
                .default_value(DEFAULT_DESCRIPTOR_COLUMN),
        )
        .arg(
            Arg::new("require-column")
                .long("require-column")
                .value_name("COLUMN")
                .help("Rows with an empty value in this column are skipped; pass an empty string to keep all")
                .default_value(DEFAULT_REQUIRED_COLUMN),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging")
                .action(ArgAction::SetTrue),
        )
        .arg_required_else_help(true)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn report_issues(issues: &[Issue]) -> Result<()> {
    for issue in issues {
        match issue.severity {
            Severity::Warning => warn!("{}", issue.message),
            Severity::Fatal => error!("{}", issue.message),
        }
    }
    if issues.iter().any(|i| i.severity == Severity::Fatal) {
        anyhow::bail!("Annotation could not be loaded");
    }
    Ok(())
}

fn required<'a, T: Clone + Send + Sync + 'static>(matches: &'a ArgMatches, name: &str) -> Result<&'a T> {
    matches
        .get_one::<T>(name)
        .with_context(|| format!("missing value for --{}", name))
}

fn build_config(matches: &ArgMatches) -> Result<ConverterConfig> {
    let justify = match matches.get_one::<String>("justify").map(String::as_str) {
        Some("right") => Justify::Right,
        _ => Justify::Left,
    };
    let style = if matches.get_flag("vcf") { VariantStyle::Vcf } else { VariantStyle::Minimal };
    let transcript_id = matches.get_one::<String>("ts").cloned().unwrap_or_default();
    Ok(ConverterConfig::new(transcript_id)
        .convert(matches.get_flag("convert"))
        .snp_only(matches.get_flag("snp"))
        .max_allele_length(matches.get_one::<usize>("max-len").copied().unwrap_or(DEFAULT_MAX_ALLELE_LENGTH))
        .justify(justify)
        .style(style)
        .threads(*required::<usize>(matches, "threads")?))
}

fn run_conversion(matches: &ArgMatches, config: &ConverterConfig, input: &Path, columns: &[String]) -> Result<()> {
    if config.transcript_id.is_empty() {
        anyhow::bail!("--ts is required when converting");
    }
    let genome_path: &PathBuf = required(matches, "ref")?;
    let gene_path: &PathBuf = required(matches, "gene")?;

    let mut issues = Vec::new();
    let store = TranscriptStore::from_path(gene_path, &mut issues)?;
    report_issues(&issues)?;
    if store.lookup(&config.transcript_id).is_none() {
        warn!("Transcript {} is not in {}", config.transcript_id, gene_path.display());
    }
    let genome = open_genome(genome_path, config.threads)?;

    let rows = read_rows(input, descriptor_column(matches)?, columns, require_column(matches))?;
    let translator = Translator::new(&store, &*genome, config);
    let result = if config.threads > 1 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build_global()
            .context("Cannot start worker threads")?;
        info!("Translating on {} threads", config.threads);
        translator.translate_parallel(&rows)
    } else {
        translator.translate(&rows)
    };

    let output: &PathBuf = required(matches, "output")?;
    write_records(output, &result.records, columns)?;
    if let Some(failures) = matches.get_one::<PathBuf>("failures") {
        write_rejections(failures, &result.rejected)?;
    }
    Ok(())
}

fn descriptor_column(matches: &ArgMatches) -> Result<&str> {
    required::<String>(matches, "descriptor-column").map(String::as_str)
}

fn require_column(matches: &ArgMatches) -> Option<&str> {
    matches
        .get_one::<String>("require-column")
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn main() -> Result<()> {
    let matches = command().get_matches();
    init_logging(matches.get_flag("verbose"));

    let input: &PathBuf = required(&matches, "input")?;
    let columns: Vec<String> = match matches.get_one::<String>("columns") {
        Some(list) => list.split(',').map(|item| item.trim().to_string()).collect(),
        None => UMD_COLUMNS.iter().map(|c| c.to_string()).collect(),
    };

    let config = build_config(&matches)?;
    if config.convert {
        run_conversion(&matches, &config, input, &columns)
    } else {
        let rows = read_rows(input, descriptor_column(&matches)?, &columns, require_column(&matches))?;
        write_passthrough(required::<PathBuf>(&matches, "output")?, &rows, &columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let matches = command().get_matches_from(["cdnalift", "-i", "rows.tsv", "-c", "--vcf"]);
        assert!(matches.get_flag("convert"));
        assert!(matches.get_flag("vcf"));
        assert_eq!(matches.get_one::<usize>("max-len"), None);
        assert_eq!(matches.get_one::<String>("justify").map(String::as_str), Some("left"));
        assert_eq!(require_column(&matches), Some("Protein nomenclature"));
        assert_eq!(descriptor_column(&matches).unwrap(), "cDNA Nomenclature");
        let config = build_config(&matches).unwrap();
        assert!(config.convert);
        assert_eq!(config.style, VariantStyle::Vcf);
        assert_eq!(config.filters.max_allele_length, 200);
        assert_eq!(config.justify, Justify::Left);

        let matches = command().get_matches_from(["cdnalift", "-i", "rows.tsv", "--require-column", ""]);
        assert_eq!(require_column(&matches), None);
    }
}
