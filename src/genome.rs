//! Reference genome access.
//!
//! Sequences are served as upper-case forward-strand bases for 0-based half-open intervals.
//! Large genomes should come with a samtools `.fai` index so that only the requested bases are
//! read; without one the whole FASTA is loaded into memory.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use bio::io::fasta;
use log::{info, warn};

use crate::error::ConvertError;
use crate::structures::GenomicInterval;

pub trait SequenceProvider {
    /// Length of the contig, resolving `chr` prefix differences. `None` if unknown.
    fn contig_length(&self, chromosome: &str) -> Option<u64>;

    /// Forward-strand bases of `chromosome[start..end)`.
    fn fetch(&self, chromosome: &str, start: u64, end: u64) -> Result<Vec<u8>, ConvertError>;
}

/// Finds the key used for `name` in `contigs`, trying with and without the `chr` prefix.
fn resolve_name<'a, V>(contigs: &'a HashMap<String, V>, name: &str) -> Option<&'a str> {
    if let Some((key, _)) = contigs.get_key_value(name) {
        return Some(key.as_str());
    }
    let alt_name = match name.strip_prefix("chr") {
        Some(stripped) => stripped.to_string(),
        None => format!("chr{name}"),
    };
    contigs.get_key_value(&alt_name).map(|(key, _)| key.as_str())
}

fn not_found(chromosome: &str, start: u64, end: u64, reason: impl Into<String>) -> ConvertError {
    ConvertError::SequenceNotFound {
        region: GenomicInterval::new(chromosome, start, end),
        reason: reason.into(),
    }
}

/// Checks the interval against the contig bounds and returns the resolved contig name.
fn check_bounds<'a, V>(
    contigs: &'a HashMap<String, V>,
    length_of: impl Fn(&V) -> u64,
    chromosome: &str,
    start: u64,
    end: u64,
) -> Result<&'a str, ConvertError> {
    let name = resolve_name(contigs, chromosome)
        .ok_or_else(|| not_found(chromosome, start, end, "unknown contig"))?;
    let length = length_of(&contigs[name]);
    if start > end || end > length {
        return Err(not_found(
            chromosome,
            start,
            end,
            format!("interval outside contig of length {length}"),
        ));
    }
    Ok(name)
}

/// Random access into a `.fai`-indexed FASTA.
///
/// Holds a small pool of independent file handles. A fetch on a rayon worker uses the handle at
/// the worker's thread index, so parallel batches only contend when there are more workers than
/// handles.
pub struct IndexedGenome {
    readers: Vec<Mutex<fasta::IndexedReader<File>>>,
    lengths: HashMap<String, u64>,
}

impl IndexedGenome {
    /// Opens `path` with a single handle; the index is expected at `<path>.fai`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_readers(path, 1)
    }

    /// Opens `path` with `readers` handles (at least one).
    pub fn with_readers<P: AsRef<Path>>(path: P, readers: usize) -> Result<Self> {
        let path = path.as_ref();
        let open = || {
            fasta::IndexedReader::from_file(&path)
                .with_context(|| format!("Cannot open indexed genome {}", path.display()))
        };
        let first = open()?;
        let lengths = first
            .index
            .sequences()
            .into_iter()
            .map(|s| (s.name, s.len))
            .collect();
        let mut pool = vec![Mutex::new(first)];
        for _ in 1..readers {
            pool.push(Mutex::new(open()?));
        }
        Ok(Self { readers: pool, lengths })
    }

    pub fn readers(&self) -> usize {
        self.readers.len()
    }

    fn reader_slot(&self) -> &Mutex<fasta::IndexedReader<File>> {
        let slot = rayon::current_thread_index().unwrap_or(0) % self.readers.len();
        &self.readers[slot]
    }
}

impl SequenceProvider for IndexedGenome {
    fn contig_length(&self, chromosome: &str) -> Option<u64> {
        resolve_name(&self.lengths, chromosome).map(|name| self.lengths[name])
    }

    fn fetch(&self, chromosome: &str, start: u64, end: u64) -> Result<Vec<u8>, ConvertError> {
        let name = check_bounds(&self.lengths, |len| *len, chromosome, start, end)?;
        if start == end {
            return Ok(Vec::new());
        }

        let mut reader = self
            .reader_slot()
            .lock()
            .map_err(|_| not_found(chromosome, start, end, "genome reader poisoned"))?;
        let mut seq = Vec::with_capacity((end - start) as usize);
        reader
            .fetch(name, start, end)
            .map_err(|e| not_found(chromosome, start, end, e.to_string()))?;
        reader
            .read(&mut seq)
            .map_err(|e| not_found(chromosome, start, end, e.to_string()))?;
        seq.make_ascii_uppercase();
        Ok(seq)
    }
}

/// Whole genome held in memory. Suitable for small references and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGenome {
    contigs: HashMap<String, Vec<u8>>,
}

impl InMemoryGenome {
    /// Load genome sequences into memory from FASTA file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = fasta::Reader::from_file(path)
            .with_context(|| format!("Cannot open genome {}", path.display()))?;
        let mut genome = Self::default();

        for record in reader.records() {
            let record = record.with_context(|| format!("Malformed FASTA {}", path.display()))?;
            genome.insert(record.id(), record.seq());
        }
        Ok(genome)
    }

    pub fn insert(&mut self, name: &str, seq: &[u8]) {
        self.contigs.insert(name.to_owned(), seq.to_ascii_uppercase());
    }

    pub fn from_sequences<'a>(contigs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut genome = Self::default();
        for (name, seq) in contigs {
            genome.insert(name, seq.as_bytes());
        }
        genome
    }
}

impl SequenceProvider for InMemoryGenome {
    fn contig_length(&self, chromosome: &str) -> Option<u64> {
        resolve_name(&self.contigs, chromosome).map(|name| self.contigs[name].len() as u64)
    }

    fn fetch(&self, chromosome: &str, start: u64, end: u64) -> Result<Vec<u8>, ConvertError> {
        let name = check_bounds(&self.contigs, |s| s.len() as u64, chromosome, start, end)?;
        Ok(self.contigs[name][start as usize..end as usize].to_vec())
    }
}

/// Opens the genome with indexed access when `<path>.fai` exists, in memory otherwise.
/// `readers` is the number of file handles kept for indexed access, normally the worker count.
pub fn open_genome<P: AsRef<Path>>(path: P, readers: usize) -> Result<Box<dyn SequenceProvider + Send + Sync>> {
    let path = path.as_ref();
    let fai = PathBuf::from(format!("{}.fai", path.display()));
    if fai.exists() {
        info!("Using indexed genome {} with {} reader(s)", path.display(), readers.max(1));
        Ok(Box::new(IndexedGenome::with_readers(path, readers)?))
    } else {
        warn!("No index {} found, loading genome into memory", fai.display());
        Ok(Box::new(InMemoryGenome::from_file(path)?))
    }
}
