// src/sample_files.rs

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use ahash::AHashMap;

use crate::error::{CivError, Result};
use crate::grouping::Grouping;
use crate::reads::{dedup_by_id, read_records, write_records, ReadsFormat};

/// De-duplicated read files for (genome, sample) pairs.
///
/// Each pair gets at most one file, written on the first [`add`](Self::add);
/// later calls return the remembered name. Samples are numbered in the order
/// they are first seen, and the number is used in the file name.
#[derive(Debug)]
pub struct PathogenSampleFiles {
    format: ReadsFormat,
    samples: AHashMap<String, usize>,
    reads_filenames: BTreeMap<(String, usize), PathBuf>,
    writes: usize,
}

impl PathogenSampleFiles {
    pub fn new(format: ReadsFormat) -> Self {
        Self {
            format,
            samples: AHashMap::new(),
            reads_filenames: BTreeMap::new(),
            writes: 0,
        }
    }

    pub fn format(&self) -> ReadsFormat {
        self.format
    }

    /// The sample's index, assigning the next free one on first sight.
    pub fn sample_index(&mut self, sample: &str) -> usize {
        let next = self.samples.len();
        *self.samples.entry(sample.to_string()).or_insert(next)
    }

    /// Name of the de-duplicated reads file for a pair, writing it (and
    /// storing its read count in `grouping`) the first time the pair is seen.
    pub fn add(&mut self, grouping: &mut Grouping, genome: &str, sample: &str) -> Result<PathBuf> {
        let unknown = || CivError::UnknownPair {
            genome: genome.to_string(),
            sample: sample.to_string(),
        };
        let out_dir = grouping
            .pair(genome, sample)
            .and_then(|pair| pair.proteins.values().next())
            .map(|m| m.out_dir.clone())
            .ok_or_else(unknown)?;

        let index = self.sample_index(sample);
        let key = (genome.to_string(), index);
        if let Some(filename) = self.reads_filenames.get(&key) {
            return Ok(filename.clone());
        }

        let pair = grouping.pair_mut(genome, sample).ok_or_else(unknown)?;
        let mut reads = Vec::new();
        for protein_match in pair.proteins.values() {
            reads.extend(read_records(&protein_match.reads_filename, self.format)?);
        }
        let reads = dedup_by_id(reads);

        let filename = out_dir.join(format!(
            "pathogen-{genome}-sample-{index}.{}",
            self.format.extension()
        ));
        let count = write_records(&filename, &reads, self.format)?;
        self.writes += 1;
        log::debug!("Wrote {count} unique reads for {genome} / {sample} to {}", filename.display());

        pair.unique_read_count = Some(count);
        self.reads_filenames.insert(key, filename.clone());
        Ok(filename)
    }

    /// The reads file of a pair already passed to [`add`](Self::add).
    pub fn lookup(&self, genome: &str, sample: &str) -> Option<&Path> {
        let index = *self.samples.get(sample)?;
        self.reads_filenames
            .get(&(genome.to_string(), index))
            .map(PathBuf::as_path)
    }

    /// Write `{index} {sample name}` lines, sorted by index.
    pub fn write_sample_index<W: Write>(&self, mut out: W) -> Result<()> {
        let mut samples: Vec<(usize, &str)> = self
            .samples
            .iter()
            .map(|(name, &index)| (index, name.as_str()))
            .collect();
        samples.sort_unstable();
        for (index, name) in samples {
            writeln!(out, "{index} {name}")?;
        }
        Ok(())
    }

    /// How many read files have been written.
    pub fn writes(&self) -> usize {
        self.writes
    }
}
