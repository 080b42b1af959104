// src/reads.rs

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use ahash::AHashSet;
use flate2::read::MultiGzDecoder;

use crate::error::{CivError, Result};

/// On-disk format of the per-protein read files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadsFormat {
    #[default]
    Fasta,
    Fastq,
}

impl ReadsFormat {
    /// File name suffix, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ReadsFormat::Fasta => "fasta",
            ReadsFormat::Fastq => "fastq",
        }
    }
}

impl FromStr for ReadsFormat {
    type Err = CivError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fasta" => Ok(ReadsFormat::Fasta),
            "fastq" => Ok(ReadsFormat::Fastq),
            other => Err(CivError::UnknownReadsFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ReadsFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A minimal representation of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRecord {
    /// First whitespace-delimited word of the header.
    pub id: String,
    pub header_line: String,
    pub seq: String,
    /// Present for FASTQ only.
    pub quals: Option<String>,
}

impl ReadRecord {
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

fn record(header: &str, seq: String, quals: Option<String>) -> ReadRecord {
    ReadRecord {
        id: header.split_whitespace().next().unwrap_or("").to_string(),
        header_line: header.to_string(),
        seq,
        quals,
    }
}

/// Gzip is decided by a `.gz` suffix only.
fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    Ok(match path.extension() {
        Some(ext) if ext == "gz" => Box::new(BufReader::new(MultiGzDecoder::new(file))),
        _ => Box::new(BufReader::new(file)),
    })
}

/// Read every record of a FASTA or FASTQ file (optionally gzipped).
pub fn read_records<P: AsRef<Path>>(path: P, format: ReadsFormat) -> Result<Vec<ReadRecord>> {
    let path = path.as_ref();
    let reader = open_reader(path)?;
    match format {
        ReadsFormat::Fasta => read_fasta(reader),
        ReadsFormat::Fastq => read_fastq(path, reader),
    }
}

fn read_fasta(reader: Box<dyn BufRead>) -> Result<Vec<ReadRecord>> {
    let mut sequences = Vec::new();
    let mut header: Option<String> = None;
    let mut seq = String::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end();
        if let Some(h) = line.strip_prefix('>') {
            if let Some(prev) = header.take() {
                sequences.push(record(&prev, std::mem::take(&mut seq), None));
            }
            header = Some(h.to_string());
        } else if header.is_some() {
            seq.push_str(line.trim());
        }
    }
    if let Some(prev) = header {
        sequences.push(record(&prev, seq, None));
    }
    Ok(sequences)
}

/// The next line without its line ending, or `None` at end of input.
fn next_line(reader: &mut dyn BufRead, line: &mut String) -> Result<Option<String>> {
    line.clear();
    if reader.read_line(line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end().to_string()))
}

fn read_fastq(path: &Path, mut reader: Box<dyn BufRead>) -> Result<Vec<ReadRecord>> {
    let mut sequences = Vec::new();
    let mut buf = String::new();
    let truncated = |what: &str| CivError::MalformedReads {
        path: path.to_path_buf(),
        reason: format!("truncated record, missing {what}"),
    };

    while let Some(header_line) = next_line(reader.as_mut(), &mut buf)? {
        if header_line.is_empty() {
            continue;
        }
        let Some(header) = header_line.strip_prefix('@') else {
            return Err(CivError::MalformedReads {
                path: path.to_path_buf(),
                reason: format!("expected '@' header, found {header_line:?}"),
            });
        };
        let seq = next_line(reader.as_mut(), &mut buf)?.ok_or_else(|| truncated("sequence"))?;
        next_line(reader.as_mut(), &mut buf)?.ok_or_else(|| truncated("'+' line"))?;
        let quals = next_line(reader.as_mut(), &mut buf)?.ok_or_else(|| truncated("quality"))?;
        sequences.push(record(header, seq, Some(quals)));
    }

    Ok(sequences)
}

/// Write `reads` to `path`, returning how many were written.
pub fn write_records<P: AsRef<Path>>(path: P, reads: &[ReadRecord], format: ReadsFormat) -> Result<usize> {
    let mut out = BufWriter::new(File::create(path)?);
    for read in reads {
        match format {
            ReadsFormat::Fasta => writeln!(out, ">{}\n{}", read.header_line, read.seq)?,
            ReadsFormat::Fastq => {
                let quals = read.quals.as_deref().unwrap_or("");
                writeln!(out, "@{}\n{}\n+\n{}", read.header_line, read.seq, quals)?
            }
        }
    }
    out.flush()?;
    Ok(reads.len())
}

/// Drop reads whose id has already been seen. The first read with a given id
/// is the one kept, and input order is preserved.
pub fn dedup_by_id(reads: Vec<ReadRecord>) -> Vec<ReadRecord> {
    let mut seen = AHashSet::with_capacity(reads.len());
    reads
        .into_iter()
        .filter(|read| seen.insert(read.id.clone()))
        .collect()
}
