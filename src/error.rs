// src/error.rs

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The two kinds of rows held in the accession index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Genome,
    Protein,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Genome => write!(f, "Genome"),
            RecordKind::Protein => write!(f, "Protein"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CivError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    #[error("{kind} information for {accession:?} already present in database")]
    DuplicateAccession { kind: RecordKind, accession: String },

    #[error("unknown duplication policy {0:?} (expected \"error\" or \"ignore\")")]
    UnknownDuplicationPolicy(String),

    #[error("source {0:?} cannot contain '|' as that is used as a separator")]
    InvalidSource(String),

    #[error("{source_label} line {line_number}: expected 7 fields, found {found}")]
    MalformedLine {
        source_label: String,
        line_number: usize,
        found: usize,
    },

    #[error("{source_label} line {line_number}: could not parse {field} value {value:?}")]
    InvalidField {
        source_label: String,
        line_number: usize,
        field: &'static str,
        value: String,
    },

    #[error("could not find protein info for {0:?}")]
    UnknownProtein(String),

    #[error("could not find genome info for {0:?}")]
    UnknownGenome(String),

    #[error("protein {protein:?} already seen for genome {genome_name:?} ({genome_accession}) sample {sample:?}")]
    DuplicateProtein {
        protein: String,
        genome_name: String,
        genome_accession: String,
        sample: String,
    },

    #[error("no matches recorded for genome {genome:?} in sample {sample:?}")]
    UnknownPair { genome: String, sample: String },

    #[error("genome {0:?} has no proteins")]
    NoProteins(String),

    #[error("could not parse genome location {location:?}: {reason}")]
    Location { location: String, reason: String },

    #[error("lineage lookup failed for {accession:?}: {reason}")]
    Lineage { accession: String, reason: String },

    #[error("excluding {0} viruses needs a taxonomy database")]
    HostFilterWithoutTaxonomy(&'static str),

    #[error("unknown reads format {0:?} (expected \"fasta\" or \"fastq\")")]
    UnknownReadsFormat(String),

    #[error("unknown pathogen type {0:?} (expected \"viral\" or \"bacterial\")")]
    UnknownPathogenType(String),

    #[error("malformed reads file {path:?}: {reason}")]
    MalformedReads { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, CivError>;
