//src/types.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

/// One step of a taxonomic lineage: `(taxonomy id, scientific name, rank)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageEntry {
    pub taxonomy_id: u32,
    pub name: String,
    pub rank: String,
}

/// Lineage ordered from the most specific taxon (the genome's own) up to the root.
pub type Lineage = Vec<LineageEntry>;

/// The location of a genome feature as reported by the upstream parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureLocation {
    /// Location string, e.g. `[0:300](+)` or `join{[0:10](+), [20:30](+)}`.
    pub text: String,
    pub start: u64,
    pub end: u64,
    /// `Some(1)` / `Some(-1)` for a definite strand, `Some(0)` for an unknown
    /// strand, `None` when the parts of a compound location disagree.
    pub strand: Option<i8>,
}

/// A single feature (`source`, `CDS`, ...) of an incoming genome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeFeature {
    pub kind: String,
    pub location: FeatureLocation,
    pub qualifiers: BTreeMap<String, Vec<String>>,
}

/// A genome as handed to the index writer by an external parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeRecord {
    pub id: String,
    pub description: String,
    pub sequence: String,
    pub taxonomy: Vec<String>,
    pub features: Vec<GenomeFeature>,
    /// Lineage already attached to the record (JSON input). When absent the
    /// writer asks the taxonomy database.
    pub lineage: Option<Lineage>,
}

/// A row of the `genomes` table, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genome {
    pub accession: String,
    pub organism: String,
    pub name: String,
    pub sequence: String,
    pub length: usize,
    pub protein_count: usize,
    pub host: Option<String>,
    pub note: Option<String>,
    pub taxonomy_id: Option<u32>,
    pub taxonomy: Vec<String>,
    pub database_name: Option<String>,
}

/// A row of the `proteins` table, decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protein {
    pub accession: String,
    pub genome_accession: String,
    pub sequence: String,
    pub length: usize,
    pub offsets: String,
    pub forward: bool,
    pub circular: bool,
    pub range_count: usize,
    pub gene: Option<String>,
    pub note: Option<String>,
    pub product: Option<String>,
}

/// One matched protein of one sample, as read from a match report line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProteinMatch {
    pub accession: String,
    pub protein_name: String,
    pub coverage: f64,
    pub median_score: f64,
    pub best_score: f64,
    pub read_count: usize,
    pub hsp_count: usize,
    /// `"{reads}"` when reads == HSPs, else `"{reads}/{hsps}"`.
    pub read_and_hsp_count: String,
    pub protein_length: usize,
    /// Line number (0-based) of the match in its report.
    pub index: usize,
    pub out_dir: PathBuf,
    pub reads_filename: PathBuf,
    pub plot_filename: PathBuf,
    pub protein_url: Option<String>,
    pub genome_url: Option<String>,
    pub read_lengths: Option<Vec<usize>>,
}
