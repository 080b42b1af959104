// src/lib.rs
pub mod cache;
pub mod error;
pub mod genome_json;
pub mod grouper;
pub mod grouping;
pub mod ranges;
pub mod reader;
pub mod reads;
pub mod sample_files;
pub mod seqid;
pub mod stats;
pub mod store;
pub mod summary;
pub mod taxonomy;
pub mod types;
pub mod writer;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

pub use crate::error::{CivError, Result};
pub use crate::grouper::{GrouperOptions, ProteinGrouper};
pub use crate::reader::IndexReader;
pub use crate::store::{AccessionIndexStore, DuplicationPolicy};
pub use crate::summary::{PathogenType, Summary, SummaryOptions};
pub use crate::taxonomy::{TaxDb, TaxonomyDatabase};
pub use crate::writer::{IndexWriter, WriterOptions};

use crate::genome_json::read_genome_json;
use crate::types::GenomeRecord;

/// Build a new accession index at `database` from JSON genome records,
/// writing the protein FASTA to `fasta`.
///
/// Returns the number of genomes and proteins added.
pub fn make_database(
    database: &Path,
    fasta: &Path,
    genome_files: &[PathBuf],
    taxonomy: Option<&dyn TaxonomyDatabase>,
    options: &WriterOptions,
) -> Result<(usize, usize)> {
    let genomes: Vec<GenomeRecord> = genome_files
        .par_iter()
        .map(read_genome_json)
        .collect::<Result<_>>()?;
    log::info!("Read {} genome records", genomes.len());

    let store = AccessionIndexStore::open(database)?;
    let fasta = BufWriter::new(File::create(fasta)?);
    let mut writer = IndexWriter::new(store, fasta)?;
    let counts = writer.add_genomes(&genomes, taxonomy, options)?;
    writer.close()?;
    Ok(counts)
}

/// Group the match reports against the index at `database` and build the
/// cross-sample summary.
pub fn summarize_reports(
    database: &Path,
    reports: &[PathBuf],
    grouper_options: GrouperOptions,
    summary_options: &SummaryOptions,
) -> Result<Summary> {
    let db = IndexReader::open(database)?;
    let mut grouper = ProteinGrouper::new(&db, grouper_options)?;
    for report in reports {
        grouper.add_path(report)?;
    }
    grouper.summarize(summary_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn genome_json(accession: &str, proteins: &[(&str, &str)]) -> String {
        let cds: Vec<String> = proteins
            .iter()
            .map(|(id, product)| {
                format!(
                    r#"{{"type": "CDS", "qualifiers": {{"protein_id": ["{id}"], "product": ["{product}"],
                       "translation": ["MKV"], "location": {{"start": 0, "stop": 9}}}}}}"#
                )
            })
            .collect();
        format!(
            r#"{{"id": "{accession}", "name": "Test virus {accession}, complete genome",
                "sequence": "ACGTACGTACGT", "taxonomy": ["Viruses", "Riboviria"],
                "lineage": [[999, "Test virus", "species"], [2559587, "Riboviria", "realm"]],
                "features": [{{"type": "source", "qualifiers": {{"organism": ["Test virus {accession}"],
                                "location": {{"start": 0, "stop": 12}}}}}}, {}]}}"#,
            cds.join(", ")
        )
    }

    #[test]
    fn test_make_database_and_summarize() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path();
        fs::write(dir.join("g1.json"), genome_json("G1", &[("P1", "polymerase"), ("P2", "capsid")])).unwrap();
        fs::write(dir.join("g2.json"), genome_json("G2", &[("P3", "spike")])).unwrap();

        let database = dir.join("index.db");
        let fasta = dir.join("proteins.fasta");
        let options = WriterOptions {
            rna_only: true,
            ..WriterOptions::default()
        };
        let counts = make_database(
            &database,
            &fasta,
            &[dir.join("g1.json"), dir.join("g2.json")],
            None,
            &options,
        )
        .unwrap();
        assert_eq!(counts, (2, 3));

        let proteins = fs::read_to_string(&fasta).unwrap();
        assert!(proteins.starts_with(">civ|GENBANK|P1|GENBANK|G1|polymerase [Test virus G1]\nMKV\n"));
        assert_eq!(proteins.lines().count(), 6);

        let sample = dir.join("sample-1");
        fs::create_dir_all(sample.join("out")).unwrap();
        fs::write(sample.join("out/P1.fasta"), ">read1\nACGT\n>read2\nACGA\n").unwrap();
        fs::write(sample.join("out/P3.fasta"), ">read2\nACGA\n").unwrap();
        let report = sample.join("report.txt");
        fs::write(
            &report,
            "0.50 40.00 50.00 2 2 3 civ|GENBANK|P1|GENBANK|G1|polymerase [Test virus G1]\n\
             0.90 45.00 55.00 1 3 3 civ|GENBANK|P3|GENBANK|G2|spike [Test virus G2]\n",
        )
        .unwrap();

        let grouper_options = GrouperOptions {
            sample_name: Some("sample-1".to_string()),
            pathogen_data_dir: dir.join("pathogen-data"),
            ..GrouperOptions::default()
        };
        let summary = summarize_reports(
            &database,
            &[report],
            grouper_options,
            &SummaryOptions {
                min_protein_fraction: 0.75,
                ..SummaryOptions::default()
            },
        )
        .unwrap();

        // G1 has one of two proteins matched and falls under the fraction.
        assert_eq!(summary.pathogens.len(), 1);
        assert_eq!(summary.genome_count, 2);
        let pathogen = &summary.pathogens[0];
        assert_eq!(pathogen.accession, "G2");
        assert_eq!(pathogen.organism, "Test virus G2");
        assert_eq!(pathogen.samples[0].unique_read_count, 1);
        assert_eq!(pathogen.samples[0].proteins[0].read_and_hsp_count, "1/3");
        assert!(summary.to_string().contains("  sample-1 (1 protein, 1 read)\n"));
    }

    #[test]
    fn test_make_database_duplicate_genome_rolls_back() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path();
        fs::write(dir.join("g1.json"), genome_json("G1", &[("P1", "polymerase")])).unwrap();

        let files = [dir.join("g1.json"), dir.join("g1.json")];
        let result = make_database(
            &dir.join("index.db"),
            &dir.join("proteins.fasta"),
            &files,
            None,
            &WriterOptions::default(),
        );
        assert!(matches!(result, Err(CivError::DuplicateAccession { .. })));

        let counts = make_database(
            &dir.join("index2.db"),
            &dir.join("proteins2.fasta"),
            &files,
            None,
            &WriterOptions {
                duplication_policy: DuplicationPolicy::Ignore,
                ..WriterOptions::default()
            },
        )
        .unwrap();
        assert_eq!(counts, (1, 1));
    }
}
