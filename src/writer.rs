// src/writer.rs

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use rayon::prelude::*;

use crate::error::{CivError, Result};
use crate::genome_json::read_genome_json;
use crate::ranges::GenomeRanges;
use crate::seqid::{check_source, sequence_id};
use crate::store::{AccessionIndexStore, DuplicationPolicy};
use crate::taxonomy::{format_lineage, is_rna_virus, TaxonomyDatabase};
use crate::types::{Genome, GenomeFeature, GenomeRecord, Lineage, Protein};

/// Qualifiers that may appear at most once on a CDS feature.
const UNIQUE_CDS_QUALIFIERS: [&str; 5] = ["gene", "note", "product", "protein_id", "translation"];

/// Inclusion filters and labels applied while adding genomes.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Keep only genomes whose lineage marks them as RNA viruses.
    pub rna_only: bool,
    /// Drop genomes whose only known host is in this set.
    pub exclude_exclusive_hosts: Option<BTreeSet<String>>,
    pub exclude_fungus_only_viruses: bool,
    pub exclude_plant_only_viruses: bool,
    /// Where the records came from, e.g. `refseq` or `RVDB`.
    pub database_name: Option<String>,
    pub protein_source: String,
    pub genome_source: String,
    pub duplication_policy: DuplicationPolicy,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            rna_only: false,
            exclude_exclusive_hosts: None,
            exclude_fungus_only_viruses: false,
            exclude_plant_only_viruses: false,
            database_name: None,
            protein_source: "GENBANK".to_string(),
            genome_source: "GENBANK".to_string(),
            duplication_policy: DuplicationPolicy::Error,
        }
    }
}

/// Organism, host and note taken from a genome's `source` feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub organism: Option<String>,
    pub host: Option<String>,
    pub note: Option<String>,
}

/// A coding region that survived validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdsInfo {
    pub protein_id: String,
    pub translation: String,
    pub feature_location: String,
    pub forward: bool,
    pub circular: bool,
    pub range_count: usize,
    pub gene: String,
    pub note: String,
    pub product: String,
}

type HostCheck = fn(&dyn TaxonomyDatabase, &Lineage) -> bool;

/// A genome that passed the filters, with everything needed for insertion.
struct PreparedGenome<'a> {
    genome: &'a GenomeRecord,
    taxonomy_id: Option<u32>,
    source: SourceInfo,
    proteins: Vec<CdsInfo>,
}

fn single_qualifier(feature: &GenomeFeature, key: &str) -> Option<String> {
    feature.qualifiers.get(key).and_then(|values| values.first()).cloned()
}

/// Summary information from the genome's first `source` feature.
pub fn source_info(genome: &GenomeRecord) -> Option<SourceInfo> {
    let Some(source) = genome.features.iter().find(|f| f.kind == "source") else {
        log::warn!(
            "Genome {:?} (accession {}) had no source feature! Skipping.",
            genome.description,
            genome.id
        );
        return None;
    };
    Some(SourceInfo {
        organism: single_qualifier(source, "organism"),
        host: single_qualifier(source, "host"),
        note: single_qualifier(source, "note"),
    })
}

/// Validate one CDS feature, returning `None` (with a warning) when it cannot be used.
pub fn cds_info(genome: &GenomeRecord, feature: &GenomeFeature) -> Option<CdsInfo> {
    for key in UNIQUE_CDS_QUALIFIERS {
        if let Some(values) = feature.qualifiers.get(key) {
            if values.len() > 1 {
                log::warn!(
                    "Genome {:?} (accession {}) has CDS feature with {} values for {key}. Skipping.",
                    genome.description,
                    genome.id,
                    values.len()
                );
                return None;
            }
        }
    }

    let translation = single_qualifier(feature, "translation");

    let Some(protein_id) = single_qualifier(feature, "protein_id") else {
        if translation.is_some() {
            log::warn!(
                "Genome {:?} (accession {}) has CDS feature with no protein_id but has a translation! Skipping. Feature location: {}",
                genome.description,
                genome.id,
                feature.location.text
            );
        } else {
            log::warn!(
                "Genome {:?} (accession {}) has CDS feature with no protein_id. Skipping.",
                genome.description,
                genome.id
            );
        }
        return None;
    };

    let Some(translation) = translation else {
        log::warn!(
            "Genome {:?} (accession {}) has CDS feature with protein {protein_id:?} with no translated sequence. Skipping.",
            genome.description,
            genome.id
        );
        return None;
    };

    let ranges = match GenomeRanges::parse(&feature.location.text) {
        Ok(ranges) => ranges,
        Err(e) => {
            log::warn!(
                "Genome {:?} (accession {}) contains unparseable CDS location for protein {protein_id:?}. Skipping. Error: {e}",
                genome.description,
                genome.id
            );
            return None;
        }
    };
    let genome_length = genome.sequence.len() as u64;

    if feature.location.start >= feature.location.end {
        log::warn!(
            "Genome {:?} (accession {}) contains feature with start ({}) >= stop ({}). Skipping.",
            genome.description,
            genome.id,
            feature.location.start,
            feature.location.end
        );
        return None;
    }

    let forward = match feature.location.strand {
        Some(1) => true,
        Some(-1) => false,
        None => {
            // Segments of a compound location on different strands. Such a
            // protein cannot be represented as a single linear alignment.
            log::warn!(
                "Genome {:?} (accession {}) has protein {protein_id:?} with mixed orientation! Skipping.",
                genome.description,
                genome.id
            );
            return None;
        }
        Some(strand) => {
            log::warn!(
                "Genome {:?} (accession {}) has protein {protein_id:?} with feature with strand of {strand}! Skipping.",
                genome.description,
                genome.id
            );
            return None;
        }
    };

    if ranges.orientations() != BTreeSet::from([forward]) {
        log::warn!(
            "Genome {:?} (accession {}) has protein {protein_id:?} whose location {} disagrees with its strand. Skipping.",
            genome.description,
            genome.id,
            feature.location.text
        );
        return None;
    }

    Some(CdsInfo {
        protein_id,
        translation,
        feature_location: feature.location.text.clone(),
        forward,
        circular: ranges.circular(genome_length),
        range_count: ranges.distinct_range_count(genome_length),
        gene: single_qualifier(feature, "gene").unwrap_or_default(),
        note: single_qualifier(feature, "note").unwrap_or_default(),
        product: single_qualifier(feature, "product").unwrap_or_else(|| "UNKNOWN".to_string()),
    })
}

/// All usable CDS features of a genome.
pub fn genome_proteins(genome: &GenomeRecord) -> Vec<CdsInfo> {
    genome
        .features
        .iter()
        .filter(|f| f.kind == "CDS")
        .filter_map(|f| cds_info(genome, f))
        .collect()
}

fn fetch_lineage(genome: &GenomeRecord, taxonomy: Option<&dyn TaxonomyDatabase>) -> Option<Lineage> {
    if let Some(lineage) = &genome.lineage {
        return Some(lineage.clone());
    }
    let taxonomy = taxonomy?;
    match taxonomy.lineage(&genome.id) {
        Ok(lineage) => Some(lineage),
        Err(e) => {
            log::warn!("Could not look up taxonomy lineage for {}: {e}", genome.id);
            None
        }
    }
}

/// Steps 1-5 of ingestion for one genome: lineage, content filters, source
/// feature and CDS extraction. Touches no store state, so it runs in parallel.
fn prepare_genome<'a>(
    genome: &'a GenomeRecord,
    taxonomy: Option<&dyn TaxonomyDatabase>,
    options: &WriterOptions,
) -> Option<PreparedGenome<'a>> {
    log::info!("{}: {}", genome.id, genome.description);

    let lineage = fetch_lineage(genome, taxonomy);
    let taxonomy_id = lineage
        .as_ref()
        .and_then(|l| l.first())
        .map(|entry| entry.taxonomy_id);

    if options.rna_only {
        let Some(lineage) = &lineage else {
            log::info!(
                "Could not look up taxonomy lineage for {} ({}). Cannot confirm as RNA. Skipping.",
                genome.id,
                genome.description
            );
            return None;
        };
        log::debug!("  Lineage:\n{}", format_lineage(lineage, "    "));
        if !is_rna_virus(lineage) {
            log::info!("  {} ({}) is not an RNA virus. Skipping.", genome.id, genome.description);
            return None;
        }
    }

    let host_filters: [(bool, &str, HostCheck); 2] = [
        (options.exclude_fungus_only_viruses, "fungus-only", |t, l| t.is_fungus_only_virus(l)),
        (options.exclude_plant_only_viruses, "plant-only", |t, l| t.is_plant_only_virus(l)),
    ];
    for (enabled, what, check) in host_filters {
        if !enabled {
            continue;
        }
        // add_genomes rejects host filters without a taxonomy database.
        let Some(taxonomy) = taxonomy else {
            return None;
        };
        let Some(lineage) = &lineage else {
            log::info!(
                "No taxonomy lineage for {} ({}). Cannot confirm as {what} virus. Skipping.",
                genome.id,
                genome.description
            );
            return None;
        };
        if check(taxonomy, lineage) {
            log::info!("  {} ({}) is a {what} virus. Skipping.", genome.id, genome.description);
            return None;
        }
    }

    if let Some(exclusive_hosts) = &options.exclude_exclusive_hosts {
        match (taxonomy_id, taxonomy) {
            (Some(taxid), Some(taxonomy)) => match taxonomy.hosts(taxid) {
                Some(hosts) => {
                    if hosts.len() == 1 && hosts.iter().all(|h| exclusive_hosts.contains(h)) {
                        log::info!(
                            "Excluding {} ({}) due to exclusive host criteria.",
                            genome.id,
                            genome.description
                        );
                        return None;
                    }
                }
                None => log::info!(
                    "Could not find hosts for {} ({}). Cannot exclude due to exclusive host criteria.",
                    genome.id,
                    genome.description
                ),
            },
            _ => log::info!(
                "Could not find taxonomy id for {} ({}). Cannot exclude due to exclusive host criteria.",
                genome.id,
                genome.description
            ),
        }
    }

    let source = source_info(genome)?;
    let proteins = genome_proteins(genome);

    Some(PreparedGenome {
        genome,
        taxonomy_id,
        source,
        proteins,
    })
}

/// Builds an [`AccessionIndexStore`] from genome records and writes the
/// FASTA of every inserted protein to `fasta`.
pub struct IndexWriter<W: Write> {
    store: AccessionIndexStore,
    fasta: W,
}

impl<W: Write> IndexWriter<W> {
    pub fn new(store: AccessionIndexStore, fasta: W) -> Result<Self> {
        store.create_schema()?;
        Ok(Self { store, fasta })
    }

    pub fn store(&self) -> &AccessionIndexStore {
        &self.store
    }

    /// Add a batch of genomes, returning `(genomes added, proteins added)`.
    ///
    /// The batch is one transaction: a fatal error (a duplicate under the
    /// `Error` policy, a store failure) rolls back the whole batch.
    pub fn add_genomes(
        &mut self,
        genomes: &[GenomeRecord],
        taxonomy: Option<&dyn TaxonomyDatabase>,
        options: &WriterOptions,
    ) -> Result<(usize, usize)> {
        check_source(&options.protein_source)?;
        check_source(&options.genome_source)?;
        if taxonomy.is_none() {
            if options.exclude_fungus_only_viruses {
                return Err(CivError::HostFilterWithoutTaxonomy("fungus-only"));
            }
            if options.exclude_plant_only_viruses {
                return Err(CivError::HostFilterWithoutTaxonomy("plant-only"));
            }
        }

        let prepared: Vec<Option<PreparedGenome<'_>>> = genomes
            .par_iter()
            .map(|genome| prepare_genome(genome, taxonomy, options))
            .collect();

        let tx = self.store.connection().unchecked_transaction()?;
        let mut genome_count = 0;
        let mut protein_count = 0;

        for p in prepared.into_iter().flatten() {
            let genome = p.genome;
            let organism = p
                .source
                .organism
                .clone()
                .unwrap_or_else(|| genome.description.clone());

            let row = Genome {
                accession: genome.id.clone(),
                organism: organism.clone(),
                name: genome.description.clone(),
                sequence: genome.sequence.clone(),
                length: genome.sequence.len(),
                protein_count: p.proteins.len(),
                host: p.source.host.clone(),
                note: p.source.note.clone(),
                taxonomy_id: p.taxonomy_id,
                taxonomy: genome.taxonomy.clone(),
                database_name: options.database_name.clone(),
            };

            if !self.store.add_genome(&row, options.duplication_policy)? {
                continue;
            }
            genome_count += 1;

            let mut added = 0;
            for cds in &p.proteins {
                let protein = Protein {
                    accession: cds.protein_id.clone(),
                    genome_accession: genome.id.clone(),
                    sequence: cds.translation.clone(),
                    length: cds.translation.len(),
                    offsets: cds.feature_location.clone(),
                    forward: cds.forward,
                    circular: cds.circular,
                    range_count: cds.range_count,
                    gene: Some(cds.gene.clone()),
                    note: Some(cds.note.clone()),
                    product: Some(cds.product.clone()),
                };
                if self.store.add_protein(&protein, options.duplication_policy)? {
                    let seq_id = sequence_id(
                        &options.protein_source,
                        &cds.protein_id,
                        &options.genome_source,
                        &genome.id,
                        &cds.product,
                    );
                    writeln!(self.fasta, ">{seq_id} [{organism}]\n{}", cds.translation)?;
                    added += 1;
                }
            }
            protein_count += added;

            log::info!(
                "  Added {} ({}) with {} protein{} to database.",
                genome.id,
                genome.description,
                added,
                if added == 1 { "" } else { "s" }
            );
        }

        tx.commit()?;
        Ok((genome_count, protein_count))
    }

    /// Add the single genome held in a JSON record file.
    pub fn add_json_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        taxonomy: Option<&dyn TaxonomyDatabase>,
        options: &WriterOptions,
    ) -> Result<(usize, usize)> {
        let genome = read_genome_json(path)?;
        self.add_genomes(std::slice::from_ref(&genome), taxonomy, options)
    }

    /// Flush the FASTA output, build the store indices and close the store.
    pub fn close(mut self) -> Result<W> {
        self.fasta.flush()?;
        self.store.close()?;
        Ok(self.fasta)
    }
}
