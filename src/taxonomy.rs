//src/taxonomy.rs

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use ahash::AHashMap;

use crate::error::{CivError, Result};
use crate::types::{Lineage, LineageEntry};

/// One row of a taxDB dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxon {
    pub parent: u32,
    pub name: String,
    pub rank: String,
}

/// Lineages longer than this are assumed to come from a cyclic dump.
const MAX_LINEAGE_DEPTH: usize = 256;

/// Everything the index writer needs to know about taxonomy.
pub trait TaxonomyDatabase: Sync {
    /// Lineage of the genome with the given accession, most specific taxon first.
    fn lineage(&self, accession: &str) -> Result<Lineage>;

    /// Known hosts of a taxon, or `None` if nothing is recorded for it.
    fn hosts(&self, taxonomy_id: u32) -> Option<BTreeSet<String>>;

    fn is_fungus_only_virus(&self, lineage: &Lineage) -> bool {
        self.exclusive_host(lineage, "fungi")
    }

    fn is_plant_only_virus(&self, lineage: &Lineage) -> bool {
        self.exclusive_host(lineage, "plants")
    }

    /// True if the lineage's own taxon has exactly one recorded host, `host`.
    fn exclusive_host(&self, lineage: &Lineage, host: &str) -> bool {
        lineage
            .first()
            .and_then(|entry| self.hosts(entry.taxonomy_id))
            .map(|hosts| hosts.len() == 1 && hosts.contains(host))
            .unwrap_or(false)
    }
}

/// Does the lineage place the genome among the RNA viruses?
pub fn is_rna_virus(lineage: &Lineage) -> bool {
    lineage.iter().any(|entry| {
        entry.name == "Riboviria"
            || entry.name.ends_with("RNA viruses")
            || entry.name.starts_with("ssRNA")
            || entry.name.starts_with("dsRNA")
    })
}

/// Multi-line, indented rendering of a lineage for log output.
pub fn format_lineage(lineage: &Lineage, prefix: &str) -> String {
    lineage
        .iter()
        .map(|e| format!("{prefix}{} ({}, {})", e.name, e.rank, e.taxonomy_id))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses `<taxid>\t<parent>\t<name>\t<rank>` lines into a taxid → taxon
/// map. Short lines and lines with a non-numeric or zero taxid are skipped.
pub fn parse_taxdb<P: AsRef<Path>>(filepath: P) -> io::Result<AHashMap<u32, Taxon>> {
    let reader = BufReader::new(File::open(filepath)?);
    let mut taxa = AHashMap::new();
    let mut skipped = 0usize;
    for line in reader.lines() {
        let line = line?;
        let fields: Vec<&str> = line.splitn(4, '\t').map(str::trim).collect();
        let &[taxid, parent, name, rank] = fields.as_slice() else {
            skipped += 1;
            continue;
        };
        match taxid.parse::<u32>() {
            Ok(taxid) if taxid != 0 => {
                taxa.insert(
                    taxid,
                    Taxon {
                        parent: parent.parse().unwrap_or(0),
                        name: name.to_string(),
                        rank: rank.to_string(),
                    },
                );
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        log::debug!("Skipped {skipped} unusable taxDB line(s)");
    }
    Ok(taxa)
}

/// Parses `<accession>\t<taxid>` lines. Lines whose taxid is not a number
/// (headers, blanks) are skipped.
pub fn parse_accession_taxids<P: AsRef<Path>>(filepath: P) -> io::Result<AHashMap<String, u32>> {
    let reader = BufReader::new(File::open(filepath)?);
    let mut result = AHashMap::new();
    for line in reader.lines() {
        let line = line?;
        let mut parts = line.split('\t');
        if let (Some(acc), Some(taxid)) = (parts.next(), parts.next()) {
            if let Ok(taxid) = taxid.trim().parse::<u32>() {
                result.insert(acc.trim().to_string(), taxid);
            }
        }
    }
    Ok(result)
}

/// Parses `<taxid>\t<host>[,<host>...]` lines.
pub fn parse_hosts<P: AsRef<Path>>(filepath: P) -> io::Result<AHashMap<u32, BTreeSet<String>>> {
    let reader = BufReader::new(File::open(filepath)?);
    let mut result: AHashMap<u32, BTreeSet<String>> = AHashMap::new();
    for line in reader.lines() {
        let line = line?;
        let Some((taxid, hosts)) = line.split_once('\t') else {
            continue;
        };
        let Ok(taxid) = taxid.trim().parse::<u32>() else {
            continue;
        };
        result.entry(taxid).or_default().extend(
            hosts
                .split(',')
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty()),
        );
    }
    Ok(result)
}

/// A file-backed taxonomy: a taxDB dump, an accession → taxid table and an
/// optional host table.
#[derive(Debug, Default)]
pub struct TaxDb {
    pub taxa: AHashMap<u32, Taxon>,
    pub accession_taxids: AHashMap<String, u32>,
    pub host_map: AHashMap<u32, BTreeSet<String>>,
}

impl TaxDb {
    pub fn from_files<P: AsRef<Path>>(
        taxdb_path: P,
        accession_taxid_path: P,
        hosts_path: Option<P>,
    ) -> io::Result<Self> {
        let taxa = parse_taxdb(taxdb_path)?;
        let accession_taxids = parse_accession_taxids(accession_taxid_path)?;
        let host_map = match hosts_path {
            Some(path) => parse_hosts(path)?,
            None => AHashMap::new(),
        };
        log::info!(
            "Loaded taxonomy with {} taxa, {} accessions, {} host entries",
            taxa.len(),
            accession_taxids.len(),
            host_map.len()
        );
        Ok(Self {
            taxa,
            accession_taxids,
            host_map,
        })
    }

    /// Walk from `taxid` to the root.
    pub fn lineage_of_taxid(&self, taxid: u32) -> Lineage {
        let mut lineage = Vec::new();
        let mut current = taxid;
        while let Some(taxon) = self.taxa.get(&current) {
            lineage.push(LineageEntry {
                taxonomy_id: current,
                name: taxon.name.clone(),
                rank: taxon.rank.clone(),
            });
            if taxon.parent == 0 || taxon.parent == current {
                break;
            }
            current = taxon.parent;
            if lineage.len() >= MAX_LINEAGE_DEPTH {
                break;
            }
        }
        lineage
    }
}

impl TaxonomyDatabase for TaxDb {
    fn lineage(&self, accession: &str) -> Result<Lineage> {
        let taxid = self
            .accession_taxids
            .get(accession)
            .copied()
            .ok_or_else(|| CivError::Lineage {
                accession: accession.to_string(),
                reason: "no taxonomy id for accession".to_string(),
            })?;
        let lineage = self.lineage_of_taxid(taxid);
        if lineage.is_empty() {
            return Err(CivError::Lineage {
                accession: accession.to_string(),
                reason: format!("taxonomy id {taxid} not in taxonomy dump"),
            });
        }
        Ok(lineage)
    }

    fn hosts(&self, taxonomy_id: u32) -> Option<BTreeSet<String>> {
        self.host_map.get(&taxonomy_id).cloned()
    }
}
