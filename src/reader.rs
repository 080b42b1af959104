// src/reader.rs

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::{LruCache, DEFAULT_CACHE_SIZE};
use crate::error::Result;
use crate::seqid;
use crate::store::AccessionIndexStore;
use crate::types::{Genome, Protein};

/// Read-only, cached lookups of genomes and proteins.
///
/// Lookups accept a composite sequence id or a bare accession. The store sits
/// behind a mutex so one reader can be shared between threads.
pub struct IndexReader {
    store: Mutex<AccessionIndexStore>,
    genome_cache: LruCache<String, Option<Arc<Genome>>>,
    protein_cache: LruCache<String, Option<Arc<Protein>>>,
}

impl IndexReader {
    pub fn new(store: AccessionIndexStore, cache_size: usize) -> Self {
        Self {
            store: Mutex::new(store),
            genome_cache: LruCache::new(cache_size),
            protein_cache: LruCache::new(cache_size),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(AccessionIndexStore::open_read_only(path)?, DEFAULT_CACHE_SIZE))
    }

    /// Find a genome by composite id (accession in field 4) or accession.
    pub fn find_genome(&self, id: &str) -> Result<Option<Arc<Genome>>> {
        let accession = seqid::genome_accession(id).unwrap_or(id).trim();
        self.genome_cache.get_or_try_insert_with(&accession.to_string(), || {
            Ok(self.store.lock().find_genome(accession)?.map(Arc::new))
        })
    }

    /// Find a protein by composite id (accession in field 2) or accession.
    pub fn find_protein(&self, id: &str) -> Result<Option<Arc<Protein>>> {
        let accession = seqid::protein_accession(id).unwrap_or(id).trim();
        self.protein_cache.get_or_try_insert_with(&accession.to_string(), || {
            Ok(self.store.lock().find_protein(accession)?.map(Arc::new))
        })
    }

    pub fn genome_count(&self) -> Result<usize> {
        self.store.lock().genome_count()
    }

    pub fn protein_count(&self) -> Result<usize> {
        self.store.lock().protein_count()
    }

    pub fn genome_cache(&self) -> &LruCache<String, Option<Arc<Genome>>> {
        &self.genome_cache
    }

    pub fn protein_cache(&self) -> &LruCache<String, Option<Arc<Protein>>> {
        &self.protein_cache
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::seqid::sequence_id;
    use crate::store::tests::{genome, protein};
    use crate::store::DuplicationPolicy;
    use rayon::prelude::*;

    pub(crate) fn reader_with(genomes: &[(&str, &[&str])]) -> IndexReader {
        let store = AccessionIndexStore::open_in_memory().unwrap();
        store.create_schema().unwrap();
        for (g, proteins) in genomes {
            let mut row = genome(g);
            row.protein_count = proteins.len();
            store.add_genome(&row, DuplicationPolicy::Error).unwrap();
            for p in proteins.iter() {
                store.add_protein(&protein(p, g), DuplicationPolicy::Error).unwrap();
            }
        }
        IndexReader::new(store, 16)
    }

    #[test]
    fn test_find_by_composite_id_and_accession() {
        let reader = reader_with(&[("NC_001798.2", &["YP_009137150.1"])]);
        let id = sequence_id("GENBANK", "YP_009137150.1", "GENBANK", "NC_001798.2", "tegument protein VP22 [Human alphaherpesvirus 2]");

        let p = reader.find_protein(&id).unwrap().unwrap();
        assert_eq!(*p, protein("YP_009137150.1", "NC_001798.2"));
        let g = reader.find_genome(&id).unwrap().unwrap();
        assert_eq!(g.accession, "NC_001798.2");
        assert_eq!(g.taxonomy, vec!["Viruses".to_string(), "Herpesvirales".to_string()]);

        // Genome accession from the protein record gives the same genome.
        let again = reader.find_genome(&p.genome_accession).unwrap().unwrap();
        assert!(Arc::ptr_eq(&g, &again));
    }

    #[test]
    fn test_short_id_falls_back_to_accession() {
        let reader = reader_with(&[("G1", &["P1"])]);
        assert!(reader.find_genome("G1").unwrap().is_some());
        assert!(reader.find_protein("P1").unwrap().is_some());
        assert!(reader.find_genome("civ|GENBANK|P1").unwrap().is_none());
    }

    #[test]
    fn test_missing_is_none_and_cached() {
        let reader = reader_with(&[("G1", &["P1"])]);
        assert!(reader.find_protein("nope").unwrap().is_none());
        assert!(reader.find_protein("nope").unwrap().is_none());
        assert_eq!(reader.protein_cache().stats(), (1, 1));
    }

    #[test]
    fn test_concurrent_lookups_converge() {
        let reader = reader_with(&[("G1", &["P1", "P2"]), ("G2", &["P3"])]);
        let found: Vec<_> = (0..64)
            .into_par_iter()
            .map(|i| {
                let acc = ["P1", "P2", "P3"][i % 3];
                reader.find_protein(acc).unwrap().unwrap().genome_accession.clone()
            })
            .collect();
        assert_eq!(found.iter().filter(|g| *g == "G2").count(), 21);
        assert_eq!(reader.protein_cache().len(), 3);
        assert_eq!(reader.genome_count().unwrap(), 2);
        assert_eq!(reader.protein_count().unwrap(), 3);
    }

    #[test]
    fn test_open_missing_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");
        assert!(IndexReader::open(&path).is_err());
        assert!(!path.exists());
    }
}
