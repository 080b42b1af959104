// src/grouping.rs

use std::collections::BTreeMap;

use crate::types::ProteinMatch;

/// Everything recorded for one (genome, sample) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairData {
    /// Matches keyed by protein accession.
    pub proteins: BTreeMap<String, ProteinMatch>,
    /// Reads left after de-duplication by id; `None` until computed.
    pub unique_read_count: Option<usize>,
}

impl PairData {
    pub fn protein_count(&self) -> usize {
        self.proteins.len()
    }

    /// Sum of the per-protein read counts (reads may be counted more than once).
    pub fn total_read_count(&self) -> usize {
        self.proteins.values().map(|p| p.read_count).sum()
    }
}

/// Samples of one genome, keyed by sample name.
pub type GenomeSamples = BTreeMap<String, PairData>;

/// genome accession → sample name → protein accession → match.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    genomes: BTreeMap<String, GenomeSamples>,
}

impl Grouping {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pair entry, created empty if this is its first appearance.
    pub fn ensure_pair(&mut self, genome: &str, sample: &str) -> &mut PairData {
        self.genomes
            .entry(genome.to_string())
            .or_default()
            .entry(sample.to_string())
            .or_default()
    }

    pub fn contains_protein(&self, genome: &str, sample: &str, protein: &str) -> bool {
        self.pair(genome, sample)
            .map(|pair| pair.proteins.contains_key(protein))
            .unwrap_or(false)
    }

    pub fn pair(&self, genome: &str, sample: &str) -> Option<&PairData> {
        self.genomes.get(genome)?.get(sample)
    }

    pub fn pair_mut(&mut self, genome: &str, sample: &str) -> Option<&mut PairData> {
        self.genomes.get_mut(genome)?.get_mut(sample)
    }

    /// Remove a pair. The genome key stays even when its last sample goes.
    pub fn remove_pair(&mut self, genome: &str, sample: &str) -> Option<PairData> {
        self.genomes.get_mut(genome)?.remove(sample)
    }

    pub fn samples(&self, genome: &str) -> Option<&GenomeSamples> {
        self.genomes.get(genome)
    }

    pub fn genomes(&self) -> impl Iterator<Item = (&String, &GenomeSamples)> {
        self.genomes.iter()
    }

    /// All genome accessions seen, including ones whose pairs were all filtered out.
    pub fn genome_accessions(&self) -> Vec<String> {
        self.genomes.keys().cloned().collect()
    }

    /// Every (genome, sample) key, in order.
    pub fn pair_keys(&self) -> Vec<(String, String)> {
        self.genomes
            .iter()
            .flat_map(|(g, samples)| samples.keys().map(move |s| (g.clone(), s.clone())))
            .collect()
    }

    pub fn pair_count(&self) -> usize {
        self.genomes.values().map(|s| s.len()).sum()
    }

    pub fn genome_count(&self) -> usize {
        self.genomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genomes.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::Path;

    /// A match whose files live under `dir`, with read count 2.
    pub(crate) fn protein_match(dir: &Path, accession: &str) -> ProteinMatch {
        ProteinMatch {
            accession: accession.to_string(),
            protein_name: "capsid".to_string(),
            coverage: 0.5,
            median_score: 40.0,
            best_score: 50.0,
            read_count: 2,
            hsp_count: 2,
            read_and_hsp_count: "2".to_string(),
            protein_length: 100,
            index: 0,
            out_dir: dir.to_path_buf(),
            reads_filename: dir.join(format!("{accession}.fasta")),
            plot_filename: dir.join(format!("{accession}.png")),
            protein_url: None,
            genome_url: None,
            read_lengths: None,
        }
    }

    #[test]
    fn test_ensure_pair_and_remove() {
        let mut grouping = Grouping::new();
        assert!(grouping.pair("G1", "s1").is_none());
        grouping.ensure_pair("G1", "s1").unique_read_count = Some(3);
        grouping.ensure_pair("G1", "s2");
        assert_eq!(grouping.ensure_pair("G1", "s1").unique_read_count, Some(3));
        assert_eq!(grouping.pair_count(), 2);
        assert_eq!(
            grouping.pair_keys(),
            vec![("G1".to_string(), "s1".to_string()), ("G1".to_string(), "s2".to_string())]
        );

        assert!(grouping.remove_pair("G1", "s1").is_some());
        assert!(grouping.remove_pair("G1", "s1").is_none());
        assert!(grouping.remove_pair("G9", "s1").is_none());
        assert_eq!(grouping.pair_count(), 1);
        assert_eq!(grouping.genome_count(), 1);
        assert!(!grouping.contains_protein("G1", "s2", "P1"));
    }
}
