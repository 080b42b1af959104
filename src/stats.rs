// src/stats.rs

use std::collections::BTreeMap;

use crate::error::{CivError, Result};
use crate::grouping::Grouping;
use crate::reader::IndexReader;

/// Standard deviations above the mean a count must be to stand out.
pub const SD_MULTIPLE: f64 = 2.5;
/// Counts below this are never highlighted.
pub const MIN_READS: usize = 10;

/// Mean and population standard deviation, `None` for no values.
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Flag the counts that stand out from the rest.
///
/// A lone count is flagged when it exceeds [`MIN_READS`]. Otherwise a count is
/// flagged when it is above `mean + SD_MULTIPLE * sd` and at least
/// [`MIN_READS`].
pub fn outliers(counts: &[usize]) -> Vec<bool> {
    match counts {
        [] => Vec::new(),
        [single] => vec![*single > MIN_READS],
        _ => {
            let values: Vec<f64> = counts.iter().map(|&c| c as f64).collect();
            let (mean, sd) = mean_and_std(&values).unwrap_or_default();
            let cutoff = mean + SD_MULTIPLE * sd;
            counts
                .iter()
                .map(|&c| c as f64 > cutoff && c >= MIN_READS)
                .collect()
        }
    }
}

/// Drop every (genome, sample) pair matching fewer than `threshold` of the
/// genome's proteins. Returns how many pairs were removed.
pub fn filter_min_protein_fraction(
    grouping: &mut Grouping,
    reader: &IndexReader,
    threshold: f64,
) -> Result<usize> {
    if threshold <= 0.0 {
        return Ok(0);
    }

    let mut doomed = Vec::new();
    for (genome_accession, samples) in grouping.genomes() {
        let genome = reader
            .find_genome(genome_accession)?
            .ok_or_else(|| CivError::UnknownGenome(genome_accession.clone()))?;
        if genome.protein_count == 0 {
            return Err(CivError::NoProteins(genome_accession.clone()));
        }
        for (sample, pair) in samples {
            let fraction = pair.protein_count() as f64 / genome.protein_count as f64;
            if fraction < threshold {
                doomed.push((genome_accession.clone(), sample.clone()));
            }
        }
    }

    for (genome, sample) in &doomed {
        log::debug!("Dropping {sample} for {genome}: too few proteins matched");
        grouping.remove_pair(genome, sample);
    }
    if !doomed.is_empty() {
        log::info!(
            "Removed {} pathogen/sample pairs below protein fraction {threshold}",
            doomed.len()
        );
    }
    Ok(doomed.len())
}

/// Outlier flags for one genome, keyed by sample. Samples in `all_samples`
/// with no pair for this genome count as zero reads.
pub fn sample_outliers<'s, I>(grouping: &Grouping, genome: &str, all_samples: I) -> BTreeMap<String, bool>
where
    I: IntoIterator<Item = &'s String>,
{
    let (names, counts): (Vec<&String>, Vec<usize>) = all_samples
        .into_iter()
        .map(|sample| {
            let count = grouping
                .pair(genome, sample)
                .and_then(|pair| pair.unique_read_count)
                .unwrap_or(0);
            (sample, count)
        })
        .unzip();
    names
        .into_iter()
        .cloned()
        .zip(outliers(&counts))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::tests::protein_match;
    use crate::reader::tests::reader_with;
    use std::path::Path;

    #[test]
    fn test_mean_and_std() {
        assert_eq!(mean_and_std(&[]), None);
        let (mean, sd) = mean_and_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(mean, 5.0);
        assert_eq!(sd, 2.0);
    }

    #[test]
    fn test_single_count() {
        assert_eq!(outliers(&[11]), vec![true]);
        assert_eq!(outliers(&[10]), vec![false]);
        assert!(outliers(&[]).is_empty());
    }

    #[test]
    fn test_outlier_flagged() {
        // Nine 1s and a 500: the 500 is three population sds above the mean.
        let mut counts = vec![1; 9];
        counts.push(500);
        let flags = outliers(&counts);
        assert!(flags[9]);
        assert_eq!(flags.iter().filter(|&&f| f).count(), 1);
    }

    #[test]
    fn test_small_sample_not_flagged() {
        // With only five values one count can be at most two sds out.
        assert_eq!(outliers(&[1, 1, 1, 1, 500]), vec![false; 5]);
        // Above the cutoff but under the read minimum.
        let mut counts = vec![0; 20];
        counts.push(9);
        assert!(!outliers(&counts)[20]);
    }

    fn grouping_with(dir: &Path, pairs: &[(&str, &str, usize)]) -> Grouping {
        let mut grouping = Grouping::new();
        for &(genome, sample, matched) in pairs {
            let pair = grouping.ensure_pair(genome, sample);
            for i in 0..matched {
                let acc = format!("P{i}");
                pair.proteins.insert(acc.clone(), protein_match(dir, &acc));
            }
        }
        grouping
    }

    #[test]
    fn test_filter_is_monotone() {
        let reader = reader_with(&[("G1", &["P0", "P1", "P2", "P3"])]);
        let dir = Path::new("out");
        let pairs = [("G1", "a", 1), ("G1", "b", 2), ("G1", "c", 3), ("G1", "d", 4)];

        let mut previous: Option<Vec<(String, String)>> = None;
        for threshold in [0.0, 0.25, 0.5, 0.6, 0.8, 1.0, 1.1] {
            let mut grouping = grouping_with(dir, &pairs);
            let removed = filter_min_protein_fraction(&mut grouping, &reader, threshold).unwrap();
            let kept = grouping.pair_keys();
            assert_eq!(removed + kept.len(), pairs.len());
            if let Some(previous) = &previous {
                assert!(kept.iter().all(|k| previous.contains(k)));
            }
            previous = Some(kept);
        }
        assert_eq!(previous.unwrap().len(), 0);
    }

    #[test]
    fn test_filter_keeps_exact_fraction() {
        let reader = reader_with(&[("G1", &["P0", "P1", "P2", "P3"])]);
        let mut grouping = grouping_with(Path::new("out"), &[("G1", "a", 1), ("G1", "b", 2)]);
        assert_eq!(filter_min_protein_fraction(&mut grouping, &reader, 0.5).unwrap(), 1);
        assert!(grouping.pair("G1", "a").is_none());
        assert!(grouping.pair("G1", "b").is_some());
    }

    #[test]
    fn test_filter_zero_protein_genome() {
        let no_proteins: &[&str] = &[];
        let reader = reader_with(&[("G1", no_proteins)]);
        let mut grouping = grouping_with(Path::new("out"), &[("G1", "a", 1)]);
        assert!(matches!(
            filter_min_protein_fraction(&mut grouping, &reader, 0.5),
            Err(CivError::NoProteins(_))
        ));
        assert_eq!(filter_min_protein_fraction(&mut grouping, &reader, 0.0).unwrap(), 0);
    }

    #[test]
    fn test_sample_outliers_counts_missing_as_zero() {
        let mut grouping = Grouping::new();
        grouping.ensure_pair("G1", "hot").unique_read_count = Some(500);
        for i in 0..9 {
            grouping.ensure_pair("G2", &format!("s{i}")).unique_read_count = Some(1);
        }
        let mut samples: Vec<String> = (0..9).map(|i| format!("s{i}")).collect();
        samples.push("hot".to_string());

        let flags = sample_outliers(&grouping, "G1", &samples);
        assert_eq!(flags.len(), 10);
        assert!(flags["hot"]);
        assert_eq!(flags.values().filter(|&&f| f).count(), 1);
    }
}
