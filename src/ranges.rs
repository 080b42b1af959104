// src/ranges.rs

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CivError, Result};

/// One contiguous, oriented stretch of a genome: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenomeRange {
    pub start: u64,
    pub end: u64,
    pub forward: bool,
}

/// The ranges described by a feature location string such as
/// `[0:300](+)` or `join{[4600:4800](+), [0:120](+)}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenomeRanges {
    ranges: Vec<GenomeRange>,
}

fn range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[<?(\d+):>?(\d+)\]\(([+-])\)$").expect("static range regex is valid")
    })
}

fn parse_range(location: &str, part: &str) -> Result<GenomeRange> {
    let caps = range_regex().captures(part.trim()).ok_or_else(|| CivError::Location {
        location: location.to_string(),
        reason: format!("could not parse range {part:?}"),
    })?;

    let number = |i: usize| -> Result<u64> {
        caps[i].parse().map_err(|_| CivError::Location {
            location: location.to_string(),
            reason: format!("offset {:?} out of range", &caps[i]),
        })
    };

    Ok(GenomeRange {
        start: number(1)?,
        end: number(2)?,
        forward: &caps[3] == "+",
    })
}

impl GenomeRanges {
    pub fn parse(location: &str) -> Result<Self> {
        let trimmed = location.trim();
        let inner = ["join{", "order{"]
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix))
            .map(|rest| {
                rest.strip_suffix('}').ok_or_else(|| CivError::Location {
                    location: location.to_string(),
                    reason: "unterminated compound location".to_string(),
                })
            })
            .transpose()?;

        let ranges = match inner {
            Some(parts) => parts
                .split(',')
                .map(|part| parse_range(location, part))
                .collect::<Result<Vec<_>>>()?,
            None => vec![parse_range(location, trimmed)?],
        };

        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[GenomeRange] {
        &self.ranges
    }

    /// The set of orientations (`true` = forward) found among the ranges.
    pub fn orientations(&self) -> BTreeSet<bool> {
        self.ranges.iter().map(|r| r.forward).collect()
    }

    /// Does the feature run off the end of the genome and continue at offset 0?
    pub fn circular(&self, genome_length: u64) -> bool {
        self.ranges
            .windows(2)
            .any(|pair| pair[0].end == genome_length && pair[1].start == 0)
    }

    /// Number of ranges, counting a range that wraps the genome origin once.
    pub fn distinct_range_count(&self, genome_length: u64) -> usize {
        let wraps = self
            .ranges
            .windows(2)
            .filter(|pair| pair[0].end == genome_length && pair[1].start == 0)
            .count();
        self.ranges.len() - wraps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_range() {
        let ranges = GenomeRanges::parse("[10:400](-)").unwrap();
        assert_eq!(
            ranges.ranges(),
            &[GenomeRange { start: 10, end: 400, forward: false }]
        );
        assert!(!ranges.circular(1000));
        assert_eq!(ranges.distinct_range_count(1000), 1);
    }

    #[test]
    fn test_fuzzy_markers() {
        let ranges = GenomeRanges::parse("[<0:>120](+)").unwrap();
        assert_eq!(ranges.ranges()[0].end, 120);
    }

    #[test]
    fn test_join_wrapping_origin() {
        let ranges = GenomeRanges::parse("join{[4600:4800](+), [0:120](+)}").unwrap();
        assert_eq!(ranges.ranges().len(), 2);
        assert!(ranges.circular(4800));
        assert!(!ranges.circular(5000));
        assert_eq!(ranges.distinct_range_count(4800), 1);
        assert_eq!(ranges.distinct_range_count(5000), 2);
    }

    #[test]
    fn test_mixed_orientations() {
        let ranges = GenomeRanges::parse("join{[0:10](+), [20:30](-)}").unwrap();
        assert_eq!(ranges.orientations().len(), 2);
    }

    #[test]
    fn test_unparseable() {
        assert!(GenomeRanges::parse("complement(1..20)").is_err());
        assert!(GenomeRanges::parse("join{[0:10](+)").is_err());
        assert!(GenomeRanges::parse("").is_err());
    }
}
