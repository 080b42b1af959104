// src/grouper.rs

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::{Regex, RegexBuilder};

use crate::error::{CivError, Result};
use crate::grouping::Grouping;
use crate::reader::IndexReader;
use crate::reads::{read_records, ReadsFormat};
use crate::sample_files::PathogenSampleFiles;
use crate::seqid::{self, GENOME_ACCESSION_FIELD, PROTEIN_ACCESSION_FIELD};
use crate::stats;
use crate::types::ProteinMatch;

/// Separator in the read/HSP display string when the counts differ.
pub const READ_AND_HSP_COUNT_SEPARATOR: char = '/';

/// Number of whitespace-separated fields on a match report line.
const REPORT_FIELDS: usize = 7;

#[derive(Debug, Clone)]
pub struct GrouperOptions {
    /// Directory, relative to each report, holding its per-protein files.
    pub asset_dir: PathBuf,
    /// Use this sample name for every report.
    pub sample_name: Option<String>,
    /// Take the sample name from the first capture group of this regex
    /// applied to the report label.
    pub sample_name_regex: Option<String>,
    pub format: ReadsFormat,
    pub save_read_lengths: bool,
    pub title_regex: Option<String>,
    pub negative_title_regex: Option<String>,
    pub pathogen_data_dir: PathBuf,
}

impl Default for GrouperOptions {
    fn default() -> Self {
        Self {
            asset_dir: PathBuf::from("out"),
            sample_name: None,
            sample_name_regex: None,
            format: ReadsFormat::Fasta,
            save_read_lengths: false,
            title_regex: None,
            negative_title_regex: None,
            pathogen_data_dir: PathBuf::from("pathogen-data"),
        }
    }
}

/// Case-insensitive accept/reject of genome names.
#[derive(Debug, Clone)]
pub struct TitleFilter {
    positive: Option<Regex>,
    negative: Option<Regex>,
}

impl TitleFilter {
    pub fn new(positive: Option<&str>, negative: Option<&str>) -> Result<Option<Self>> {
        let build = |pattern: &str| RegexBuilder::new(pattern).case_insensitive(true).build();
        let positive = positive.map(build).transpose()?;
        let negative = negative.map(build).transpose()?;
        if positive.is_none() && negative.is_none() {
            return Ok(None);
        }
        Ok(Some(Self { positive, negative }))
    }

    pub fn accepts(&self, title: &str) -> bool {
        self.positive.as_ref().map_or(true, |re| re.is_match(title))
            && !self.negative.as_ref().map_or(false, |re| re.is_match(title))
    }
}

/// One parsed report line, before lookups.
struct ReportLine<'l> {
    coverage: f64,
    median_score: f64,
    best_score: f64,
    read_count: usize,
    hsp_count: usize,
    protein_length: usize,
    id: &'l str,
}

/// Split off six whitespace-delimited fields and keep the rest (which may
/// itself contain spaces) as the seventh. On failure, return how many
/// fields were found.
fn split_report_line(line: &str) -> std::result::Result<([&str; REPORT_FIELDS - 1], &str), usize> {
    let mut fields = [""; REPORT_FIELDS - 1];
    let mut rest = line.trim();
    for (i, slot) in fields.iter_mut().enumerate() {
        match rest.find(char::is_whitespace) {
            Some(end) => {
                *slot = &rest[..end];
                rest = rest[end..].trim_start();
            }
            None => return Err(if rest.is_empty() { i } else { i + 1 }),
        }
    }
    Ok((fields, rest))
}

fn parse_report_line<'l>(label: &str, line_number: usize, line: &'l str) -> Result<ReportLine<'l>> {
    let (fields, id) = split_report_line(line).map_err(|found| CivError::MalformedLine {
        source_label: label.to_string(),
        line_number,
        found,
    })?;

    fn number<T: FromStr>(label: &str, line_number: usize, field: &'static str, value: &str) -> Result<T> {
        value.parse().map_err(|_| CivError::InvalidField {
            source_label: label.to_string(),
            line_number,
            field,
            value: value.to_string(),
        })
    }

    Ok(ReportLine {
        coverage: number(label, line_number, "coverage", fields[0])?,
        median_score: number(label, line_number, "median score", fields[1])?,
        best_score: number(label, line_number, "best score", fields[2])?,
        read_count: number(label, line_number, "read count", fields[3])?,
        hsp_count: number(label, line_number, "HSP count", fields[4])?,
        protein_length: number(label, line_number, "protein length", fields[5])?,
        id,
    })
}

pub fn read_and_hsp_count(read_count: usize, hsp_count: usize) -> String {
    if read_count == hsp_count {
        read_count.to_string()
    } else {
        format!("{read_count}{READ_AND_HSP_COUNT_SEPARATOR}{hsp_count}")
    }
}

/// Collects protein match reports from many samples into a [`Grouping`]
/// of genome → sample → protein.
pub struct ProteinGrouper<'a> {
    db: &'a IndexReader,
    options: GrouperOptions,
    sample_name_regex: Option<Regex>,
    title_filter: Option<TitleFilter>,
    grouping: Grouping,
    sample_names: BTreeMap<String, PathBuf>,
    sample_files: PathogenSampleFiles,
}

impl<'a> ProteinGrouper<'a> {
    pub fn new(db: &'a IndexReader, options: GrouperOptions) -> Result<Self> {
        let sample_name_regex = options
            .sample_name_regex
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        let title_filter = TitleFilter::new(
            options.title_regex.as_deref(),
            options.negative_title_regex.as_deref(),
        )?;
        let sample_files = PathogenSampleFiles::new(options.format);
        Ok(Self {
            db,
            options,
            sample_name_regex,
            title_filter,
            grouping: Grouping::new(),
            sample_names: BTreeMap::new(),
            sample_files,
        })
    }

    pub fn db(&self) -> &'a IndexReader {
        self.db
    }

    pub fn options(&self) -> &GrouperOptions {
        &self.options
    }

    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    /// Sample name → the sample's `index.html` under its asset dir.
    pub fn sample_names(&self) -> &BTreeMap<String, PathBuf> {
        &self.sample_names
    }

    pub fn sample_files(&self) -> &PathogenSampleFiles {
        &self.sample_files
    }

    /// The sample a report belongs to: the fixed name, else the first
    /// capture of the sample regex, else the label itself.
    pub fn sample_name_for(&self, label: &str) -> String {
        if let Some(name) = &self.options.sample_name {
            return name.clone();
        }
        self.sample_name_regex
            .as_ref()
            .and_then(|re| re.captures(label))
            .and_then(|caps| caps.get(1))
            .map_or_else(|| label.to_string(), |m| m.as_str().to_string())
    }

    /// Read a match report from disk.
    pub fn add_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        self.add_file(&path.to_string_lossy(), reader)
    }

    /// Add the matches of one report. `label` is the report's file name; it
    /// names the sample and locates the per-protein files.
    pub fn add_file<R: BufRead>(&mut self, label: &str, lines: R) -> Result<()> {
        let sample = self.sample_name_for(label);
        let out_dir = Path::new(label)
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.options.asset_dir);
        self.sample_names
            .insert(sample.clone(), out_dir.join("index.html"));

        let mut added = 0;
        for (index, line) in lines.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if self.add_line(label, &sample, &out_dir, index, &line)? {
                added += 1;
            }
        }
        log::info!("Added {added} protein matches from {label} (sample {sample})");
        Ok(())
    }

    /// Returns false when the title filter rejects the genome.
    fn add_line(&mut self, label: &str, sample: &str, out_dir: &Path, index: usize, line: &str) -> Result<bool> {
        let report = parse_report_line(label, index + 1, line)?;

        let protein = self
            .db
            .find_protein(report.id)?
            .ok_or_else(|| CivError::UnknownProtein(report.id.to_string()))?;
        let genome = match self.db.find_genome(report.id)? {
            Some(genome) => genome,
            None => self
                .db
                .find_genome(&protein.genome_accession)?
                .ok_or_else(|| CivError::UnknownGenome(report.id.to_string()))?,
        };

        if let Some(filter) = &self.title_filter {
            if !filter.accepts(&genome.name) {
                log::debug!("Title filter rejected {}", genome.name);
                return Ok(false);
            }
        }

        if self
            .grouping
            .contains_protein(&genome.accession, sample, &protein.accession)
        {
            return Err(CivError::DuplicateProtein {
                protein: protein.accession.clone(),
                genome_name: genome.name.clone(),
                genome_accession: genome.accession.clone(),
                sample: sample.to_string(),
            });
        }

        let extension = self.options.format.extension();
        let reads_filename = out_dir.join(format!("{}.{extension}", protein.accession));
        let (protein_url, genome_url) = if seqid::is_composite(report.id) {
            (
                seqid::ncbi_url(report.id, PROTEIN_ACCESSION_FIELD),
                seqid::ncbi_url(report.id, GENOME_ACCESSION_FIELD),
            )
        } else {
            (None, None)
        };
        let read_lengths = if self.options.save_read_lengths {
            Some(
                read_records(&reads_filename, self.options.format)?
                    .iter()
                    .map(|read| read.len())
                    .collect(),
            )
        } else {
            None
        };

        let protein_name = protein
            .product
            .clone()
            .or_else(|| protein.gene.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let protein_match = ProteinMatch {
            accession: protein.accession.clone(),
            protein_name,
            coverage: report.coverage,
            median_score: report.median_score,
            best_score: report.best_score,
            read_count: report.read_count,
            hsp_count: report.hsp_count,
            read_and_hsp_count: read_and_hsp_count(report.read_count, report.hsp_count),
            protein_length: report.protein_length,
            index,
            out_dir: out_dir.to_path_buf(),
            reads_filename,
            plot_filename: out_dir.join(format!("{}.png", protein.accession)),
            protein_url,
            genome_url,
            read_lengths,
        };
        self.grouping
            .ensure_pair(&genome.accession, sample)
            .proteins
            .insert(protein.accession.clone(), protein_match);
        Ok(true)
    }

    /// The de-duplicated reads file of a pair, written on first request.
    pub fn pathogen_sample_file(&mut self, genome: &str, sample: &str) -> Result<PathBuf> {
        self.sample_files.add(&mut self.grouping, genome, sample)
    }

    /// Write the de-duplicated reads file of every pair, filling in the
    /// unique read counts.
    pub fn compute_unique_read_counts(&mut self) -> Result<()> {
        for (genome, sample) in self.grouping.pair_keys() {
            self.sample_files.add(&mut self.grouping, &genome, &sample)?;
        }
        Ok(())
    }

    pub fn filter_min_protein_fraction(&mut self, threshold: f64) -> Result<usize> {
        stats::filter_min_protein_fraction(&mut self.grouping, self.db, threshold)
    }

    /// Samples whose unique read count for `genome` stands out against every
    /// other sample. Needs [`compute_unique_read_counts`](Self::compute_unique_read_counts).
    pub fn highlighted_samples(&self, genome: &str) -> Vec<String> {
        stats::sample_outliers(&self.grouping, genome, self.sample_names.keys())
            .into_iter()
            .filter_map(|(sample, flagged)| flagged.then_some(sample))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::reader_with;
    use std::fs;
    use std::io::Cursor;

    const P1: &str = "civ|GENBANK|P1|GENBANK|G1|tegument protein VP22 [Test virus]";
    const P2: &str = "civ|GENBANK|P2|GENBANK|G1|capsid | major [Test virus]";

    fn line(reads: usize, hsps: usize, id: &str) -> String {
        format!("0.77 46.60 48.10 {reads} {hsps} 74 {id}\n")
    }

    fn add(grouper: &mut ProteinGrouper, label: &str, text: &str) -> Result<()> {
        grouper.add_file(label, Cursor::new(text.to_string()))
    }

    #[test]
    fn test_split_report_line() {
        let (fields, rest) = split_report_line("1 2 3 4 5 6 civ|a b|c").unwrap();
        assert_eq!(fields, ["1", "2", "3", "4", "5", "6"]);
        assert_eq!(rest, "civ|a b|c");
        assert_eq!(split_report_line("1 2 3"), Err(3));
        assert_eq!(split_report_line("1 2 3 4 5 6"), Err(6));
    }

    #[test]
    fn test_add_file_records_match() {
        let db = reader_with(&[("G1", &["P1", "P2"])]);
        let mut grouper = ProteinGrouper::new(&db, GrouperOptions::default()).unwrap();
        let text = line(5, 5, P1) + &line(3, 4, P2);
        add(&mut grouper, "runs/sample-1.txt", &text).unwrap();

        let pair = grouper.grouping().pair("G1", "runs/sample-1.txt").unwrap();
        assert_eq!(pair.protein_count(), 2);
        let first = &pair.proteins["P1"];
        assert_eq!(first.protein_name, "tegument protein VP22");
        assert_eq!(first.read_and_hsp_count, "5");
        assert_eq!(first.index, 0);
        assert_eq!(first.coverage, 0.77);
        assert_eq!(first.reads_filename, Path::new("runs/out/P1.fasta"));
        assert_eq!(first.plot_filename, Path::new("runs/out/P1.png"));
        assert_eq!(first.protein_url.as_deref(), Some("https://www.ncbi.nlm.nih.gov/nuccore/P1"));
        assert_eq!(first.genome_url.as_deref(), Some("https://www.ncbi.nlm.nih.gov/nuccore/G1"));
        assert_eq!(pair.proteins["P2"].read_and_hsp_count, "3/4");
        assert_eq!(pair.proteins["P2"].index, 1);
        assert_eq!(
            grouper.sample_names()["runs/sample-1.txt"],
            Path::new("runs/out/index.html")
        );
    }

    #[test]
    fn test_bare_accession_has_no_urls() {
        let db = reader_with(&[("G1", &["P1"])]);
        let mut grouper = ProteinGrouper::new(&db, GrouperOptions::default()).unwrap();
        add(&mut grouper, "s.txt", &line(1, 1, "P1")).unwrap();
        let found = &grouper.grouping().pair("G1", "s.txt").unwrap().proteins["P1"];
        assert_eq!(found.protein_url, None);
        assert_eq!(found.genome_url, None);
        assert_eq!(found.out_dir, Path::new("out"));
    }

    #[test]
    fn test_duplicate_protein_keeps_first() {
        let db = reader_with(&[("G1", &["P1"])]);
        let mut grouper = ProteinGrouper::new(&db, GrouperOptions::default()).unwrap();
        add(&mut grouper, "s.txt", &line(5, 5, P1)).unwrap();
        let err = add(&mut grouper, "s.txt", &line(9, 9, P1)).unwrap_err();
        assert!(matches!(err, CivError::DuplicateProtein { ref protein, .. } if protein == "P1"));
        assert_eq!(grouper.grouping().pair("G1", "s.txt").unwrap().proteins["P1"].read_count, 5);
    }

    #[test]
    fn test_bad_lines() {
        let db = reader_with(&[("G1", &["P1"])]);
        let mut grouper = ProteinGrouper::new(&db, GrouperOptions::default()).unwrap();
        assert!(matches!(
            add(&mut grouper, "s.txt", "0.5 1 2 3\n"),
            Err(CivError::MalformedLine { found: 4, line_number: 1, .. })
        ));
        assert!(matches!(
            add(&mut grouper, "s.txt", &format!("0.5 x 2 3 3 10 {P1}\n")),
            Err(CivError::InvalidField { field: "median score", .. })
        ));
        assert!(matches!(
            add(&mut grouper, "s.txt", &line(1, 1, "civ|GENBANK|P7|GENBANK|G1|x")),
            Err(CivError::UnknownProtein(_))
        ));
    }

    #[test]
    fn test_title_filter() {
        let filter = TitleFilter::new(Some("herpes"), Some("simplex")).unwrap().unwrap();
        assert!(filter.accepts("Human HERPESvirus 4"));
        assert!(!filter.accepts("Herpes simplex virus"));
        assert!(!filter.accepts("Hepatitis B virus"));
        assert!(TitleFilter::new(None, None).unwrap().is_none());

        let db = reader_with(&[("G1", &["P1"])]);
        let options = GrouperOptions {
            negative_title_regex: Some("COMPLETE GENOME".to_string()),
            ..GrouperOptions::default()
        };
        let mut grouper = ProteinGrouper::new(&db, options).unwrap();
        add(&mut grouper, "s.txt", &line(1, 1, P1)).unwrap();
        assert!(grouper.grouping().is_empty());
    }

    #[test]
    fn test_sample_name_strategies() {
        let db = reader_with(&[]);
        let grouper = ProteinGrouper::new(&db, GrouperOptions::default()).unwrap();
        assert_eq!(grouper.sample_name_for("a/b.txt"), "a/b.txt");

        let options = GrouperOptions {
            sample_name_regex: Some(r"^runs/([^/]+)/".to_string()),
            ..GrouperOptions::default()
        };
        let grouper = ProteinGrouper::new(&db, options).unwrap();
        assert_eq!(grouper.sample_name_for("runs/patient-7/summary.txt"), "patient-7");
        assert_eq!(grouper.sample_name_for("other/summary.txt"), "other/summary.txt");

        let options = GrouperOptions {
            sample_name: Some("fixed".to_string()),
            sample_name_regex: Some("(.*)".to_string()),
            ..GrouperOptions::default()
        };
        let grouper = ProteinGrouper::new(&db, options).unwrap();
        assert_eq!(grouper.sample_name_for("whatever"), "fixed");
    }

    #[test]
    fn test_unique_reads_and_read_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("P1.fasta"), ">r1\nACGT\n>r2\nAC\n").unwrap();
        fs::write(out.join("P2.fasta"), ">r2\nAC\n>r3\nACGTACGT\n").unwrap();

        let db = reader_with(&[("G1", &["P1", "P2"])]);
        let options = GrouperOptions {
            save_read_lengths: true,
            ..GrouperOptions::default()
        };
        let mut grouper = ProteinGrouper::new(&db, options).unwrap();
        let label = dir.path().join("report.txt");
        let label = label.to_string_lossy();
        add(&mut grouper, &label, &(line(2, 2, P1) + &line(2, 2, P2))).unwrap();

        let pair = grouper.grouping().pair("G1", &label).unwrap();
        assert_eq!(pair.proteins["P2"].read_lengths, Some(vec![2, 8]));
        assert_eq!(pair.total_read_count(), 4);

        grouper.compute_unique_read_counts().unwrap();
        assert_eq!(grouper.grouping().pair("G1", &label).unwrap().unique_read_count, Some(3));
        let file = grouper.pathogen_sample_file("G1", &label).unwrap();
        assert_eq!(file, out.join("pathogen-G1-sample-0.fasta"));
        assert_eq!(grouper.sample_files().writes(), 1);
        assert!(grouper.highlighted_samples("G1").is_empty());
    }
}
