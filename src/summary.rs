// src/summary.rs

//! The finished cross-sample summary. All numbers, including per-pathogen
//! totals, are computed before anything is rendered; [`Summary`]'s `Display`
//! only formats them.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CivError, Result};
use crate::grouper::ProteinGrouper;
use crate::stats;
use crate::types::ProteinMatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathogenType {
    #[default]
    Viral,
    Bacterial,
}

impl PathogenType {
    fn noun(&self, count: usize) -> &'static str {
        match (self, count) {
            (PathogenType::Viral, 1) => "virus",
            (PathogenType::Viral, _) => "viruses",
            (PathogenType::Bacterial, 1) => "bacterium",
            (PathogenType::Bacterial, _) => "bacteria",
        }
    }
}

impl FromStr for PathogenType {
    type Err = CivError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "viral" => Ok(PathogenType::Viral),
            "bacterial" => Ok(PathogenType::Bacterial),
            other => Err(CivError::UnknownPathogenType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    /// Pairs matching a smaller fraction of their genome's proteins are dropped.
    pub min_protein_fraction: f64,
    /// Write `{index} {sample}` lines here.
    pub sample_index_path: Option<PathBuf>,
    /// Concatenate each pathogen's per-sample read files into the pathogen
    /// data dir.
    pub write_pathogen_reads: bool,
    pub pathogen_type: PathogenType,
    pub title: Option<String>,
    pub preamble: Option<String>,
}

/// One sample's matches against one pathogen.
#[derive(Debug, Clone)]
pub struct SampleSummary {
    pub name: String,
    pub panel_filename: Option<PathBuf>,
    /// Sum of per-protein read counts.
    pub read_count: usize,
    pub unique_read_count: usize,
    pub reads_filename: PathBuf,
    pub highlighted: bool,
    /// Ordered by protein accession.
    pub proteins: Vec<ProteinMatch>,
}

#[derive(Debug, Clone)]
pub struct PathogenSummary {
    pub accession: String,
    pub organism: String,
    pub name: String,
    pub host: Option<String>,
    pub length: usize,
    pub protein_count: usize,
    pub taxonomy: Vec<String>,
    pub samples: Vec<SampleSummary>,
    /// Sum of the samples' unique read counts.
    pub unique_read_count: usize,
    pub reads_filename: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub title: String,
    pub preamble: Option<String>,
    pub pathogen_type: PathogenType,
    pub sample_count: usize,
    /// Every genome matched in any report, including those the protein
    /// fraction filter later dropped.
    pub genome_count: usize,
    /// Ordered by organism name.
    pub pathogens: Vec<PathogenSummary>,
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}\n", self.title)?;
        if let Some(preamble) = &self.preamble {
            writeln!(f, "{preamble}\n")?;
        }
        let n = self.genome_count;
        writeln!(
            f,
            "Overall, proteins from {n} {} were found in {} sample{}.",
            self.pathogen_type.noun(n),
            self.sample_count,
            plural(self.sample_count)
        )?;

        for pathogen in &self.pathogens {
            writeln!(
                f,
                "\n{} ({}, in {} sample{}, {} unique read{})",
                pathogen.name,
                pathogen.accession,
                pathogen.samples.len(),
                plural(pathogen.samples.len()),
                pathogen.unique_read_count,
                plural(pathogen.unique_read_count)
            )?;
            for sample in &pathogen.samples {
                let proteins = sample.proteins.len();
                writeln!(
                    f,
                    "  {}{} ({proteins} protein{}, {} read{})",
                    sample.name,
                    if sample.highlighted { " *" } else { "" },
                    plural(proteins),
                    sample.read_count,
                    plural(sample.read_count)
                )?;
                for p in &sample.proteins {
                    write!(
                        f,
                        "    {:.2}\t{:.2}\t{:.2}\t{:>3}\t{}",
                        p.coverage, p.median_score, p.best_score, p.read_and_hsp_count, p.protein_name
                    )?;
                    if let Some(lengths) = &p.read_lengths {
                        let mut lengths = lengths.clone();
                        lengths.sort_unstable();
                        let lengths: Vec<String> = lengths.iter().map(usize::to_string).collect();
                        write!(f, " ({})", lengths.join(", "))?;
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}

impl ProteinGrouper<'_> {
    /// Build the summary: write every de-duplicated reads file, drop pairs
    /// below the protein fraction, and gather the per-pathogen records.
    pub fn summarize(&mut self, options: &SummaryOptions) -> Result<Summary> {
        let pathogen_data_dir = self.options().pathogen_data_dir.clone();
        let extension = self.options().format.extension();
        if options.write_pathogen_reads {
            fs::create_dir_all(&pathogen_data_dir)?;
        }

        self.compute_unique_read_counts()?;

        if let Some(path) = &options.sample_index_path {
            let mut out = BufWriter::new(File::create(path)?);
            self.sample_files().write_sample_index(&mut out)?;
            out.flush()?;
        }

        self.filter_min_protein_fraction(options.min_protein_fraction)?;

        let grouping = self.grouping();
        let mut pathogens = Vec::new();
        for (accession, samples) in grouping.genomes() {
            if samples.is_empty() {
                continue;
            }
            let genome = self
                .db()
                .find_genome(accession)?
                .ok_or_else(|| CivError::UnknownGenome(accession.clone()))?;
            let highlighted = stats::sample_outliers(grouping, accession, self.sample_names().keys());

            let mut pathogen_reads = if options.write_pathogen_reads {
                let filename = pathogen_data_dir.join(format!("pathogen-{accession}.{extension}"));
                Some((BufWriter::new(File::create(&filename)?), filename))
            } else {
                None
            };

            let mut sample_summaries = Vec::with_capacity(samples.len());
            for (sample, pair) in samples {
                let reads_filename = self
                    .sample_files()
                    .lookup(accession, sample)
                    .ok_or_else(|| CivError::UnknownPair {
                        genome: accession.clone(),
                        sample: sample.clone(),
                    })?
                    .to_path_buf();
                if let Some((out, _)) = pathogen_reads.as_mut() {
                    io::copy(&mut File::open(&reads_filename)?, out)?;
                }
                sample_summaries.push(SampleSummary {
                    name: sample.clone(),
                    panel_filename: self.sample_names().get(sample).cloned(),
                    read_count: pair.total_read_count(),
                    unique_read_count: pair.unique_read_count.unwrap_or(0),
                    reads_filename,
                    highlighted: highlighted.get(sample).copied().unwrap_or(false),
                    proteins: pair.proteins.values().cloned().collect(),
                });
            }

            let reads_filename = match pathogen_reads {
                Some((mut out, filename)) => {
                    out.flush()?;
                    Some(filename)
                }
                None => None,
            };

            pathogens.push(PathogenSummary {
                accession: accession.clone(),
                organism: genome.organism.clone(),
                name: genome.name.clone(),
                host: genome.host.clone(),
                length: genome.length,
                protein_count: genome.protein_count,
                taxonomy: genome.taxonomy.clone(),
                unique_read_count: sample_summaries.iter().map(|s| s.unique_read_count).sum(),
                samples: sample_summaries,
                reads_filename,
            });
        }
        pathogens.sort_by(|a, b| a.organism.cmp(&b.organism));

        let title = options.title.clone().unwrap_or_else(|| {
            format!("Summary of {}.", options.pathogen_type.noun(2))
        });
        Ok(Summary {
            title,
            preamble: options.preamble.clone(),
            pathogen_type: options.pathogen_type,
            sample_count: self.sample_names().len(),
            genome_count: grouping.genome_count(),
            pathogens,
        })
    }
}
