use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use civ_rs::reads::ReadsFormat;
use civ_rs::{
    make_database, summarize_reports, DuplicationPolicy, GrouperOptions, PathogenType,
    SummaryOptions, TaxDb, TaxonomyDatabase, WriterOptions,
};

#[derive(Parser)]
#[command(name = "civ-rs", version, about = "Protein/genome accession index and cross-sample pathogen summaries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an accession index and protein FASTA from JSON genome records.
    MakeDb(MakeDbArgs),
    /// Group protein match reports by pathogen and sample.
    Summarize(SummarizeArgs),
}

#[derive(clap::Args)]
struct MakeDbArgs {
    /// SQLite index to create.
    #[arg(long)]
    database: PathBuf,
    /// Protein FASTA output.
    #[arg(long)]
    fasta: PathBuf,
    /// JSON genome record files.
    #[arg(required = true)]
    genomes: Vec<PathBuf>,
    /// taxDB dump (`taxid\tparent\tname\trank`).
    #[arg(long, requires = "accession_taxids")]
    taxdb: Option<PathBuf>,
    /// Accession to taxid table.
    #[arg(long, requires = "taxdb")]
    accession_taxids: Option<PathBuf>,
    /// Taxid to host list table.
    #[arg(long, requires = "taxdb")]
    hosts: Option<PathBuf>,
    #[arg(long)]
    rna_only: bool,
    #[arg(long, requires = "taxdb")]
    exclude_fungus_only_viruses: bool,
    #[arg(long, requires = "taxdb")]
    exclude_plant_only_viruses: bool,
    /// Skip genomes whose only host is one of these (repeatable).
    #[arg(long = "exclude-exclusive-host")]
    exclude_exclusive_hosts: Vec<String>,
    #[arg(long)]
    database_name: Option<String>,
    #[arg(long, default_value = "GENBANK")]
    protein_source: String,
    #[arg(long, default_value = "GENBANK")]
    genome_source: String,
    /// `error` or `ignore`.
    #[arg(long, default_value = "error")]
    duplication_policy: DuplicationPolicy,
}

#[derive(clap::Args)]
struct SummarizeArgs {
    /// SQLite index built by `make-db`.
    #[arg(long)]
    database: PathBuf,
    /// Protein match report files.
    #[arg(required = true)]
    reports: Vec<PathBuf>,
    #[arg(long, default_value = "out")]
    asset_dir: PathBuf,
    #[arg(long, conflicts_with = "sample_name_regex")]
    sample_name: Option<String>,
    /// The first capture group names the sample.
    #[arg(long)]
    sample_name_regex: Option<String>,
    /// `fasta` or `fastq`.
    #[arg(long, default_value = "fasta")]
    format: ReadsFormat,
    #[arg(long)]
    save_read_lengths: bool,
    #[arg(long)]
    title_regex: Option<String>,
    #[arg(long)]
    negative_title_regex: Option<String>,
    #[arg(long, default_value = "pathogen-data")]
    pathogen_data_dir: PathBuf,
    #[arg(long, default_value_t = 0.0)]
    min_protein_fraction: f64,
    /// Write `index name` lines for every sample here.
    #[arg(long)]
    sample_index_file: Option<PathBuf>,
    /// Also write one concatenated reads file per pathogen.
    #[arg(long)]
    write_pathogen_reads: bool,
    /// `viral` or `bacterial`.
    #[arg(long, default_value = "viral")]
    pathogen_type: PathogenType,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    preamble: Option<String>,
}

fn spinner(color: &str, message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&format!("{{spinner:.{color}}} {{msg}}"))
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner
}

fn make_db(args: MakeDbArgs) -> civ_rs::Result<()> {
    let taxonomy = match (&args.taxdb, &args.accession_taxids) {
        (Some(taxdb), Some(accession_taxids)) => {
            let spinner = spinner("blue", "Loading taxonomy...");
            let db = TaxDb::from_files(taxdb.as_path(), accession_taxids.as_path(), args.hosts.as_deref())?;
            spinner.finish_with_message("Taxonomy loaded.");
            Some(db)
        }
        _ => None,
    };

    let options = WriterOptions {
        rna_only: args.rna_only,
        exclude_exclusive_hosts: if args.exclude_exclusive_hosts.is_empty() {
            None
        } else {
            Some(args.exclude_exclusive_hosts.into_iter().collect::<BTreeSet<_>>())
        },
        exclude_fungus_only_viruses: args.exclude_fungus_only_viruses,
        exclude_plant_only_viruses: args.exclude_plant_only_viruses,
        database_name: args.database_name,
        protein_source: args.protein_source,
        genome_source: args.genome_source,
        duplication_policy: args.duplication_policy,
    };

    let spinner = spinner("green", &format!("Adding {} genome file(s)...", args.genomes.len()));
    let (genomes, proteins) = make_database(
        &args.database,
        &args.fasta,
        &args.genomes,
        taxonomy.as_ref().map(|t| t as &dyn TaxonomyDatabase),
        &options,
    )?;
    spinner.finish_with_message(format!("Added {genomes} genome(s) with {proteins} protein(s)."));
    Ok(())
}

fn summarize(args: SummarizeArgs) -> civ_rs::Result<()> {
    let grouper_options = GrouperOptions {
        asset_dir: args.asset_dir,
        sample_name: args.sample_name,
        sample_name_regex: args.sample_name_regex,
        format: args.format,
        save_read_lengths: args.save_read_lengths,
        title_regex: args.title_regex,
        negative_title_regex: args.negative_title_regex,
        pathogen_data_dir: args.pathogen_data_dir,
    };
    let summary_options = SummaryOptions {
        min_protein_fraction: args.min_protein_fraction,
        sample_index_path: args.sample_index_file,
        write_pathogen_reads: args.write_pathogen_reads,
        pathogen_type: args.pathogen_type,
        title: args.title,
        preamble: args.preamble,
    };

    let spinner = spinner("yellow", &format!("Summarizing {} report(s)...", args.reports.len()));
    let summary = summarize_reports(&args.database, &args.reports, grouper_options, &summary_options)?;
    spinner.finish_with_message(format!("Found {} pathogen(s).", summary.pathogens.len()));

    print!("{summary}");
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::MakeDb(args) => make_db(args),
        Command::Summarize(args) => summarize(args),
    };
    if let Err(e) = result {
        eprintln!("civ-rs: {e}");
        process::exit(1);
    }
}
