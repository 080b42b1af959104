// src/store.rs

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rusqlite::{ffi, params, Connection, OpenFlags, OptionalExtension, Row};

use crate::error::{CivError, RecordKind, Result};
use crate::types::{Genome, Protein};

/// Separator used to flatten the genome taxonomy path into one column.
pub const TAXONOMY_SEPARATOR: &str = "\t";

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS genomes (
        accession VARCHAR UNIQUE PRIMARY KEY,
        organism VARCHAR NOT NULL,
        name VARCHAR NOT NULL,
        sequence VARCHAR NOT NULL,
        length INTEGER NOT NULL,
        proteinCount INTEGER NOT NULL,
        host VARCHAR,
        note VARCHAR,
        taxonomyId INTEGER,
        taxonomy VARCHAR NOT NULL,
        databaseName VARCHAR
    );

    CREATE TABLE IF NOT EXISTS proteins (
        accession VARCHAR UNIQUE PRIMARY KEY,
        genomeAccession VARCHAR NOT NULL,
        sequence VARCHAR NOT NULL,
        length INTEGER NOT NULL,
        offsets VARCHAR NOT NULL,
        forward INTEGER NOT NULL,
        circular INTEGER NOT NULL,
        rangeCount INTEGER NOT NULL,
        gene VARCHAR,
        note VARCHAR,
        product VARCHAR,
        FOREIGN KEY (genomeAccession) REFERENCES genomes (accession)
    );
";

/// What to do when an inserted accession is already in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicationPolicy {
    /// Fail with [`CivError::DuplicateAccession`].
    #[default]
    Error,
    /// Leave the existing row, report "not inserted".
    Ignore,
}

impl FromStr for DuplicationPolicy {
    type Err = CivError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "error" => Ok(DuplicationPolicy::Error),
            "ignore" => Ok(DuplicationPolicy::Ignore),
            other => Err(CivError::UnknownDuplicationPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for DuplicationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicationPolicy::Error => write!(f, "error"),
            DuplicationPolicy::Ignore => write!(f, "ignore"),
        }
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.extended_code,
            ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

pub fn encode_taxonomy(taxonomy: &[String]) -> String {
    taxonomy.join(TAXONOMY_SEPARATOR)
}

pub fn decode_taxonomy(encoded: &str) -> Vec<String> {
    if encoded.is_empty() {
        Vec::new()
    } else {
        encoded.split(TAXONOMY_SEPARATOR).map(str::to_string).collect()
    }
}

fn genome_from_row(row: &Row<'_>) -> rusqlite::Result<Genome> {
    let taxonomy: String = row.get("taxonomy")?;
    Ok(Genome {
        accession: row.get("accession")?,
        organism: row.get("organism")?,
        name: row.get("name")?,
        sequence: row.get("sequence")?,
        length: row.get::<_, i64>("length")? as usize,
        protein_count: row.get::<_, i64>("proteinCount")? as usize,
        host: row.get("host")?,
        note: row.get("note")?,
        taxonomy_id: row.get::<_, Option<i64>>("taxonomyId")?.map(|id| id as u32),
        taxonomy: decode_taxonomy(&taxonomy),
        database_name: row.get("databaseName")?,
    })
}

fn protein_from_row(row: &Row<'_>) -> rusqlite::Result<Protein> {
    Ok(Protein {
        accession: row.get("accession")?,
        genome_accession: row.get("genomeAccession")?,
        sequence: row.get("sequence")?,
        length: row.get::<_, i64>("length")? as usize,
        offsets: row.get("offsets")?,
        forward: row.get::<_, i64>("forward")? != 0,
        circular: row.get::<_, i64>("circular")? != 0,
        range_count: row.get::<_, i64>("rangeCount")? as usize,
        gene: row.get("gene")?,
        note: row.get("note")?,
        product: row.get("product")?,
    })
}

/// SQLite tables of genomes and proteins, keyed by accession.
///
/// Holds no state besides the connection; caching lives in
/// [`crate::reader::IndexReader`].
pub struct AccessionIndexStore {
    connection: Connection,
}

impl AccessionIndexStore {
    /// Open (creating if needed) the store in `path`. `":memory:"` gives an
    /// in-memory store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection = Connection::open(path)?;
        Ok(Self { connection })
    }

    /// Open an existing store without write access. A missing file is an
    /// error.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            connection: Connection::open_in_memory()?,
        })
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn into_connection(self) -> Connection {
        self.connection
    }

    /// Create both tables if they do not exist yet.
    pub fn create_schema(&self) -> Result<()> {
        self.connection.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Insert a genome row. Returns `Ok(false)` for an ignored duplicate.
    pub fn add_genome(&self, genome: &Genome, policy: DuplicationPolicy) -> Result<bool> {
        let result = self.connection.execute(
            "INSERT INTO genomes(accession, organism, name, sequence, length, proteinCount, \
             host, note, taxonomyId, taxonomy, databaseName) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                genome.accession,
                genome.organism,
                genome.name,
                genome.sequence,
                genome.length as i64,
                genome.protein_count as i64,
                genome.host,
                genome.note,
                genome.taxonomy_id.map(i64::from),
                encode_taxonomy(&genome.taxonomy),
                genome.database_name,
            ],
        );
        Self::resolve_insert(result, RecordKind::Genome, &genome.accession, policy)
    }

    /// Insert a protein row. Returns `Ok(false)` for an ignored duplicate.
    pub fn add_protein(&self, protein: &Protein, policy: DuplicationPolicy) -> Result<bool> {
        let result = self.connection.execute(
            "INSERT INTO proteins(accession, genomeAccession, sequence, length, offsets, \
             forward, circular, rangeCount, gene, note, product) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                protein.accession,
                protein.genome_accession,
                protein.sequence,
                protein.length as i64,
                protein.offsets,
                protein.forward as i64,
                protein.circular as i64,
                protein.range_count as i64,
                protein.gene,
                protein.note,
                protein.product,
            ],
        );
        let inserted = Self::resolve_insert(result, RecordKind::Protein, &protein.accession, policy)?;
        if inserted {
            log::debug!(
                "Protein {}: genome={} product={}",
                protein.accession,
                protein.genome_accession,
                protein.product.as_deref().unwrap_or("")
            );
        }
        Ok(inserted)
    }

    fn resolve_insert(
        result: rusqlite::Result<usize>,
        kind: RecordKind,
        accession: &str,
        policy: DuplicationPolicy,
    ) -> Result<bool> {
        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => match policy {
                DuplicationPolicy::Error => Err(CivError::DuplicateAccession {
                    kind,
                    accession: accession.to_string(),
                }),
                DuplicationPolicy::Ignore => {
                    log::info!(
                        "{kind} information for {accession:?} already present in database. Ignoring."
                    );
                    Ok(false)
                }
            },
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_genome(&self, accession: &str) -> Result<Option<Genome>> {
        let genome = self
            .connection
            .query_row(
                "SELECT * FROM genomes WHERE accession = ?1",
                [accession],
                genome_from_row,
            )
            .optional()?;
        Ok(genome)
    }

    pub fn find_protein(&self, accession: &str) -> Result<Option<Protein>> {
        let protein = self
            .connection
            .query_row(
                "SELECT * FROM proteins WHERE accession = ?1",
                [accession],
                protein_from_row,
            )
            .optional()?;
        Ok(protein)
    }

    pub fn genome_count(&self) -> Result<usize> {
        let n: i64 = self
            .connection
            .query_row("SELECT COUNT(1) FROM genomes", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn protein_count(&self) -> Result<usize> {
        let n: i64 = self
            .connection
            .query_row("SELECT COUNT(1) FROM proteins", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Build the accession indices and close the store. Consuming `self`
    /// rules out writes after closing.
    pub fn close(self) -> Result<()> {
        self.connection.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS protein_idx ON proteins(accession);
             CREATE UNIQUE INDEX IF NOT EXISTS genomes_idx ON genomes(accession);",
        )?;
        self.connection.close().map_err(|(_, e)| e)?;
        Ok(())
    }
}
