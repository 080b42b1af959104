// src/seqid.rs

//! Composite sequence identifiers of the form
//! `civ|{proteinSource}|{proteinAccession}|{genomeSource}|{genomeAccession}|{product}`.

use crate::error::{CivError, Result};

pub const SEQUENCE_ID_PREFIX: &str = "civ";
pub const SEQUENCE_ID_SEPARATOR: char = '|';
pub const PROTEIN_ACCESSION_FIELD: usize = 2;
pub const GENOME_ACCESSION_FIELD: usize = 4;

const NCBI_SEQUENCE_URL: &str = "https://www.ncbi.nlm.nih.gov/nuccore/";

/// Take field `field` of a `|`-separated id. The split is bounded so that
/// separators inside the trailing product text do not matter.
fn field(id: &str, field: usize) -> Option<&str> {
    id.splitn(field + 2, SEQUENCE_ID_SEPARATOR).nth(field)
}

/// The protein accession of a composite id, or `None` if `id` has too few fields.
pub fn protein_accession(id: &str) -> Option<&str> {
    field(id, PROTEIN_ACCESSION_FIELD)
}

/// The genome accession of a composite id, or `None` if `id` has too few fields.
pub fn genome_accession(id: &str) -> Option<&str> {
    field(id, GENOME_ACCESSION_FIELD)
}

/// Build the id written to the protein FASTA.
pub fn sequence_id(
    protein_source: &str,
    protein_accession: &str,
    genome_source: &str,
    genome_accession: &str,
    product: &str,
) -> String {
    let sep = SEQUENCE_ID_SEPARATOR.to_string();
    [
        SEQUENCE_ID_PREFIX,
        protein_source,
        protein_accession,
        genome_source,
        genome_accession,
        product,
    ]
    .join(&sep)
}

/// True if `id` was produced by [`sequence_id`].
pub fn is_composite(id: &str) -> bool {
    id.strip_prefix(SEQUENCE_ID_PREFIX)
        .map(|rest| rest.starts_with(SEQUENCE_ID_SEPARATOR))
        .unwrap_or(false)
}

/// NCBI link for the accession in field `field` of a composite id.
pub fn ncbi_url(id: &str, field_index: usize) -> Option<String> {
    field(id, field_index).map(|acc| format!("{NCBI_SEQUENCE_URL}{}", acc.trim()))
}

/// Reject protein/genome source labels that would corrupt the id layout.
pub fn check_source(source: &str) -> Result<()> {
    if source.contains(SEQUENCE_ID_SEPARATOR) {
        Err(CivError::InvalidSource(source.to_string()))
    } else {
        Ok(())
    }
}
