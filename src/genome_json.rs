// src/genome_json.rs

//! Loading a genome from the JSON record format:
//!
//! ```text
//! {"id": "...", "name": "...", "sequence": "...", "taxonomy": ["..."],
//!  "lineage": [[taxid, "name", "rank"], ...],
//!  "features": [{"type": "CDS", "qualifiers": {"protein_id": ["..."], ...,
//!                "location": {"start": 0, "stop": 300}}}]}
//! ```
//!
//! JSON features always lie on the forward strand.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::types::{FeatureLocation, GenomeFeature, GenomeRecord, LineageEntry};

#[derive(Debug, Deserialize)]
struct JsonGenome {
    id: String,
    name: String,
    sequence: String,
    #[serde(default)]
    taxonomy: Vec<String>,
    #[serde(default)]
    lineage: Option<Vec<(u32, String, String)>>,
    #[serde(default)]
    features: Vec<JsonFeature>,
}

#[derive(Debug, Deserialize)]
struct JsonFeature {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    qualifiers: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonLocation {
    start: u64,
    stop: u64,
}

fn qualifier_values(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => vec![s],
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

impl TryFrom<JsonFeature> for GenomeFeature {
    type Error = serde_json::Error;

    fn try_from(feature: JsonFeature) -> std::result::Result<Self, Self::Error> {
        let mut qualifiers = BTreeMap::new();
        let mut location = JsonLocation::default();
        for (key, value) in feature.qualifiers {
            if key == "location" {
                location = serde_json::from_value(value)?;
            } else {
                qualifiers.insert(key, qualifier_values(value));
            }
        }
        Ok(GenomeFeature {
            kind: feature.kind,
            location: FeatureLocation {
                text: format!("[{}:{}](+)", location.start, location.stop),
                start: location.start,
                end: location.stop,
                strand: Some(1),
            },
            qualifiers,
        })
    }
}

impl TryFrom<JsonGenome> for GenomeRecord {
    type Error = serde_json::Error;

    fn try_from(genome: JsonGenome) -> std::result::Result<Self, Self::Error> {
        let features = genome
            .features
            .into_iter()
            .map(GenomeFeature::try_from)
            .collect::<std::result::Result<_, _>>()?;
        Ok(GenomeRecord {
            id: genome.id,
            description: genome.name,
            sequence: genome.sequence,
            taxonomy: genome.taxonomy,
            features,
            lineage: genome.lineage.map(|entries| {
                entries
                    .into_iter()
                    .map(|(taxonomy_id, name, rank)| LineageEntry { taxonomy_id, name, rank })
                    .collect()
            }),
        })
    }
}

pub fn parse_genome_json(text: &str) -> Result<GenomeRecord> {
    let genome: JsonGenome = serde_json::from_str(text)?;
    Ok(genome.try_into()?)
}

pub fn read_genome_json<P: AsRef<Path>>(path: P) -> Result<GenomeRecord> {
    let reader = BufReader::new(File::open(path)?);
    let genome: JsonGenome = serde_json::from_reader(reader)?;
    Ok(genome.try_into()?)
}
