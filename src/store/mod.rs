//! Data-store boundary. The pipeline treats the store purely as a query
//! executor over a pre-existing analytical schema (base table plus
//! precomputed aggregate views); it never manages that schema's lifecycle.

pub mod duckdb_store;

use crate::synth::QueryPlan;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Connection(String),
    Query(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "store connection error: {}", msg),
            StoreError::Query(msg) => write!(f, "query error: {}", msg),
        }
    }
}

impl Error for StoreError {}

/// Semantic column classification driving chart selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Numeric,
    Categorical,
    Temporal,
    Text,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub semantic: SemanticType,
}

/// A single result value. Temporal values are carried as ISO-formatted
/// strings; the semantic type on the column records that they are dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Temporal(String),
}

impl Cell {
    fn semantic(&self) -> Option<SemanticType> {
        match self {
            Cell::Null => None,
            Cell::Bool(_) => Some(SemanticType::Categorical),
            Cell::Int(_) | Cell::Float(_) => Some(SemanticType::Numeric),
            Cell::Text(_) => Some(SemanticType::Categorical),
            Cell::Temporal(_) => Some(SemanticType::Temporal),
        }
    }
}

/// Read-only once created.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<Cell>>,
    pub row_count: usize,
}

impl ResultSet {
    /// Builds a result set from raw rows, inferring each column's semantic
    /// type from its values and its name.
    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let columns = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value_semantic = rows
                    .iter()
                    .find_map(|row| row.get(i).and_then(Cell::semantic))
                    .unwrap_or(SemanticType::Text);
                ColumnMeta {
                    name: name.clone(),
                    semantic: infer_semantic(name, value_semantic),
                }
            })
            .collect();
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
        }
    }
}

/// Column-name words that mark a column as temporal even when its values
/// are plain integers (a `year` column is an axis, not a measure).
const TEMPORAL_NAME_WORDS: &[&str] = &[
    "year", "ano", "month", "mes", "date", "data", "day", "dia", "time", "timestamp",
];

/// Name-aware semantic classification.
pub fn infer_semantic(name: &str, value_semantic: SemanticType) -> SemanticType {
    if value_semantic == SemanticType::Temporal {
        return SemanticType::Temporal;
    }
    let lowered = name.to_lowercase();
    let named_temporal = lowered
        .split('_')
        .any(|word| TEMPORAL_NAME_WORDS.contains(&word));
    if named_temporal {
        SemanticType::Temporal
    } else {
        value_semantic
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Known-schema summary: table/view name (qualified outside `main`) to its
/// column definitions. Doubles as the validation allow-list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaCatalog {
    pub objects: BTreeMap<String, Vec<ColumnDef>>,
}

impl SchemaCatalog {
    pub fn object_names(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    /// Markdown-ish schema context handed to the generation backend.
    pub fn summary(&self) -> String {
        let mut out = String::from("# DATABASE SCHEMA\n\n");
        if self.objects.is_empty() {
            out.push_str("No tables found.\n");
            return out;
        }
        for (name, columns) in &self.objects {
            out.push_str(&format!("## {}\n", name));
            for col in columns {
                out.push_str(&format!(
                    "- {} ({}{})\n",
                    col.name,
                    col.data_type,
                    if col.nullable { ", nullable" } else { "" }
                ));
            }
            out.push('\n');
        }
        out
    }
}

/// External query executor over the analytical schema.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn execute(&self, plan: &QueryPlan) -> Result<ResultSet, StoreError>;
    async fn schema(&self) -> Result<SchemaCatalog, StoreError>;
    /// Distinct values of a categorical column, for the slot extractors.
    async fn distinct_values(&self, object: &str, column: &str) -> Result<Vec<String>, StoreError>;
}
