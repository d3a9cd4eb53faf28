//! Vector search strategy and index configuration.
//!
//! These types describe how a pgvector collection is searched and indexed. The
//! strategy enums are closed sets: every string form parses back to the same
//! variant and anything else is rejected.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AgnoError, Result};

/// Similarity metric between embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    #[default]
    Cosine,
    L2,
    MaxInnerProduct,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::L2 => "l2",
            Distance::MaxInnerProduct => "max_inner_product",
        }
    }

    /// pgvector operator class used when indexing with this metric.
    pub fn operator_class(&self) -> &'static str {
        match self {
            Distance::Cosine => "vector_cosine_ops",
            Distance::L2 => "vector_l2_ops",
            Distance::MaxInnerProduct => "vector_ip_ops",
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distance {
    type Err = AgnoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cosine" => Ok(Distance::Cosine),
            "l2" => Ok(Distance::L2),
            "max_inner_product" => Ok(Distance::MaxInnerProduct),
            other => Err(AgnoError::unknown_variant("distance", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Embedding similarity.
    #[default]
    Vector,
    /// Term matching on document text.
    Keyword,
    /// Both, with the scores combined.
    Hybrid,
}

impl SearchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchType::Vector => "vector",
            SearchType::Keyword => "keyword",
            SearchType::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchType {
    type Err = AgnoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "vector" => Ok(SearchType::Vector),
            "keyword" => Ok(SearchType::Keyword),
            "hybrid" => Ok(SearchType::Hybrid),
            other => Err(AgnoError::unknown_variant("search type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    Hnsw,
    Ivfflat,
    /// No approximate index; every row is scanned.
    Flat,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Hnsw => "hnsw",
            IndexType::Ivfflat => "ivfflat",
            IndexType::Flat => "flat",
        }
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexType {
    type Err = AgnoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hnsw" => Ok(IndexType::Hnsw),
            "ivfflat" => Ok(IndexType::Ivfflat),
            "flat" => Ok(IndexType::Flat),
            other => Err(AgnoError::unknown_variant("index type", other)),
        }
    }
}

fn default_index_configuration() -> BTreeMap<String, String> {
    BTreeMap::from([("maintenance_work_mem".to_string(), "2GB".to_string())])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswIndex {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_hnsw_m")]
    pub m: u32,
    #[serde(default = "default_ef_search")]
    pub ef_search: u32,
    #[serde(default = "default_ef_construction")]
    pub ef_construction: u32,
    /// Session settings applied before the index is built.
    #[serde(default = "default_index_configuration")]
    pub configuration: BTreeMap<String, String>,
}

fn default_hnsw_m() -> u32 {
    16
}

fn default_ef_search() -> u32 {
    5
}

fn default_ef_construction() -> u32 {
    200
}

impl Default for HnswIndex {
    fn default() -> Self {
        Self {
            name: None,
            m: default_hnsw_m(),
            ef_search: default_ef_search(),
            ef_construction: default_ef_construction(),
            configuration: default_index_configuration(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvfflatIndex {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_lists")]
    pub lists: u32,
    #[serde(default = "default_probes")]
    pub probes: u32,
    /// Derive `lists` from the row count instead of using the fixed value.
    #[serde(default = "default_dynamic_lists")]
    pub dynamic_lists: bool,
    #[serde(default = "default_index_configuration")]
    pub configuration: BTreeMap<String, String>,
}

fn default_lists() -> u32 {
    100
}

fn default_probes() -> u32 {
    10
}

fn default_dynamic_lists() -> bool {
    true
}

impl Default for IvfflatIndex {
    fn default() -> Self {
        Self {
            name: None,
            lists: default_lists(),
            probes: default_probes(),
            dynamic_lists: default_dynamic_lists(),
            configuration: default_index_configuration(),
        }
    }
}

impl IvfflatIndex {
    /// Lists to build for `rows` rows: `rows / 1000` past a million rows, else `sqrt(rows)`.
    pub fn lists_for(&self, rows: u64) -> u32 {
        if !self.dynamic_lists {
            return self.lists;
        }
        let lists = if rows > 1_000_000 {
            rows / 1000
        } else {
            (rows as f64).sqrt() as u64
        };
        lists.clamp(1, u32::MAX as u64) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VectorIndex {
    Hnsw(HnswIndex),
    Ivfflat(IvfflatIndex),
    Flat,
}

impl Default for VectorIndex {
    fn default() -> Self {
        VectorIndex::Hnsw(HnswIndex::default())
    }
}

impl VectorIndex {
    pub fn index_type(&self) -> IndexType {
        match self {
            VectorIndex::Hnsw(_) => IndexType::Hnsw,
            VectorIndex::Ivfflat(_) => IndexType::Ivfflat,
            VectorIndex::Flat => IndexType::Flat,
        }
    }
}

/// Settings for a pgvector-backed document collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PgVectorSettingsRecord")]
pub struct PgVectorSettings {
    table_name: String,
    schema: String,
    search_type: SearchType,
    index: VectorIndex,
    distance: Distance,
    db_url: String,
}

/// Wire form of [`PgVectorSettings`], validated through [`PgVectorSettings::new`].
#[derive(Deserialize)]
struct PgVectorSettingsRecord {
    table_name: String,
    db_url: String,
    #[serde(default = "default_schema")]
    schema: String,
    #[serde(default)]
    search_type: SearchType,
    #[serde(default)]
    index: VectorIndex,
    #[serde(default)]
    distance: Distance,
}

fn default_schema() -> String {
    "ai".into()
}

impl TryFrom<PgVectorSettingsRecord> for PgVectorSettings {
    type Error = AgnoError;

    fn try_from(record: PgVectorSettingsRecord) -> Result<Self> {
        Ok(PgVectorSettings::new(record.table_name, record.db_url)?
            .with_schema(record.schema)
            .with_search_type(record.search_type)
            .with_index(record.index)
            .with_distance(record.distance))
    }
}

impl PgVectorSettings {
    pub fn new(table_name: impl Into<String>, db_url: impl Into<String>) -> Result<Self> {
        let table_name = table_name.into();
        let db_url = db_url.into();
        if table_name.trim().is_empty() {
            return Err(AgnoError::InvalidInput("table name must be provided".into()));
        }
        if db_url.trim().is_empty() {
            return Err(AgnoError::InvalidInput("db_url must be provided".into()));
        }
        Ok(Self {
            table_name,
            schema: default_schema(),
            search_type: SearchType::default(),
            index: VectorIndex::default(),
            distance: Distance::default(),
            db_url,
        })
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    pub fn with_index(mut self, index: VectorIndex) -> Self {
        self.index = index;
        self
    }

    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    pub fn db_url(&self) -> &str {
        &self.db_url
    }

    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table_name)
    }

    fn index_name(&self, explicit: &Option<String>, kind: IndexType) -> String {
        explicit
            .clone()
            .unwrap_or_else(|| format!("{}_{}_index", self.table_name, kind))
    }

    /// SQL statements that build the vector index for a table holding `rows` rows.
    ///
    /// Returns no statements for a flat index.
    pub fn index_statements(&self, rows: u64) -> Vec<String> {
        let ops = self.distance.operator_class();
        let table = self.qualified_table();
        let (name, configuration, body, search_setting) = match &self.index {
            VectorIndex::Flat => return Vec::new(),
            VectorIndex::Hnsw(hnsw) => (
                self.index_name(&hnsw.name, IndexType::Hnsw),
                &hnsw.configuration,
                format!(
                    "USING hnsw (embedding {ops}) WITH (m = {}, ef_construction = {})",
                    hnsw.m, hnsw.ef_construction
                ),
                format!("SET hnsw.ef_search = {};", hnsw.ef_search),
            ),
            VectorIndex::Ivfflat(ivf) => (
                self.index_name(&ivf.name, IndexType::Ivfflat),
                &ivf.configuration,
                format!(
                    "USING ivfflat (embedding {ops}) WITH (lists = {})",
                    ivf.lists_for(rows)
                ),
                format!("SET ivfflat.probes = {};", ivf.probes),
            ),
        };

        let mut statements: Vec<String> = configuration
            .iter()
            .map(|(key, value)| format!("SET {key} TO '{value}';"))
            .collect();
        statements.push(search_setting);
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS \"{name}\" ON {table} {body};"
        ));
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_their_listed_values() {
        for value in ["cosine", "l2", "max_inner_product"] {
            assert_eq!(value.parse::<Distance>().unwrap().to_string(), value);
        }
        for value in ["vector", "keyword", "hybrid"] {
            assert_eq!(value.parse::<SearchType>().unwrap().to_string(), value);
        }
        for value in ["hnsw", "ivfflat", "flat"] {
            assert_eq!(value.parse::<IndexType>().unwrap().to_string(), value);
        }
    }

    #[test]
    fn enums_reject_unlisted_values() {
        assert!("manhattan".parse::<Distance>().is_err());
        assert!("fuzzy".parse::<SearchType>().is_err());
        assert!("HNSW".parse::<IndexType>().is_err());
        let err = serde_json::from_str::<SearchType>("\"semantic\"").unwrap_err();
        assert!(err.to_string().contains("semantic"));
    }

    #[test]
    fn serde_uses_the_same_strings() {
        assert_eq!(
            serde_json::to_string(&Distance::MaxInnerProduct).unwrap(),
            "\"max_inner_product\""
        );
        assert_eq!(
            serde_json::from_str::<IndexType>("\"ivfflat\"").unwrap(),
            IndexType::Ivfflat
        );
    }

    #[test]
    fn ivfflat_lists_follow_row_count() {
        let ivf = IvfflatIndex::default();
        assert_eq!(ivf.lists_for(0), 1);
        assert_eq!(ivf.lists_for(10_000), 100);
        assert_eq!(ivf.lists_for(2_000_000), 2000);
        let fixed = IvfflatIndex {
            dynamic_lists: false,
            ..IvfflatIndex::default()
        };
        assert_eq!(fixed.lists_for(2_000_000), 100);
    }

    #[test]
    fn settings_require_table_and_url() {
        assert!(PgVectorSettings::new("", "postgresql://ai:ai@localhost:5532/ai").is_err());
        assert!(PgVectorSettings::new("recipes", " ").is_err());
    }

    #[test]
    fn renders_default_hnsw_index() {
        let settings =
            PgVectorSettings::new("recipes", "postgresql+psycopg://ai:ai@localhost:5532/ai")
                .unwrap();
        assert_eq!(settings.schema(), "ai");
        assert_eq!(settings.search_type(), SearchType::Vector);
        assert_eq!(settings.index().index_type(), IndexType::Hnsw);

        let statements = settings.index_statements(0);
        assert_eq!(
            statements,
            vec![
                "SET maintenance_work_mem TO '2GB';".to_string(),
                "SET hnsw.ef_search = 5;".to_string(),
                "CREATE INDEX IF NOT EXISTS \"recipes_hnsw_index\" ON ai.recipes USING hnsw (embedding vector_cosine_ops) WITH (m = 16, ef_construction = 200);".to_string(),
            ]
        );
    }

    #[test]
    fn renders_ivfflat_with_l2_distance() {
        let settings = PgVectorSettings::new("docs", "postgresql://localhost/ai")
            .unwrap()
            .with_distance(Distance::L2)
            .with_index(VectorIndex::Ivfflat(IvfflatIndex {
                name: Some("docs_idx".into()),
                configuration: BTreeMap::new(),
                ..IvfflatIndex::default()
            }));
        let statements = settings.index_statements(400);
        assert_eq!(statements[0], "SET ivfflat.probes = 10;");
        assert_eq!(
            statements[1],
            "CREATE INDEX IF NOT EXISTS \"docs_idx\" ON ai.docs USING ivfflat (embedding vector_l2_ops) WITH (lists = 20);"
        );

        let flat = settings.with_index(VectorIndex::Flat);
        assert!(flat.index_statements(400).is_empty());
    }
}
