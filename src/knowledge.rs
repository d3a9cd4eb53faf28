use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::{AgnoError, Result};
use crate::vectordb::{Distance, SearchType};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: None,
            content: content.into(),
            metadata: Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, document: Document, embedding: Vec<f32>) -> Result<()>;

    /// Returns up to `top_k` documents, best first. `query` is the raw text for keyword matching.
    async fn search(
        &self,
        query: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>>;
}

/// Basic whitespace tokenizer with hashed buckets for deterministic embeddings.
pub struct WhitespaceEmbedder {
    buckets: usize,
}

impl Default for WhitespaceEmbedder {
    fn default() -> Self {
        Self { buckets: 32 }
    }
}

impl WhitespaceEmbedder {
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets: buckets.max(1),
        }
    }
}

#[async_trait]
impl Embedder for WhitespaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.buckets];

        for token in tokens(text) {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.buckets;
            vector[idx] += 1.0;
        }

        Ok(vector)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Flat-scan store that ranks by the configured distance and search type.
pub struct InMemoryVectorStore {
    distance: Distance,
    search_type: SearchType,
    entries: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new(Distance::default())
    }
}

impl InMemoryVectorStore {
    pub fn new(distance: Distance) -> Self {
        Self {
            distance,
            search_type: SearchType::default(),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn with_search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn vector_score(&self, stored: &[f32], query: &[f32]) -> f32 {
        match self.distance {
            Distance::Cosine => cosine_similarity(stored, query),
            Distance::L2 => 1.0 / (1.0 + l2_distance(stored, query)),
            Distance::MaxInnerProduct => dot(stored, query),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, document: Document, embedding: Vec<f32>) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(dimensions) = entries.first().map(|(_, stored)| stored.len()) {
            if dimensions != embedding.len() {
                return Err(AgnoError::InvalidInput(format!(
                    "embedding has {} dimensions, store expects {dimensions}",
                    embedding.len()
                )));
            }
        }
        entries.retain(|(doc, _)| doc.id != document.id);
        entries.push((document, embedding));
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredDocument>> {
        let terms: HashSet<String> = tokens(query).collect();
        let entries = self.entries.read().await;
        let mut scored: Vec<ScoredDocument> = entries
            .iter()
            .filter_map(|(doc, stored)| {
                let score = match self.search_type {
                    SearchType::Vector => self.vector_score(stored, embedding),
                    SearchType::Keyword => {
                        let score = keyword_score(&terms, &doc.content);
                        if score == 0.0 {
                            return None;
                        }
                        score
                    }
                    SearchType::Hybrid => {
                        (self.vector_score(stored, embedding) + keyword_score(&terms, &doc.content))
                            / 2.0
                    }
                };
                Some(ScoredDocument {
                    document: doc.clone(),
                    score,
                })
            })
            .collect();

        sort_by_score(&mut scored);
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn sort_by_score(scored: &mut [ScoredDocument]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Fraction of query terms that occur in `content`.
fn keyword_score(terms: &HashSet<String>, content: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let present: HashSet<String> = tokens(content).collect();
    let hits = terms.iter().filter(|term| present.contains(*term)).count();
    hits as f32 / terms.len() as f32
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

pub struct KnowledgeBase<E: Embedder, S: VectorStore> {
    embedder: Arc<E>,
    store: Arc<S>,
}

impl<E: Embedder, S: VectorStore> KnowledgeBase<E, S> {
    pub fn new(embedder: Arc<E>, store: Arc<S>) -> Self {
        Self { embedder, store }
    }

    pub async fn add_document(&self, document: Document) -> Result<()> {
        let embedding = self.embedder.embed(&document.content).await?;
        self.store.insert(document, embedding).await
    }

    pub async fn load(&self, documents: impl IntoIterator<Item = Document>) -> Result<usize> {
        let mut loaded = 0;
        for document in documents {
            self.add_document(document).await?;
            loaded += 1;
        }
        tracing::info!(documents = loaded, "loaded knowledge base");
        Ok(loaded)
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredDocument>> {
        let embedding = self.embedder.embed(query).await?;
        self.store.search(query, &embedding, top_k).await
    }
}

/// Supplies text snippets relevant to a prompt.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>>;
}

#[async_trait]
impl<E, S> Retriever for KnowledgeBase<E, S>
where
    E: Embedder,
    S: VectorStore,
{
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<String>> {
        let docs = self.search(query, top_k).await?;
        Ok(docs.into_iter().map(|d| d.document.content).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipes() -> Vec<Document> {
        vec![
            Document::new("Green curry with coconut milk and basil").with_name("curry"),
            Document::new("Pad thai noodles with peanuts and lime").with_name("pad-thai"),
            Document::new("Mango sticky rice with coconut cream").with_name("dessert"),
        ]
    }

    async fn knowledge(store: InMemoryVectorStore) -> KnowledgeBase<WhitespaceEmbedder, InMemoryVectorStore> {
        let kb = KnowledgeBase::new(Arc::new(WhitespaceEmbedder::new(64)), Arc::new(store));
        kb.load(recipes()).await.unwrap();
        kb
    }

    #[tokio::test]
    async fn vector_search_ranks_closest_first() {
        let kb = knowledge(InMemoryVectorStore::default()).await;
        let hits = kb.search("pad thai noodles", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.name.as_deref(), Some("pad-thai"));
    }

    #[tokio::test]
    async fn keyword_search_skips_documents_without_terms() {
        let kb = knowledge(InMemoryVectorStore::default().with_search_type(SearchType::Keyword)).await;
        let hits = kb.search("coconut", 5).await.unwrap();
        let names: HashSet<String> = hits
            .into_iter()
            .filter_map(|hit| hit.document.name)
            .collect();
        assert_eq!(
            names,
            HashSet::from(["curry".to_string(), "dessert".to_string()])
        );
    }

    #[tokio::test]
    async fn hybrid_scores_stay_in_range() {
        let kb = knowledge(
            InMemoryVectorStore::new(Distance::L2).with_search_type(SearchType::Hybrid),
        )
        .await;
        let hits = kb.search("mango rice", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document.name.as_deref(), Some("dessert"));
        assert!(hits.iter().all(|hit| (0.0..=1.0).contains(&hit.score)));
    }

    #[tokio::test]
    async fn rejects_mismatched_dimensions() {
        let store = InMemoryVectorStore::default();
        store.insert(Document::new("a"), vec![1.0, 0.0]).await.unwrap();
        let err = store
            .insert(Document::new("b"), vec![1.0])
            .await
            .unwrap_err();
        assert!(matches!(err, AgnoError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn retriever_returns_document_text() {
        let kb = knowledge(InMemoryVectorStore::default()).await;
        let snippets = kb.retrieve("green curry basil", 1).await.unwrap();
        assert_eq!(snippets, vec!["Green curry with coconut milk and basil"]);
    }

    #[test]
    fn distance_scores_prefer_identical_vectors() {
        let a = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(l2_distance(&a, &a), 0.0);
        assert_eq!(dot(&a, &[1.0, 0.0, 0.0]), 1.0);
    }
}
