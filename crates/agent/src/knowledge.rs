use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgePassage {
    pub source: String,
    pub page: Option<u32>,
    pub content: String,
}

/// Read-only passage search over library documents.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgePassage>>;
}

/// No document index is configured; every search returns nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableKnowledgeBase;

#[async_trait]
impl KnowledgeBase for UnavailableKnowledgeBase {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<KnowledgePassage>> {
        Ok(Vec::new())
    }
}
