//! Paper retrieval for grounding.
//!
//! Combines the ranked-search backend with the knowledge-graph full-text
//! resolver to produce the ordered paper set consumed by the context
//! assembler.

use std::sync::Arc;

use tracing::debug;

use scholia_core::RetrievedPaper;

use crate::error::RetrievalError;
use crate::search::{SearchGateway, SearchRequest};

/// Optional constraints applied to every retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalFilters {
    pub fields: Vec<String>,
    pub venues: Vec<String>,
    pub min_citations: u64,
    pub min_date: i32,
    pub max_date: i32,
    pub survey: Option<bool>,
}

impl Default for RetrievalFilters {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            venues: Vec::new(),
            min_citations: 0,
            min_date: 1900,
            max_date: 2999,
            survey: None,
        }
    }
}

/// Resolves a paper's full text from the knowledge-graph collaborator.
///
/// The knowledge-graph query layer itself is an external collaborator; this
/// trait is the only contract the retrieval pipeline relies on.
#[async_trait::async_trait]
pub trait FullTextResolver: Send + Sync {
    async fn full_text(&self, paper_id: &str) -> Result<Option<String>, RetrievalError>;
}

/// Supplies ranked, full-text-resolved papers for a keyword query.
#[async_trait::async_trait]
pub trait PaperSource: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        filters: &RetrievalFilters,
        limit: usize,
    ) -> Result<Vec<RetrievedPaper>, RetrievalError>;
}

/// Default [`PaperSource`]: ranked search plus full-text resolution.
pub struct PaperRetriever {
    search: Arc<dyn SearchGateway>,
    texts: Arc<dyn FullTextResolver>,
}

impl PaperRetriever {
    pub fn new(search: Arc<dyn SearchGateway>, texts: Arc<dyn FullTextResolver>) -> Self {
        Self { search, texts }
    }
}

#[async_trait::async_trait]
impl PaperSource for PaperRetriever {
    async fn retrieve(
        &self,
        query: &str,
        filters: &RetrievalFilters,
        limit: usize,
    ) -> Result<Vec<RetrievedPaper>, RetrievalError> {
        let mut request = SearchRequest::ranked(query, limit);
        request.field_filters = filters.fields.clone();
        request.venue_filters = filters.venues.clone();
        request.min_citation_filter = filters.min_citations;
        request.min_date_filter = filters.min_date;
        request.max_date_filter = filters.max_date;
        request.survey_filter = filters.survey;

        let response = self.search.search(&request).await?;
        debug!(query, hits = response.papers.len(), "Retrieval completed");

        let mut papers = Vec::with_capacity(response.papers.len().min(limit));
        for hit in response.papers.into_iter().take(limit) {
            let full_text = self.texts.full_text(&hit.neo4j_id).await?;
            papers.push(RetrievedPaper {
                id: hit.neo4j_id,
                title: hit.title,
                full_text,
            });
        }
        Ok(papers)
    }
}
