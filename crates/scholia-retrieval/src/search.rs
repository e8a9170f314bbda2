//! Ranked-search backend wire contract and HTTP client.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use scholia_core::config::RetrievalConfig;

use crate::error::RetrievalError;

/// A ranked-search request.
///
/// List filters are sent as repeated query parameters, one entry per value.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query_string: String,
    pub field_filters: Vec<String>,
    pub limit: usize,
    pub offset: usize,
    pub sort_option: String,
    pub search_type: String,
    pub min_citation_filter: u64,
    pub min_date_filter: i32,
    pub max_date_filter: i32,
    pub venue_filters: Vec<String>,
    pub survey_filter: Option<bool>,
}

impl SearchRequest {
    /// A relevancy-ranked request with the backend's default filters.
    pub fn ranked(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query_string: query.into(),
            field_filters: Vec::new(),
            limit,
            offset: 0,
            sort_option: "relevancy".to_string(),
            search_type: "default".to_string(),
            min_citation_filter: 0,
            min_date_filter: 1900,
            max_date_filter: 2999,
            venue_filters: Vec::new(),
            survey_filter: None,
        }
    }

    /// Flatten into `(key, value)` pairs, repeating keys for list filters.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("query_string", self.query_string.clone()),
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
            ("sort_option", self.sort_option.clone()),
            ("search_type", self.search_type.clone()),
            ("min_citation_filter", self.min_citation_filter.to_string()),
            ("min_date_filter", self.min_date_filter.to_string()),
            ("max_date_filter", self.max_date_filter.to_string()),
        ];
        for field in &self.field_filters {
            pairs.push(("field_filters", field.clone()));
        }
        for venue in &self.venue_filters {
            pairs.push(("venue_filters", venue.clone()));
        }
        if let Some(survey) = self.survey_filter {
            pairs.push(("survey_filter", survey.to_string()));
        }
        pairs
    }
}

/// One paper in a ranked-search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPaper {
    #[serde(rename = "neo4jID")]
    pub neo4j_id: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub n_citations: u64,
    #[serde(default)]
    pub field_list: Vec<String>,
    #[serde(default)]
    pub publication_date: String,
}

/// A ranked-search response page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub papers: Vec<SearchPaper>,
    #[serde(rename = "hasNext", default)]
    pub has_next: bool,
    #[serde(default)]
    pub total: u64,
    /// Result counts per publication year.
    #[serde(default)]
    pub statistics: BTreeMap<String, u64>,
}

/// Ranked-search backend.
#[async_trait::async_trait]
pub trait SearchGateway: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RetrievalError>;
}

/// HTTP client for the ranked-search backend.
pub struct HttpSearchGateway {
    client: Client,
    base_url: String,
}

impl HttpSearchGateway {
    pub fn new(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl SearchGateway for HttpSearchGateway {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, RetrievalError> {
        debug!(query = %request.query_string, limit = request.limit, "Ranked search requested");

        let resp = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&request.to_query_pairs())
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(RetrievalError::Api { status, message });
        }

        Ok(resp.json().await?)
    }
}
