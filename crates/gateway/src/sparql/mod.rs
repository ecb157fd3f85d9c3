use annotations::sparql::SelectResults;
use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use tracing::trace;

use crate::config::MicoConfig;

const SPARQL_QUERY_CONTENT_TYPE: &str = "application/sparql-query;charset=UTF-8";
const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const TAB_SEPARATED_VALUES: &str = "text/tab-separated-values";

/// Posts SELECT statements to Marmotta's SPARQL endpoint.
#[derive(Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    select_url: String,
    username: String,
    password: String,
}

impl QueryClient {
    pub fn new(config: &MicoConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(QueryClient {
            http,
            select_url: config.sparql_select_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn query(&self, statement: &str, accept: &str) -> Result<String> {
        trace!(%statement, accept, "Posting SPARQL query");
        let response = self
            .http
            .post(&self.select_url)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, SPARQL_QUERY_CONTENT_TYPE)
            .header(ACCEPT, accept)
            .body(statement.to_string())
            .send()
            .await
            .with_context(|| format!("SPARQL request failed [ url: {} ]", self.select_url))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("SPARQL endpoint error [ url: {} ]: {} - {}", self.select_url, status, text);
        }
        Ok(text)
    }

    /// Runs a SELECT and parses the JSON results.
    pub async fn select(&self, statement: &str) -> Result<SelectResults> {
        let body = self.query(statement, SPARQL_RESULTS_JSON).await?;
        SelectResults::from_json(&body)
            .with_context(|| format!("Invalid SPARQL results: {}", body))
    }

    /// Runs a SELECT and returns the raw tab-separated answer.
    pub async fn select_tsv(&self, statement: &str) -> Result<String> {
        self.query(statement, TAB_SEPARATED_VALUES).await
    }
}
