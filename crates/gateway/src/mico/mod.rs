use anyhow::{Context, Result};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::MicoConfig;

const INJECT_CREATE_PATH: &str = "inject/create";
const INJECT_ADD_PATH: &str = "inject/add";
const INJECT_SUBMIT_PATH: &str = "inject/submit";
const STATUS_ITEMS_PATH: &str = "status/items";

/// Property holding the new URI in both the create and the add responses.
const ITEM_URI: &str = "itemUri";

/// The MICO type every uploaded asset is injected as.
pub const MICO_VIDEO_TYPE: &str = "mico:Video";

/// A resource MICO created for us: its URI and the id at the end of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub uri: String,
    pub uuid: String,
}

impl CreatedResource {
    fn from_uri(uri: String) -> Self {
        let uuid = uuid_from_uri(&uri).to_string();
        CreatedResource { uri, uuid }
    }
}

/// One entry of `status/items`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemStatus {
    #[serde(default)]
    pub finished: bool,
    pub uri: Option<String>,
    pub time: Option<String>,
    #[serde(default)]
    pub parts: Vec<PartStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartStatus {
    pub title: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub transitions: Vec<Value>,
    pub created: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "type")]
    pub part_type: Option<String>,
    pub uri: Option<String>,
    pub creator: Option<String>,
}

/// Last `/`-separated segment of a MICO URI.
pub fn uuid_from_uri(uri: &str) -> &str {
    uri.trim_end_matches('/').rsplit('/').next().unwrap_or(uri)
}

/// Client for the MICO broker's inject and status APIs.
#[derive(Clone)]
pub struct MicoClient {
    http: reqwest::Client,
    broker_url: String,
    username: String,
    password: String,
    route_id: String,
}

impl MicoClient {
    pub fn new(config: &MicoConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(MicoClient {
            http,
            broker_url: config.broker_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            route_id: config.route_id.clone(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let raw = format!("{}{}", self.broker_url, path);
        let url = if query.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, query)
        };
        url.with_context(|| format!("Invalid broker URL: {}", raw))
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<(Body, Option<u64>)>,
    ) -> Result<String> {
        let mut request = self
            .http
            .request(method, url.clone())
            .basic_auth(&self.username, Some(&self.password));
        if let Some((body, length)) = body {
            if let Some(length) = length {
                request = request.header(CONTENT_LENGTH, length);
            }
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Request to MICO failed [ url: {} ]", url))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("MICO API error [ url: {} ]: {} - {}", url, status, text);
        }
        Ok(text)
    }

    /// Reads the `itemUri` property MICO answers create and add calls with.
    fn created_uri(url: &Url, body: &str) -> Result<CreatedResource> {
        let node: Value = serde_json::from_str(body)
            .with_context(|| format!("Invalid JSON from MICO [ url: {} ]: {}", url, body))?;
        let uri = node
            .get(ITEM_URI)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid response from MICO [ url: {} ]: missing {} in {}",
                    url,
                    ITEM_URI,
                    body
                )
            })?;
        Ok(CreatedResource::from_uri(uri.to_string()))
    }

    /// `POST inject/create`: a new, empty content item.
    pub async fn create_item(&self) -> Result<CreatedResource> {
        let url = self.url(INJECT_CREATE_PATH, &[])?;
        debug!(%url, "Creating item");
        let body = self.send(Method::POST, url.clone(), None).await?;
        Self::created_uri(&url, &body)
    }

    /// `POST inject/add`: uploads `content` as a new part of the item.
    pub async fn add_part(
        &self,
        item_uri: &str,
        mico_type: &str,
        name: &str,
        content: Body,
        content_length: Option<u64>,
    ) -> Result<CreatedResource> {
        let url = self.url(
            INJECT_ADD_PATH,
            &[(ITEM_URI, item_uri), ("type", mico_type), ("name", name)],
        )?;
        debug!(%url, ?content_length, "Creating part");
        let body = self
            .send(Method::POST, url.clone(), Some((content, content_length)))
            .await?;
        Self::created_uri(&url, &body)
    }

    /// `POST inject/submit`: starts processing the item on the configured route.
    pub async fn submit(&self, item_uri: &str) -> Result<()> {
        let url = self.url(
            INJECT_SUBMIT_PATH,
            &[("item", item_uri), ("route", self.route_id.as_str())],
        )?;
        debug!(%url, "Submitting item");
        let body = self.send(Method::POST, url, None).await?;
        debug!(response = %body, "Submit response");
        Ok(())
    }

    /// `GET status/items`.
    pub async fn check_status(&self, item_uri: &str, parts: bool) -> Result<Vec<ItemStatus>> {
        let url = self.url(
            STATUS_ITEMS_PATH,
            &[("uri", item_uri), ("parts", if parts { "true" } else { "false" })],
        )?;
        debug!(%url, "Checking status");
        let body = self.send(Method::GET, url.clone(), None).await?;
        serde_json::from_str(&body)
            .with_context(|| format!("Invalid status response [ url: {} ]: {}", url, body))
    }
}
