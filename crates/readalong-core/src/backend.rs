//! HTTP access to the read-along service.

use crate::search::ServerMatch;
use crate::token::ReadAlongPage;
use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    pub track_id: String,
    pub voice_id: String,
    /// `None` fetches the whole document.
    pub page: Option<usize>,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageInfoRequest {
    pub track_id: String,
    pub voice_id: String,
    pub time: f64,
    pub page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub track_id: String,
    pub voice_id: String,
    pub query: String,
    pub page_size: usize,
}

/// The three endpoints the engine talks to. Implementations are called from
/// worker threads.
pub trait ReadAlongBackend: Send + Sync {
    fn fetch_content(&self, request: &ContentRequest) -> Result<ReadAlongPage>;
    fn page_for_time(&self, request: &PageInfoRequest) -> Result<usize>;
    fn search(&self, query: &SearchQuery) -> Result<Vec<ServerMatch>>;
}

#[derive(Debug, Deserialize)]
struct PageInfoResponse {
    current_page: usize,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    voice_id: &'a str,
    page_size: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<ServerMatch>,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid backend URL {base_url}"))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, base_url })
    }

    fn track_url(&self, track_id: &str, tail: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("Backend URL {} cannot hold a path", self.base_url))?
            .pop_if_empty()
            .extend(["api", "tracks", track_id])
            .extend(tail);
        Ok(url)
    }
}

impl ReadAlongBackend for HttpBackend {
    fn fetch_content(&self, request: &ContentRequest) -> Result<ReadAlongPage> {
        let mut url = self.track_url(&request.track_id, &["read-along", &request.voice_id])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(page) = request.page {
                query.append_pair("page", &page.to_string());
            }
            query.append_pair("page_size", &request.page_size.to_string());
        }
        debug!(%url, "Fetching read-along content");
        self.client
            .get(url.clone())
            .send()
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("GET {url}"))?
            .json::<ReadAlongPage>()
            .with_context(|| format!("Invalid read-along payload from {url}"))
    }

    fn page_for_time(&self, request: &PageInfoRequest) -> Result<usize> {
        let mut url = self.track_url(&request.track_id, &["page-info"])?;
        url.query_pairs_mut()
            .append_pair("time", &format!("{:.3}", request.time))
            .append_pair("voice_id", &request.voice_id)
            .append_pair("page_size", &request.page_size.to_string());
        let info = self
            .client
            .get(url.clone())
            .send()
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("GET {url}"))?
            .json::<PageInfoResponse>()
            .with_context(|| format!("Invalid page-info payload from {url}"))?;
        Ok(info.current_page)
    }

    fn search(&self, query: &SearchQuery) -> Result<Vec<ServerMatch>> {
        let url = self.track_url(&query.track_id, &["search"])?;
        let body = SearchBody {
            query: &query.query,
            voice_id: &query.voice_id,
            page_size: query.page_size,
        };
        let response = self
            .client
            .post(url.clone())
            .json(&body)
            .send()
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("POST {url}"))?
            .json::<SearchResponse>()
            .with_context(|| format!("Invalid search payload from {url}"))?;
        Ok(response.matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_urls_are_built_from_segments() {
        let backend = HttpBackend::new("http://localhost:8000/", Duration::from_secs(5), "test")
            .expect("backend");
        let url = backend
            .track_url("book 1", &["read-along", "af_heart"])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/tracks/book%201/read-along/af_heart"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(HttpBackend::new("not a url", Duration::from_secs(1), "test").is_err());
    }

    #[test]
    fn search_response_tolerates_missing_matches() {
        let parsed: SearchResponse = serde_json::from_str("{}").expect("parse");
        assert!(parsed.matches.is_empty());
        let parsed: SearchResponse =
            serde_json::from_str(r#"{"matches":[{"word_index":612,"page":1}]}"#).expect("parse");
        assert_eq!(parsed.matches, vec![ServerMatch { word_index: 612, page: 1 }]);
    }
}
