//! Upstream Dataset Source
//!
//! The reporting service publishes one CSV report per table per day. A
//! report that is not yet published answers 404.

use std::time::Duration;
use chrono::{Local, NaiveDate};

use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use crate::reload::TableSchema;

/// Longest body excerpt kept in error messages
const BODY_EXCERPT_LEN: usize = 200;

/// Raw answer from the upstream service
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl UpstreamResponse {
    /// Accept only a 200 with a non-empty body
    pub fn check_status(&self, table: &TableSchema) -> Result<()> {
        match self.status {
            200 if self.body.trim().is_empty() => Err(Error::UpstreamFetchFailed(format!(
                "no data returned for {}",
                table
            ))),
            200 => Ok(()),
            404 => Err(Error::UpstreamFetchFailed(format!(
                "{} report is not available yet",
                table
            ))),
            status => Err(Error::UpstreamFetchFailed(format!(
                "status {} returned for {} query: {}",
                status,
                table,
                self.body_excerpt()
            ))),
        }
    }

    /// Reject error pages served with a 200
    pub fn check_content_type(&self) -> Result<()> {
        match &self.content_type {
            Some(ct) if ct.to_ascii_lowercase().contains("html") => Err(Error::UpstreamFetchFailed(
                format!("unexpected content-type {} returned", ct),
            )),
            _ => Ok(()),
        }
    }

    fn body_excerpt(&self) -> &str {
        let body = self.body.trim();
        match body.char_indices().nth(BODY_EXCERPT_LEN) {
            Some((idx, _)) => &body[..idx],
            None => body,
        }
    }
}

/// Anything that can produce a table's dataset
#[async_trait::async_trait]
pub trait DatasetSource: Send + Sync {
    /// Short source name, used in archive file names
    fn name(&self) -> &str;

    async fn fetch(&self, table: &TableSchema) -> Result<UpstreamResponse>;
}

/// Reporting service reached over HTTP
pub struct HttpDatasetSource {
    config: UpstreamConfig,
    client: reqwest::Client,
}

impl HttpDatasetSource {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Report URL for `table` on `date`
    pub fn report_url(&self, table: &TableSchema, date: NaiveDate) -> String {
        let c = &self.config;
        let mut path = String::new();
        for segment in [&c.path, &c.network, &c.api_name] {
            let segment = segment.trim_matches('/');
            if !segment.is_empty() {
                path.push('/');
                path.push_str(segment);
            }
        }

        let mut params = Vec::new();
        if let Some(auth) = &c.auth_address {
            params.push(format!("auth={}", auth));
        }
        params.push(format!("client={}", c.client_name));
        params.push(format!("date={}", date.format("%Y%m%d")));
        params.push(format!("reportName={}", table.name.to_ascii_lowercase()));
        params.push(format!("type={}", c.report_type));

        format!("http://{}:{}{}?{}", c.host, c.port, path, params.join(";"))
    }
}

#[async_trait::async_trait]
impl DatasetSource for HttpDatasetSource {
    fn name(&self) -> &str {
        &self.config.source_name
    }

    async fn fetch(&self, table: &TableSchema) -> Result<UpstreamResponse> {
        let url = self.report_url(table, Local::now().date_naive());
        tracing::debug!("GET {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/csv");
        if let Some(user) = &self.config.user {
            request = request.basic_auth(user, self.config.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::UpstreamFetchFailed(format!("request to {} failed: {}", self.config.host, e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        tracing::debug!(
            "STATUS: {} content-type={} length={}",
            status,
            content_type.as_deref().unwrap_or("-"),
            body.len()
        );

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
