//! Web content fetching
//!
//! Single and bounded-concurrent HTTP fetches with content-type filtering,
//! size truncation, and formatted text reports.

use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{DataMcpError, DomainError, ResourceError, Result};
use crate::modules::web::html::strip_html;

/// Upper bound on URLs per multi-fetch call
pub const MAX_URLS: usize = 10;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_LENGTH: usize = 50_000;
const MULTI_FETCH_MAX_LENGTH: usize = 10_000;

const TRUNCATION_MARKER: &str = "\n\n[Content truncated...]";

/// Options for a single fetch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOptions {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    pub user_agent: Option<String>,
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    #[serde(default)]
    pub include_headers: bool,
    #[serde(default = "default_true")]
    pub text_only: bool,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_MS,
            user_agent: None,
            follow_redirects: true,
            include_headers: false,
            text_only: true,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// Options for a multi-URL fetch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiFetchOptions {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_true")]
    pub text_only: bool,
    #[serde(default = "default_multi_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub include_failures: bool,
}

impl Default for MultiFetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_MS,
            text_only: true,
            max_length: MULTI_FETCH_MAX_LENGTH,
            include_failures: false,
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_multi_max_length() -> usize {
    MULTI_FETCH_MAX_LENGTH
}

struct FetchOutcome {
    url: String,
    content: std::result::Result<String, String>,
}

/// HTTP fetcher shared by the web tools
pub struct WebFetcher {
    client: reqwest::Client,
    user_agent: String,
    max_page_size: usize,
}

impl WebFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.web_connection_timeout_ms))
            .timeout(Duration::from_millis(config.web_read_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            user_agent: config.web_user_agent.clone(),
            max_page_size: config.web_max_page_size_bytes as usize,
        })
    }

    fn effective_user_agent<'a>(&'a self, options: &'a FetchOptions) -> &'a str {
        options.user_agent.as_deref().unwrap_or(&self.user_agent)
    }

    /// Fetch one URL and format the result as a text report.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.effective_user_agent(options))
            .timeout(Duration::from_millis(options.timeout))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataMcpError::Resource(ResourceError::HttpStatus {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            }));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !is_supported_content_type(&content_type) {
            return Err(DataMcpError::Resource(ResourceError::UnsupportedContentType {
                content_type,
            }));
        }

        let headers_block = options.include_headers.then(|| {
            let mut block = String::from("Response Headers:\n");
            for (name, value) in response.headers() {
                block.push_str(&format!("{}: {}\n", name, value.to_str().unwrap_or_default()));
            }
            block.push('\n');
            block
        });

        let mut body = response.text().await?;
        if body.len() > self.max_page_size {
            body = body.chars().take(self.max_page_size).collect();
        }

        let mut content = if options.text_only && content_type.contains("text/html") {
            strip_html(&body)
        } else {
            body
        };
        content = truncate_content(&content, options.max_length);

        debug!(url, chars = content.len(), "Fetched URL");

        let mut result = String::new();
        result.push_str(&format!("URL: {url}\n"));
        result.push_str(&format!(
            "Status: {} {}\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        ));
        result.push_str(&format!("Content-Type: {content_type}\n"));
        result.push_str(&format!("Content Length: {} characters\n\n", content.chars().count()));
        if let Some(headers) = headers_block {
            result.push_str(&headers);
        }
        result.push_str(&format!("Content:\n{content}"));
        Ok(result)
    }

    /// Fetch up to [`MAX_URLS`] URLs concurrently, aggregating results in
    /// input order.
    pub async fn fetch_multiple(&self, urls: &[String], options: &MultiFetchOptions) -> Result<String> {
        if urls.len() > MAX_URLS {
            return Err(DataMcpError::Domain(DomainError::TooManyUrls { max: MAX_URLS }));
        }

        let fetches = urls.iter().map(|url| {
            let fetch_options = FetchOptions {
                timeout: options.timeout,
                user_agent: None,
                follow_redirects: true,
                include_headers: false,
                text_only: options.text_only,
                max_length: options.max_length,
            };
            async move {
                match self.fetch(url, &fetch_options).await {
                    Ok(content) => FetchOutcome {
                        url: url.clone(),
                        content: Ok(content),
                    },
                    Err(err) => FetchOutcome {
                        url: url.clone(),
                        content: Err(err.to_string()),
                    },
                }
            }
        });

        let outcomes = join_all(fetches).await;
        Ok(format_multi_results(&outcomes, options.include_failures))
    }

    /// Fetch a page's raw HTML, returning the body and fetch duration.
    pub async fn fetch_html(&self, url: &str) -> Result<(String, u64)> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataMcpError::Resource(ResourceError::HttpStatus {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            }));
        }

        let body = response.text().await?;
        Ok((body, start.elapsed().as_millis() as u64))
    }
}

fn is_supported_content_type(content_type: &str) -> bool {
    content_type.contains("text/html")
        || content_type.contains("text/plain")
        || content_type.contains("application/json")
}

/// Truncate to `max_length` characters, appending the truncation marker when
/// anything was cut.
fn truncate_content(content: &str, max_length: usize) -> String {
    if content.chars().count() > max_length {
        let head: String = content.chars().take(max_length).collect();
        format!("{head}{TRUNCATION_MARKER}")
    } else {
        content.to_string()
    }
}

fn format_multi_results(outcomes: &[FetchOutcome], include_failures: bool) -> String {
    let mut output = format!("Fetched {} URLs:\n\n", outcomes.len());

    for (index, outcome) in outcomes.iter().enumerate() {
        match &outcome.content {
            Ok(content) => {
                output.push_str(&format!("=== URL {}: {} ===\n", index + 1, outcome.url));
                output.push_str(content);
                output.push_str("\n\n");
            }
            Err(error) if include_failures => {
                output.push_str(&format!("=== URL {}: {} (FAILED) ===\n", index + 1, outcome.url));
                output.push_str(&format!("Error: {error}\n\n"));
            }
            Err(_) => {}
        }
    }

    let success_count = outcomes.iter().filter(|o| o.content.is_ok()).count();
    output.push_str(&format!(
        "Summary: {}/{} URLs fetched successfully",
        success_count,
        outcomes.len()
    ));
    output
}
