//! Web module
//!
//! Tools for fetching and processing web content: single and multi URL
//! fetching, link extraction, and page analysis.

pub mod fetcher;
pub mod html;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::Config;
use crate::error::{DataMcpError, DomainError, Result};
use crate::mcp::dispatch::{handler, ToolSpec};
use crate::mcp::types::CallToolResult;
use crate::modules::{parse_args, Module, ModuleConfig};

use self::fetcher::{FetchOptions, MultiFetchOptions, WebFetcher};
use self::html::{LinkExtractionOptions, PageAnalysisOptions};

const MODULE_NAME: &str = "web-module";
const MODULE_VERSION: &str = "1.0.0";
const MODULE_DESCRIPTION: &str = "Web scraping and URL content fetching tools";

pub struct WebModule {
    fetcher: Arc<WebFetcher>,
}

impl WebModule {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            fetcher: Arc::new(WebFetcher::new(config)?),
        })
    }
}

impl Module for WebModule {
    fn config(&self) -> ModuleConfig {
        ModuleConfig::new(MODULE_NAME, MODULE_VERSION, MODULE_DESCRIPTION)
    }

    fn tools(&self) -> Vec<ToolSpec> {
        vec![
            fetch_url_tool(&self.fetcher),
            fetch_multiple_urls_tool(&self.fetcher),
            extract_links_tool(&self.fetcher),
            analyze_webpage_tool(&self.fetcher),
        ]
    }
}

fn fetch_url_tool(fetcher: &Arc<WebFetcher>) -> ToolSpec {
    let fetcher = Arc::clone(fetcher);
    ToolSpec::new(
        "fetch_url",
        "Fetch and extract content from a single web URL with comprehensive options",
        fetch_url_schema(),
        handler(move |args| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                #[derive(Deserialize)]
                struct Args {
                    url: String,
                    options: Option<FetchOptions>,
                }

                let args: Args = parse_args(args)?;
                let options = args.options.unwrap_or_default();
                let content = fetcher.fetch(&args.url, &options).await?;
                Ok(CallToolResult::text(content))
            }
        }),
    )
}

fn fetch_multiple_urls_tool(fetcher: &Arc<WebFetcher>) -> ToolSpec {
    let fetcher = Arc::clone(fetcher);
    ToolSpec::new(
        "fetch_multiple_urls",
        "Fetch content from multiple URLs concurrently with aggregated results",
        fetch_multiple_urls_schema(),
        handler(move |args| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                #[derive(Deserialize)]
                struct Args {
                    urls: Vec<String>,
                    options: Option<MultiFetchOptions>,
                }

                let args: Args = parse_args(args)?;
                let options = args.options.unwrap_or_default();
                let report = fetcher.fetch_multiple(&args.urls, &options).await?;
                Ok(CallToolResult::text(report))
            }
        }),
    )
}

fn extract_links_tool(fetcher: &Arc<WebFetcher>) -> ToolSpec {
    let fetcher = Arc::clone(fetcher);
    ToolSpec::new(
        "extract_links",
        "Extract and filter links from web pages with advanced filtering options",
        extract_links_schema(),
        handler(move |args| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Options {
                    #[serde(default = "default_filter")]
                    filter: String,
                    #[serde(default = "default_true")]
                    include_text: bool,
                    #[serde(default = "default_true")]
                    unique: bool,
                    #[serde(default = "default_max_links")]
                    max_links: usize,
                }

                #[derive(Deserialize)]
                struct Args {
                    url: String,
                    options: Option<Options>,
                }

                let args: Args = parse_args(args)?;
                let base = parse_url(&args.url)?;
                let options = args
                    .options
                    .map(|o| LinkExtractionOptions {
                        filter: o.filter,
                        include_text: o.include_text,
                        unique: o.unique,
                        max_links: o.max_links,
                    })
                    .unwrap_or_default();

                let (body, _) = fetcher.fetch_html(&args.url).await?;
                let links = html::extract_links(&body, &base, &options);
                Ok(CallToolResult::text(html::format_links_result(
                    &args.url,
                    &links,
                    &options.filter,
                    options.include_text,
                )))
            }
        }),
    )
}

fn analyze_webpage_tool(fetcher: &Arc<WebFetcher>) -> ToolSpec {
    let fetcher = Arc::clone(fetcher);
    ToolSpec::new(
        "analyze_webpage",
        "Comprehensive web page analysis including metadata, structure, and performance",
        analyze_webpage_schema(),
        handler(move |args| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                #[derive(Deserialize)]
                struct Analysis {
                    #[serde(default = "default_true")]
                    metadata: bool,
                    #[serde(default = "default_true")]
                    structure: bool,
                    #[serde(default)]
                    images: bool,
                    #[serde(default)]
                    performance: bool,
                }

                #[derive(Deserialize)]
                struct Args {
                    url: String,
                    analysis: Option<Analysis>,
                }

                let args: Args = parse_args(args)?;
                let base = parse_url(&args.url)?;
                let options = args
                    .analysis
                    .map(|a| PageAnalysisOptions {
                        metadata: a.metadata,
                        structure: a.structure,
                        images: a.images,
                        performance: a.performance,
                    })
                    .unwrap_or_default();

                let (body, load_time_ms) = fetcher.fetch_html(&args.url).await?;
                Ok(CallToolResult::text(html::analyze_page(
                    &body,
                    &args.url,
                    &base,
                    load_time_ms,
                    &options,
                )))
            }
        }),
    )
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|_| {
        DataMcpError::Domain(DomainError::InvalidUrl {
            url: url.to_string(),
        })
    })
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "all".to_string()
}

fn default_max_links() -> usize {
    100
}

// JSON Schemas (Draft-07)

fn fetch_url_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "url": {
                "type": "string",
                "description": "The URL to fetch",
                "format": "uri"
            },
            "options": {
                "type": "object",
                "description": "Fetch options",
                "properties": {
                    "timeout": {
                        "type": "integer",
                        "description": "Request timeout in milliseconds",
                        "default": 10000
                    },
                    "userAgent": {
                        "type": "string",
                        "description": "User-Agent header to send"
                    },
                    "followRedirects": {
                        "type": "boolean",
                        "description": "Whether to follow HTTP redirects",
                        "default": true
                    },
                    "includeHeaders": {
                        "type": "boolean",
                        "description": "Whether to include response headers in the output",
                        "default": false
                    },
                    "textOnly": {
                        "type": "boolean",
                        "description": "Whether to strip HTML tags and return only text content",
                        "default": true
                    },
                    "maxLength": {
                        "type": "integer",
                        "description": "Maximum length of the content to return",
                        "default": 50000
                    }
                }
            }
        },
        "required": ["url"]
    })
}

fn fetch_multiple_urls_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "urls": {
                "type": "array",
                "description": "URLs to fetch",
                "minItems": 1,
                "items": {"type": "string", "format": "uri"}
            },
            "options": {
                "type": "object",
                "description": "Fetch options applied to every URL",
                "properties": {
                    "timeout": {
                        "type": "integer",
                        "description": "Request timeout in milliseconds",
                        "default": 10000
                    },
                    "textOnly": {
                        "type": "boolean",
                        "description": "Whether to strip HTML tags and return only text content",
                        "default": true
                    },
                    "maxLength": {
                        "type": "integer",
                        "description": "Maximum length per fetched document",
                        "default": 10000
                    },
                    "includeFailures": {
                        "type": "boolean",
                        "description": "Whether failed fetches appear in the report",
                        "default": false
                    }
                }
            }
        },
        "required": ["urls"]
    })
}

fn extract_links_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "url": {
                "type": "string",
                "description": "The page to extract links from",
                "format": "uri"
            },
            "options": {
                "type": "object",
                "description": "Link extraction options",
                "properties": {
                    "filter": {
                        "type": "string",
                        "enum": ["all", "internal", "external"],
                        "description": "Which links to keep relative to the page host",
                        "default": "all"
                    },
                    "includeText": {
                        "type": "boolean",
                        "description": "Whether to include anchor text",
                        "default": true
                    },
                    "unique": {
                        "type": "boolean",
                        "description": "Whether to deduplicate links by URL",
                        "default": true
                    },
                    "maxLinks": {
                        "type": "integer",
                        "description": "Maximum number of links to return",
                        "default": 100
                    }
                }
            }
        },
        "required": ["url"]
    })
}

fn analyze_webpage_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "url": {
                "type": "string",
                "description": "The page to analyze",
                "format": "uri"
            },
            "analysis": {
                "type": "object",
                "description": "Analysis sections to include",
                "properties": {
                    "metadata": {
                        "type": "boolean",
                        "description": "Title and meta description/keywords",
                        "default": true
                    },
                    "structure": {
                        "type": "boolean",
                        "description": "Heading, paragraph, and link counts",
                        "default": true
                    },
                    "images": {
                        "type": "boolean",
                        "description": "Image URLs with alt text",
                        "default": false
                    },
                    "performance": {
                        "type": "boolean",
                        "description": "Fetch duration and raw content size",
                        "default": false
                    }
                }
            }
        },
        "required": ["url"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> WebModule {
        WebModule::new(&Config::default()).unwrap()
    }

    #[test]
    fn test_module_config() {
        let config = module().config();
        assert_eq!(config.name, "web-module");
    }

    #[test]
    fn test_declares_web_tools() {
        let names: Vec<String> = module().tools().iter().map(|t| t.name.clone()).collect();
        assert_eq!(
            names,
            vec!["fetch_url", "fetch_multiple_urls", "extract_links", "analyze_webpage"]
        );
    }

    #[test]
    fn test_extract_links_schema_filter_enum() {
        let schema = extract_links_schema();
        assert_eq!(
            schema["properties"]["options"]["properties"]["filter"]["enum"],
            json!(["all", "internal", "external"])
        );
    }

    #[tokio::test]
    async fn test_multi_fetch_rejects_too_many_urls() {
        let fetcher = WebFetcher::new(&Config::default()).unwrap();
        let urls: Vec<String> = (0..11).map(|i| format!("https://example.com/{i}")).collect();
        let err = fetcher
            .fetch_multiple(&urls, &MultiFetchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot fetch more than 10 URLs at once");
    }
}
