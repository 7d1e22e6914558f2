//! HTML content processing
//!
//! Text extraction with script/style stripping, link extraction with
//! same-host filtering, and page analysis over a parsed document.

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Link extraction options
#[derive(Debug, Clone)]
pub struct LinkExtractionOptions {
    pub filter: String,
    pub include_text: bool,
    pub unique: bool,
    pub max_links: usize,
}

impl Default for LinkExtractionOptions {
    fn default() -> Self {
        Self {
            filter: "all".to_string(),
            include_text: true,
            unique: true,
            max_links: 100,
        }
    }
}

/// Page analysis sections to include
#[derive(Debug, Clone)]
pub struct PageAnalysisOptions {
    pub metadata: bool,
    pub structure: bool,
    pub images: bool,
    pub performance: bool,
}

impl Default for PageAnalysisOptions {
    fn default() -> Self {
        Self {
            metadata: true,
            structure: true,
            images: false,
            performance: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub url: String,
    pub text: String,
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector parses")
}

/// Extract the visible text of an HTML document, skipping `<script>` and
/// `<style>` subtrees and collapsing whitespace.
pub fn strip_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<String> = Vec::new();
    collect_text(document.root_element(), &mut parts);
    parts
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn collect_text(element: ElementRef, parts: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            parts.push(text.to_string());
        } else if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if name != "script" && name != "style" {
                collect_text(child_element, parts);
            }
        }
    }
}

/// Extract anchors with an `href`, resolved to absolute URLs and filtered
/// against the page host.
pub fn extract_links(html: &str, base: &Url, options: &LinkExtractionOptions) -> Vec<LinkInfo> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]");
    let base_host = base.host_str().unwrap_or_default();

    let mut links: Vec<LinkInfo> = Vec::new();
    for anchor in document.select(&anchors) {
        if links.len() >= options.max_links {
            break;
        }

        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(absolute) = base.join(href) else {
            continue;
        };

        let text = element_text(anchor);
        let link = LinkInfo {
            url: absolute.to_string(),
            text: if text.is_empty() {
                "[No text]".to_string()
            } else {
                text
            },
        };

        if should_include_link(&link, &options.filter, base_host) {
            links.push(link);
        }
    }

    if options.unique {
        let mut seen = std::collections::HashSet::new();
        links.retain(|link| seen.insert(link.url.clone()));
    }

    links
}

fn should_include_link(link: &LinkInfo, filter: &str, base_host: &str) -> bool {
    if filter == "all" {
        return true;
    }

    match Url::parse(&link.url) {
        Ok(url) => {
            let is_internal = url.host_str() == Some(base_host);
            (filter == "internal") == is_internal
        }
        Err(_) => false,
    }
}

/// Render extracted links as a numbered report.
pub fn format_links_result(
    url: &str,
    links: &[LinkInfo],
    filter: &str,
    include_text: bool,
) -> String {
    let mut result = String::new();
    result.push_str(&format!("Links extracted from: {url}\n"));
    result.push_str(&format!("Total links found: {}\n", links.len()));
    result.push_str(&format!("Filter applied: {filter}\n\n"));

    for (index, link) in links.iter().enumerate() {
        result.push_str(&format!("{}. {}", index + 1, link.url));
        if include_text && link.text != "[No text]" {
            result.push_str(&format!(" - \"{}\"", link.text));
        }
        result.push('\n');
    }

    result
}

/// Assemble the requested analysis sections for a fetched page.
pub fn analyze_page(
    html: &str,
    url: &str,
    base: &Url,
    load_time_ms: u64,
    options: &PageAnalysisOptions,
) -> String {
    let document = Html::parse_document(html);
    let mut result = format!("Web Page Analysis: {url}\n\n");

    if options.metadata {
        result.push_str(&extract_metadata(&document));
    }
    if options.structure {
        result.push_str(&analyze_structure(&document));
    }
    if options.images {
        result.push_str(&extract_images(&document, base));
    }
    if options.performance {
        result.push_str("Performance Metrics:\n");
        result.push_str(&format!("- Load time: {load_time_ms}ms\n"));
        result.push_str(&format!("- Content size: {} characters\n\n", html.len()));
    }

    result
}

fn extract_metadata(document: &Html) -> String {
    let mut result = String::from("Metadata:\n");

    if let Some(title) = document.select(&selector("title")).next() {
        let title = element_text(title);
        if !title.is_empty() {
            result.push_str(&format!("- Title: {title}\n"));
        }
    }

    if let Some(description) = document
        .select(&selector("meta[name=description]"))
        .next()
        .and_then(|meta| meta.value().attr("content"))
    {
        result.push_str(&format!("- Description: {description}\n"));
    }

    if let Some(keywords) = document
        .select(&selector("meta[name=keywords]"))
        .next()
        .and_then(|meta| meta.value().attr("content"))
    {
        result.push_str(&format!("- Keywords: {keywords}\n"));
    }

    result.push('\n');
    result
}

fn analyze_structure(document: &Html) -> String {
    let mut result = String::from("Page Structure:\n");

    let h1s: Vec<ElementRef> = document.select(&selector("h1")).collect();
    let h2s: Vec<ElementRef> = document.select(&selector("h2")).collect();
    let h3_count = document.select(&selector("h3")).count();
    let paragraph_count = document.select(&selector("p")).count();
    let link_count = document.select(&selector("a[href]")).count();

    result.push_str(&format!("- H1 headings: {}\n", h1s.len()));
    result.push_str(&format!("- H2 headings: {}\n", h2s.len()));
    result.push_str(&format!("- H3 headings: {h3_count}\n"));

    if let Some(first) = h1s.first() {
        result.push_str(&format!("- Main heading text: \"{}\"\n", element_text(*first)));
    }

    if !h2s.is_empty() {
        result.push_str("- H2 headings text:\n");
        for (index, h2) in h2s.iter().take(5).enumerate() {
            result.push_str(&format!("  {}. \"{}\"\n", index + 1, element_text(*h2)));
        }
    }

    result.push_str(&format!("- Paragraphs: {paragraph_count}\n"));
    result.push_str(&format!("- Links: {link_count}\n\n"));

    result
}

fn extract_images(document: &Html, base: &Url) -> String {
    let mut result = String::from("Images:\n");
    let mut count = 0;

    for img in document.select(&selector("img[src]")) {
        if count >= 20 {
            break;
        }

        let Some(src) = img.value().attr("src") else {
            continue;
        };
        let Ok(absolute) = base.join(src) else {
            continue;
        };

        let alt = img.value().attr("alt").unwrap_or_default();
        let alt = if alt.is_empty() { "[No alt text]" } else { alt };

        count += 1;
        result.push_str(&format!("{count}. {absolute} - \"{alt}\"\n"));
    }

    result.push_str(&format!("\nTotal images found: {count}\n\n"));
    result
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
