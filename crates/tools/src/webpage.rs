//! Web page fetcher tool
//!
//! Fetches a URL and extracts readable text (title, headings, paragraphs),
//! truncated to keep tool results inside the model's context.

use async_trait::async_trait;
use serde_json::json;

use crate::registry::Tool;
use crate::ToolError;

const MAX_CONTENT_CHARS: usize = 4000;

pub struct WebPageTool {
    client: reqwest::Client,
}

impl WebPageTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebPageTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull title and body text out of an HTML document.
fn extract_text(html: &str) -> String {
    let document = scraper::Html::parse_document(html);

    let mut out = String::new();
    if let Ok(selector) = scraper::Selector::parse("title") {
        if let Some(title) = document.select(&selector).next() {
            let title: String = title.text().collect();
            let title = title.trim();
            if !title.is_empty() {
                out.push_str(title);
                out.push_str("\n\n");
            }
        }
    }

    if let Ok(selector) = scraper::Selector::parse("h1, h2, h3, p, li") {
        for element in document.select(&selector) {
            let text: String = element.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.len() > 2 {
                out.push_str(&text);
                out.push('\n');
            }
            if out.len() > MAX_CONTENT_CHARS {
                break;
            }
        }
    }

    if out.len() > MAX_CONTENT_CHARS {
        let mut cut = MAX_CONTENT_CHARS;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("…");
    }
    out
}

#[async_trait]
impl Tool for WebPageTool {
    fn name(&self) -> &str {
        "fetch_page"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let url = args["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("url must be a string".into()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "url must start with http:// or https://".into(),
            ));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ToolError::Execution(format!(
                "page returned {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| ToolError::Execution(format!("body read failed: {e}")))?;

        let text = extract_text(&html);
        if text.trim().is_empty() {
            Ok("The page contained no readable text.".to_string())
        } else {
            Ok(text)
        }
    }
}
