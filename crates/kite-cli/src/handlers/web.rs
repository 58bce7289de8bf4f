//! Web page fetching

use async_trait::async_trait;
use kite_agent::HandlerError;
use kite_agent::handlers::{HandlerResult, Web};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Response bodies beyond this are cut
const MAX_CONTENT_SIZE: usize = 500_000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static SCRIPT_OR_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n+").unwrap());

/// HTTP(S) GET with a size cap. Web search is not supported.
pub struct HttpWeb {
    client: reqwest::Client,
    max_bytes: usize,
    timeout: Duration,
}

impl Default for HttpWeb {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpWeb {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            max_bytes: MAX_CONTENT_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

fn validate_url(url: &str) -> HandlerResult<()> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(HandlerError::failed(format!(
            "Only http:// and https:// URLs can be fetched: {}",
            url
        )))
    }
}

/// Reduce an HTML page to its readable text
fn html_to_text(html: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, "");
    let without_tags = TAG.replace_all(&without_code, "");
    let text = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    BLANK_LINES.replace_all(text.trim(), "\n\n").into_owned()
}

/// Body bytes read so far, stopping at a size cap
#[derive(Default)]
struct CappedBody {
    bytes: Vec<u8>,
    truncated: bool,
}

impl CappedBody {
    /// Append a chunk. Returns `false` once the cap is reached and no
    /// further chunks should be read.
    fn push(&mut self, chunk: &[u8], max: usize) -> bool {
        let room = max.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.bytes.extend_from_slice(&chunk[..room]);
            self.truncated = true;
            return false;
        }
        self.bytes.extend_from_slice(chunk);
        true
    }

    fn into_text(self, max: usize) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(&format!("\n\n... (content truncated at {}KB)", max / 1024));
        }
        text
    }
}

#[async_trait]
impl Web for HttpWeb {
    async fn fetch(&self, url: &str) -> HandlerResult<String> {
        let url = url.trim();
        validate_url(url)?;
        tracing::debug!("Fetching {}", url);

        let mut response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| HandlerError::failed(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HandlerError::failed(format!(
                "HTTP request failed with status: {}",
                status
            )));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));

        let mut body = CappedBody::default();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| HandlerError::failed(format!("Failed to read body: {}", e)))?
        {
            if !body.push(&chunk, self.max_bytes) {
                tracing::debug!("Stopped reading {} at {} bytes", url, self.max_bytes);
                break;
            }
        }

        let text = body.into_text(self.max_bytes);
        Ok(if is_html { html_to_text(&text) } else { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_urls() {
        let web = HttpWeb::new();
        let err = web.fetch("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("Only http"));
        assert!(!web.supports_search());
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><style>p { color: red }</style><script>alert(1)</script></head>\
                    <body><h1>Title</h1>\n\n\n<p>a &amp; b &lt;c&gt;</p></body></html>";
        assert_eq!(html_to_text(html), "Title\n\na & b <c>");
    }

    #[test]
    fn test_body_stops_at_cap() {
        let mut body = CappedBody::default();
        assert!(body.push(&[b'x'; 1024], 2048));
        assert!(!body.push(&[b'y'; 4096], 2048));
        let text = body.into_text(2048);
        assert!(text.starts_with(&format!("{}{}", "x".repeat(1024), "y".repeat(1024))));
        assert!(text.ends_with("(content truncated at 2KB)"));

        let mut small = CappedBody::default();
        assert!(small.push(b"short", 10));
        assert_eq!(small.into_text(10), "short");
    }
}
