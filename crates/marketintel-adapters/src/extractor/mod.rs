//! Fetches and normalizes article bodies: HTML pages via DOM text
//! extraction, PDFs via page-by-page text extraction with Vietnamese
//! page markers.

use std::time::Duration;

use backoff::backoff::Backoff;
use marketintel_core::{MarketIntelError, Result};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};

const HTML_TIMEOUT: Duration = Duration::from_secs(60);
const PDF_GET_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const MAX_PDF_BYTES: u64 = 50 * 1024 * 1024;
const RETRY_STEPS_MS: [u64; 3] = [5_000, 10_000, 15_000];
const SOFT_404_MARKER: &str = "không tồn tại";

/// Fetches and extracts readable text from article URLs, tolerating the
/// slow, occasionally-flaky nature of public-sector source sites.
pub struct ContentExtractor {
    client: Client,
}

impl ContentExtractor {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent("marketintel-adapters/0.1")
                .build()
                .expect("reqwest client config is valid"),
        }
    }

    /// Dispatches on whether `url` looks like a PDF (by extension); both
    /// branches return normalized, human-readable text.
    pub async fn extract(&self, url: &str) -> Result<String> {
        if url.to_ascii_lowercase().ends_with(".pdf") {
            self.extract_pdf(url).await
        } else {
            self.extract_html(url).await
        }
    }

    async fn extract_html(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .timeout(HTML_TIMEOUT)
            .send()
            .await
            .map_err(|e| extraction_err(url, e.to_string()))?;

        if !resp.status().is_success() {
            return Err(extraction_err(url, format!("http status {}", resp.status())));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| extraction_err(url, e.to_string()))?;

        if is_soft_404(&body) {
            return Err(extraction_err(url, "soft 404 (content not found)"));
        }

        Ok(extract_readable_text(&body))
    }

    async fn extract_pdf(&self, url: &str) -> Result<String> {
        if let Ok(head) = self.client.head(url).timeout(HTML_TIMEOUT).send().await {
            if let Some(len) = head.content_length() {
                if len > MAX_PDF_BYTES {
                    return Err(extraction_err(
                        url,
                        format!("pdf too large ({len} bytes, max {MAX_PDF_BYTES})"),
                    ));
                }
            }
        }

        let mut backoff = linear_backoff();
        loop {
            match self.fetch_and_extract_pdf_once(url).await {
                Ok(text) => return Ok(text),
                Err(err) if is_retryable(&err) => match backoff.next_backoff() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(err),
                },
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_and_extract_pdf_once(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .timeout(PDF_GET_TIMEOUT)
            .send()
            .await
            .map_err(|e| extraction_err(url, e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| extraction_err(url, e.to_string()))?;

        if !status.is_success() {
            return Err(http_status_err(url, status));
        }

        if bytes.len() < 4 || &bytes[0..4] != b"%PDF" {
            if is_soft_404(&String::from_utf8_lossy(&bytes)) {
                return Err(extraction_err(url, "soft 404 (content not found)"));
            }
            return Err(extraction_err(url, "response is not a valid PDF (missing %PDF header)"));
        }

        let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes)
            .map_err(|e| extraction_err(url, format!("pdf parse failed: {e}")))?;

        Ok(format_pdf_pages(&pages))
    }
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn linear_backoff() -> impl Backoff {
    let mut steps = RETRY_STEPS_MS.iter();
    LinearBackoff {
        next: move || steps.next().map(|ms| Duration::from_millis(*ms)),
    }
}

/// A fixed linear retry schedule (5s, 10s, 15s), unlike
/// `ExponentialBackoff`'s geometric growth — the content extractor's
/// retry contract is explicitly linear, not exponential.
struct LinearBackoff<F> {
    next: F,
}

impl<F: FnMut() -> Option<Duration>> Backoff for LinearBackoff<F> {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.next)()
    }

    fn reset(&mut self) {}
}

fn is_retryable(err: &MarketIntelError) -> bool {
    match err {
        MarketIntelError::ExtractionFailed { message, .. } => {
            !message.starts_with("http status 4")
                && !message.contains("not a valid PDF")
                && !message.starts_with("soft 404")
        }
        MarketIntelError::Http(_) => true,
        _ => false,
    }
}

fn http_status_err(url: &str, status: StatusCode) -> MarketIntelError {
    extraction_err(url, format!("http status {status}"))
}

fn extraction_err(url: &str, message: impl Into<String>) -> MarketIntelError {
    MarketIntelError::ExtractionFailed {
        url: url.to_string(),
        message: message.into(),
    }
}

fn is_soft_404(html: &str) -> bool {
    html.contains(SOFT_404_MARKER)
}

/// Strips scripts/styles and concatenates visible text nodes, matching
/// what a reader would see rendered — not a lossless DOM dump.
fn extract_readable_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").expect("static selector is valid");
    let skip_selector =
        Selector::parse("script, style, noscript").expect("static selector is valid");

    let skip_nodes: std::collections::HashSet<_> = document
        .select(&skip_selector)
        .flat_map(|el| el.descendants().map(|n| n.id()))
        .collect();

    let mut text = String::new();
    if let Some(body) = document.select(&body_selector).next() {
        for descendant in body.descendants() {
            if skip_nodes.contains(&descendant.id()) {
                continue;
            }
            if let Some(t) = descendant.value().as_text() {
                let trimmed = t.trim();
                if !trimmed.is_empty() {
                    text.push_str(trimmed);
                    text.push(' ');
                }
            }
        }
    }
    normalize_whitespace(&text)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// Joins page texts with `--- Trang N ---` markers, dropping lines that
/// are nothing but a bare page number (a PDF-extraction footer artifact).
fn format_pdf_pages(pages: &[String]) -> String {
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        out.push_str(&format!("--- Trang {} ---\n", i + 1));
        for line in page.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            out.push_str(trimmed);
            out.push('\n');
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_text_skips_script_and_style() {
        let html = r#"
            <html><body>
                <script>var x = 1;</script>
                <style>.a { color: red; }</style>
                <p>Nội dung chính</p>
            </body></html>
        "#;
        let text = extract_readable_text(html);
        assert_eq!(text, "Nội dung chính");
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(normalize_whitespace("  a   b\n\nc  "), "a b c");
    }

    #[test]
    fn pdf_pages_carry_markers_and_drop_bare_page_numbers() {
        let pages = vec!["Dòng một\n12\n".to_string(), "Dòng hai\n".to_string()];
        let formatted = format_pdf_pages(&pages);
        assert!(formatted.contains("--- Trang 1 ---"));
        assert!(formatted.contains("--- Trang 2 ---"));
        assert!(!formatted.contains("12"));
        assert!(formatted.contains("Dòng một"));
        assert!(formatted.contains("Dòng hai"));
    }

    #[test]
    fn soft_404_marker_is_detected() {
        assert!(is_soft_404("<html>Trang không tồn tại</html>"));
        assert!(!is_soft_404("<html>Nội dung bình thường</html>"));
    }

    #[test]
    fn retryable_errors_exclude_4xx_and_malformed_pdf() {
        assert!(!is_retryable(&extraction_err("u", "http status 404")));
        assert!(!is_retryable(&extraction_err(
            "u",
            "response is not a valid PDF (missing %PDF header)"
        )));
        assert!(is_retryable(&extraction_err("u", "http status 503")));
    }

    #[test]
    fn soft_404_is_not_retried() {
        assert!(!is_retryable(&extraction_err("u", "soft 404 (content not found)")));
    }
}
