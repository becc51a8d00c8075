//! HTTP-backed page driver
//!
//! Stand-in for a real browser: pages are fetched over plain HTTP and
//! interactions are resolved against the fetched markup. Pointer moves
//! are recorded only, there is no cursor over HTTP. The `PageDriver`
//! trait is the seam the agent loop drives and tests script against.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Page load timeout
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

impl BrowserConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        let defaults = Self::default();
        Self {
            timeout_secs: config.http_timeout_secs,
            user_agent: config.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}

/// Page-level operations the agent loop needs
#[async_trait]
pub trait PageDriver: Send {
    /// Load a URL and make it the current page
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Address of the current page (empty before first navigation)
    fn current_url(&self) -> String;

    /// Visible text of the current page
    fn page_text(&self) -> String;

    /// Follow the first link whose text contains `text` (case-insensitive)
    async fn click_link(&mut self, text: &str) -> Result<()>;

    /// Re-request the current page with a query parameter, approximating
    /// a search-box submit
    async fn submit_query(&mut self, text: &str) -> Result<()>;

    /// Pointer movement. Recorded for pacing purposes only.
    async fn move_mouse(&mut self, x: u32, y: u32) -> Result<()>;

    /// Scrolling is a no-op when the whole page is already in hand
    async fn scroll(&mut self) -> Result<()> {
        Ok(())
    }
}

/// HTTP-backed session holding the current page
pub struct BrowserSession {
    client: reqwest::Client,
    current_url: String,
    html: String,
}

impl BrowserSession {
    pub fn new(config: BrowserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| Error::Browser(e.to_string()))?;

        Ok(Self {
            client,
            current_url: String::new(),
            html: String::new(),
        })
    }

    async fn load(&mut self, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;

        // Failed loads still update the current address so the retry
        // hook can see where the session ended up.
        self.current_url = response.url().to_string();
        let status = response.status();
        self.html = response
            .text()
            .await
            .map_err(|e| Error::Browser(e.to_string()))?;

        debug!("Loaded {} ({} bytes, {})", self.current_url, self.html.len(), status);
        Ok(())
    }

    /// Resolve a possibly relative href against the current page
    fn resolve_href(&self, href: &str) -> Result<String> {
        if href.starts_with("http://") || href.starts_with("https://") {
            return Ok(href.to_string());
        }
        let base = reqwest::Url::parse(&self.current_url)
            .map_err(|e| Error::Browser(format!("bad base url: {}", e)))?;
        let joined = base
            .join(href)
            .map_err(|e| Error::Browser(format!("bad href {:?}: {}", href, e)))?;
        Ok(joined.to_string())
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        self.load(self.client.get(url)).await
    }

    fn current_url(&self) -> String {
        self.current_url.clone()
    }

    fn page_text(&self) -> String {
        extract_body_text(&self.html)
    }

    async fn click_link(&mut self, text: &str) -> Result<()> {
        let href = find_link_href(&self.html, text).ok_or_else(|| {
            Error::Browser(format!("no link matching {:?} on {}", text, self.current_url))
        })?;
        let target = self.resolve_href(&href)?;
        info!("Following link {:?} -> {}", text, target);
        self.load(self.client.get(target)).await
    }

    async fn submit_query(&mut self, text: &str) -> Result<()> {
        if self.current_url.is_empty() {
            return Err(Error::Browser("no current page to submit a query on".into()));
        }
        info!("Submitting query {:?} on {}", text, self.current_url);
        let url = self.current_url.clone();
        self.load(self.client.get(url).query(&[("query", text)]))
            .await
    }

    async fn move_mouse(&mut self, x: u32, y: u32) -> Result<()> {
        // No cursor over HTTP.
        debug!("Pointer move to ({}, {})", x, y);
        Ok(())
    }

    async fn scroll(&mut self) -> Result<()> {
        debug!("Scroll (no-op over HTTP)");
        Ok(())
    }
}

/// Find the href of the first anchor whose text contains `text`
fn find_link_href(html: &str, text: &str) -> Option<String> {
    let re = regex::Regex::new(
        r#"(?is)<a[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#,
    )
    .ok()?;

    let needle = text.to_lowercase();
    for caps in re.captures_iter(html) {
        let label = strip_tags(caps.get(2)?.as_str());
        if label.to_lowercase().contains(&needle) {
            return Some(caps.get(1)?.as_str().to_string());
        }
    }
    warn!("No anchor matching {:?}", text);
    None
}

/// Extract visible body text: scripts, styles and tags stripped,
/// entities decoded, whitespace normalized
pub(crate) fn extract_body_text(html: &str) -> String {
    let script_re = regex::Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    let text = script_re.replace_all(html, "");

    let style_re = regex::Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
    let text = style_re.replace_all(&text, "");

    let text = strip_tags(&text);
    let text = decode_entities(&text);

    let ws_re = regex::Regex::new(r"\s+").unwrap();
    ws_re.replace_all(&text, " ").trim().to_string()
}

fn strip_tags(html: &str) -> String {
    let tag_re = regex::Regex::new(r"<[^>]+>").unwrap();
    tag_re.replace_all(html, " ").to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_body_text() {
        let html = "<html><body><p>Hello</p><script>var x=1;</script><p>World</p></body></html>";
        let text = extract_body_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("&amp;"), "&");
        assert_eq!(decode_entities("&lt;hmm&gt;"), "<hmm>");
    }

    #[test]
    fn test_find_link_href() {
        let html = r#"<a href="/other">Other Carrier</a>
            <a href="http://www.hmm21.com/">HYUNDAI Merchant Marine (HMM)</a>"#;
        assert_eq!(
            find_link_href(html, "hyundai merchant marine"),
            Some("http://www.hmm21.com/".to_string())
        );
        assert_eq!(find_link_href(html, "maersk"), None);
    }

    #[test]
    fn test_find_link_href_nested_markup() {
        let html = r#"<a href="/track"><b>Track</b> and Trace</a>"#;
        assert_eq!(find_link_href(html, "Track and Trace"), Some("/track".to_string()));
    }

    #[test]
    fn test_resolve_href() {
        let session = BrowserSession {
            client: reqwest::Client::new(),
            current_url: "http://www.seacargotracking.net/index.html".to_string(),
            html: String::new(),
        };
        assert_eq!(
            session.resolve_href("/hmm").unwrap(),
            "http://www.seacargotracking.net/hmm"
        );
        assert_eq!(
            session.resolve_href("http://example.com/a").unwrap(),
            "http://example.com/a"
        );
    }
}
