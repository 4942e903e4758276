// ABOUTME: The Client ties fetching to extraction: fetch a URL, parse it, and evaluate a RuleSet.
// ABOUTME: The default path absorbs transport failures into an empty document; try_extract surfaces them.

use tracing::{error, info};

use crate::engine::extract_html;
use crate::error::ScrapeError;
use crate::options::{ClientBuilder, Options};
use crate::resource::{fetch, FetchOptions};
use crate::result::ExtractionResult;
use crate::rules::RuleSet;

/// Fetches documents and extracts rule-driven data from them.
#[derive(Debug, Clone)]
pub struct Client {
    opts: Options,
    http_client: reqwest::Client,
}

impl Client {
    /// Create a new ClientBuilder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a new Client with the given options.
    pub fn new(opts: Options) -> Result<Self, ScrapeError> {
        let http_client = match opts.http_client.clone() {
            Some(client) => client,
            None => build_http_client(&opts)?,
        };
        Ok(Self { opts, http_client })
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Fetches `url` and returns the decoded document text.
    pub async fn fetch_document(&self, url: &str) -> Result<String, ScrapeError> {
        let fetch_opts = FetchOptions {
            headers: self.opts.headers.clone(),
            allow_private_networks: self.opts.allow_private_networks,
            parse_non_200: false,
        };
        let fetched = fetch(&self.http_client, url, &fetch_opts).await?;
        info!(url, status = fetched.status, bytes = fetched.body.len(), "fetched");
        Ok(fetched.text())
    }

    /// Fetches `url` and extracts `rules` from it.
    ///
    /// A transport failure is logged and the rules are evaluated against an
    /// empty document, so the result still has one (empty) entry per rule.
    pub async fn extract(&self, url: &str, rules: &RuleSet) -> ExtractionResult {
        let html = match self.fetch_document(url).await {
            Ok(html) => html,
            Err(err) => {
                error!(url, error = %err, "fetch failed, extracting from empty document");
                String::new()
            }
        };
        extract_html(&html, rules)
    }

    /// Like [`extract`](Self::extract) but returns transport failures instead of absorbing them.
    pub async fn try_extract(
        &self,
        url: &str,
        rules: &RuleSet,
    ) -> Result<ExtractionResult, ScrapeError> {
        let html = self.fetch_document(url).await?;
        Ok(extract_html(&html, rules))
    }
}

fn build_http_client(opts: &Options) -> Result<reqwest::Client, ScrapeError> {
    // `resource::fetch` follows redirects itself so every hop passes the private-host guard.
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(&opts.user_agent)
        .timeout(opts.timeout)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .map_err(|e| {
            ScrapeError::fetch(
                "",
                "BuildClient",
                Some(anyhow::anyhow!("failed to build HTTP client: {}", e)),
            )
        })
}
