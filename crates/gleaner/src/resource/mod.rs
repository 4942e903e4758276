// ABOUTME: Document fetching: HTTP GET with SSRF protection, size limits, status checks and charset decoding.
// ABOUTME: Redirects are followed here, one guarded hop at a time, so no private host is ever contacted.

use std::collections::HashMap;
use std::net::IpAddr;

use bytes::{Bytes, BytesMut};
use ipnet::{Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::ScrapeError;

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// Maximum number of redirects followed for one fetch.
pub const MAX_REDIRECTS: usize = 10;

/// Options for fetching a document.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
    pub parse_non_200: bool,
}

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResult {
    /// Decodes the body using the content-type charset, falling back to detection.
    pub fn text(&self) -> String {
        decode_body(&self.body, self.content_type.as_deref())
    }
}

static PRIVATE_V4: Lazy<Vec<Ipv4Net>> = Lazy::new(|| {
    [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect()
});

static PRIVATE_V6: Lazy<Vec<Ipv6Net>> = Lazy::new(|| {
    ["fc00::/7", "fe80::/10"]
        .iter()
        .filter_map(|net| net.parse().ok())
        .collect()
});

/// Checks whether an IP address is private, loopback, link-local, shared or unspecified.
///
/// IPv4-mapped IPv6 addresses are judged by the IPv4 address they carry.
pub(crate) fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => PRIVATE_V4.iter().any(|net| net.contains(ip)),
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(v4) => is_private_ip(&IpAddr::V4(v4)),
            None => {
                ip.is_loopback()
                    || ip.is_unspecified()
                    || PRIVATE_V6.iter().any(|net| net.contains(ip))
            }
        },
    }
}

/// Decodes body bytes using the content-type charset, or chardetng detection.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type
        .and_then(extract_charset)
        .and_then(|charset| encoding_rs::Encoding::for_label(charset.as_bytes()))
    {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extracts the charset parameter from a Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    lower.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("charset=")
            .map(|c| c.trim_matches('"').trim_matches('\'').to_string())
    })
}

/// Rejects `url` if its host is, or resolves to, a private address.
async fn guard_private_host(url: &url::Url, requested: &str, what: &str) -> Result<(), ScrapeError> {
    let Some(host) = url.host_str() else {
        return Ok(());
    };
    // IPv6 literals come back bracketed.
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(ScrapeError::ssrf(
                requested,
                "Fetch",
                Some(anyhow::anyhow!("{} private IP address is not allowed", what)),
            ));
        }
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        ScrapeError::fetch(
            requested,
            "Fetch",
            Some(anyhow::anyhow!("DNS lookup failed for {}: {}", host, e)),
        )
    })?;
    for socket_addr in addrs {
        if is_private_ip(&socket_addr.ip()) {
            return Err(ScrapeError::ssrf(
                requested,
                "Fetch",
                Some(anyhow::anyhow!("{} private IP address is not allowed", what)),
            ));
        }
    }
    Ok(())
}

fn is_http(url: &url::Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn send_error(requested: &str, e: reqwest::Error) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::timeout(requested, "Fetch", Some(anyhow::anyhow!("request timed out: {}", e)))
    } else {
        ScrapeError::fetch(requested, "Fetch", Some(anyhow::anyhow!("request failed: {}", e)))
    }
}

/// Sends a GET for `start` and follows up to [`MAX_REDIRECTS`] redirects.
///
/// The HTTP client must not follow redirects itself. Each `Location` is
/// resolved and, unless private networks are allowed, guarded before it is
/// requested. `start` is expected to have been guarded by the caller.
async fn send_following_redirects(
    client: &reqwest::Client,
    start: url::Url,
    requested: &str,
    opts: &FetchOptions,
) -> Result<reqwest::Response, ScrapeError> {
    let mut current = start;
    for _ in 0..=MAX_REDIRECTS {
        let mut request = client.get(current.clone());
        for (key, value) in &opts.headers {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(|e| send_error(requested, e))?;

        let status = response.status();
        if !status.is_redirection() {
            return Ok(response);
        }
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let Some(location) = location else {
            return Ok(response);
        };

        let next = current.join(&location).map_err(|e| {
            ScrapeError::fetch(
                requested,
                "Fetch",
                Some(anyhow::anyhow!("invalid redirect location {:?}: {}", location, e)),
            )
        })?;
        if !is_http(&next) {
            return Err(ScrapeError::fetch(
                requested,
                "Fetch",
                Some(anyhow::anyhow!("redirect to unsupported scheme {}", next.scheme())),
            ));
        }
        if !opts.allow_private_networks {
            guard_private_host(&next, requested, "redirect to").await?;
        }

        debug!(from = %current, to = %next, status = status.as_u16(), "following redirect");
        current = next;
    }

    Err(ScrapeError::fetch(
        requested,
        "Fetch",
        Some(anyhow::anyhow!("too many redirects")),
    ))
}

/// Reads the body chunk by chunk, failing as soon as it grows past `limit` bytes.
async fn read_body(
    mut response: reqwest::Response,
    requested: &str,
    limit: usize,
) -> Result<Bytes, ScrapeError> {
    let too_large = || ScrapeError::fetch(requested, "Fetch", Some(anyhow::anyhow!("content too large")));

    let declared = response.content_length();
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(too_large());
    }

    let mut body = BytesMut::with_capacity(declared.unwrap_or(0) as usize);
    loop {
        let chunk = response.chunk().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::timeout(requested, "Fetch", Some(anyhow::anyhow!("body read timed out: {}", e)))
            } else {
                ScrapeError::fetch(
                    requested,
                    "Fetch",
                    Some(anyhow::anyhow!("failed to read body: {}", e)),
                )
            }
        })?;
        let Some(chunk) = chunk else {
            break;
        };
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}

/// Fetches a document from `url`.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<FetchResult, ScrapeError> {
    if url.is_empty() {
        return Err(ScrapeError::invalid_url(url, "Fetch", None));
    }

    let parsed_url = url::Url::parse(url).map_err(|e| {
        ScrapeError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;

    if !is_http(&parsed_url) {
        return Err(ScrapeError::invalid_url(
            url,
            "Fetch",
            Some(anyhow::anyhow!("scheme must be http or https")),
        ));
    }

    if !opts.allow_private_networks {
        guard_private_host(&parsed_url, url, "request to").await?;
    }

    let response = send_following_redirects(client, parsed_url, url, opts).await?;

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    let body = read_body(response, url, MAX_CONTENT_LENGTH).await?;

    if status != 200 && !opts.parse_non_200 {
        return Err(ScrapeError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("HTTP status {}", status)),
        ));
    }

    debug!(url, final_url = %final_url, status, bytes = body.len(), "fetched document");

    Ok(FetchResult {
        status,
        url: url.to_string(),
        final_url,
        content_type,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn create_test_client() -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent("test-agent")
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    fn permissive() -> FetchOptions {
        FetchOptions {
            allow_private_networks: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fetch_ok_utf8() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/page");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<h1>Widget</h1>");
        });

        let result = fetch(&create_test_client(), &server.url("/page"), &permissive()).await;
        mock.assert();

        let result = result.expect("fetch should succeed");
        assert_eq!(result.status, 200);
        assert_eq!(result.text(), "<h1>Widget</h1>");
    }

    #[tokio::test]
    async fn fetch_sends_custom_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/h").header("x-scraper", "gleaner");
            then.status(200).body("ok");
        });

        let mut opts = permissive();
        opts.headers
            .insert("x-scraper".to_string(), "gleaner".to_string());
        let result = fetch(&create_test_client(), &server.url("/h"), &opts).await;
        mock.assert();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn fetch_non_200_rejected() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/notfound");
            then.status(404).body("not found");
        });

        let result = fetch(&create_test_client(), &server.url("/notfound"), &permissive()).await;
        mock.assert();

        let err = result.expect_err("should fail on 404");
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn fetch_non_200_allowed() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/notfound");
            then.status(404).body("not found");
        });

        let opts = FetchOptions {
            parse_non_200: true,
            ..permissive()
        };
        let result = fetch(&create_test_client(), &server.url("/notfound"), &opts).await;
        mock.assert();

        assert_eq!(result.expect("allowed").status, 404);
    }

    #[tokio::test]
    async fn private_ip_blocked_by_default() {
        let server = MockServer::start();
        let url = format!("http://127.0.0.1:{}/test", server.port());

        let err = fetch(&create_test_client(), &url, &FetchOptions::default())
            .await
            .expect_err("should fail on private IP");
        assert!(err.is_ssrf());
    }

    #[tokio::test]
    async fn unspecified_and_mapped_loopback_blocked_by_default() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/test");
            then.status(200).body("<h1>internal</h1>");
        });

        for url in [
            format!("http://0.0.0.0:{}/test", server.port()),
            format!("http://[::ffff:127.0.0.1]:{}/test", server.port()),
        ] {
            let err = fetch(&create_test_client(), &url, &FetchOptions::default())
                .await
                .expect_err("should fail on private IP");
            assert!(err.is_ssrf(), "{url}: {err}");
        }
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn follows_relative_redirect() {
        let server = MockServer::start();
        let start = server.mock(|when, then| {
            when.method(GET).path("/start");
            then.status(302).header("location", "/target");
        });
        let target = server.mock(|when, then| {
            when.method(GET).path("/target");
            then.status(200).body("<h1>moved</h1>");
        });

        let result = fetch(&create_test_client(), &server.url("/start"), &permissive())
            .await
            .expect("redirect should be followed");
        start.assert();
        target.assert();

        assert_eq!(result.status, 200);
        assert_eq!(result.url, server.url("/start"));
        assert_eq!(result.final_url, server.url("/target"));
        assert_eq!(result.text(), "<h1>moved</h1>");
    }

    #[tokio::test]
    async fn redirect_to_localhost_is_not_requested() {
        let server = MockServer::start();
        let start = server.mock(|when, then| {
            when.method(GET).path("/start");
            then.status(302)
                .header("location", format!("http://localhost:{}/target", server.port()));
        });
        let target = server.mock(|when, then| {
            when.method(GET).path("/target");
            then.status(200).body("<h1>internal</h1>");
        });

        // The mock server itself is on loopback, so start past the initial guard.
        let url = server.url("/start");
        let start_url = url::Url::parse(&url).unwrap();
        let err = send_following_redirects(
            &create_test_client(),
            start_url,
            &url,
            &FetchOptions::default(),
        )
        .await
        .expect_err("redirect to localhost should be blocked");

        assert!(err.is_ssrf());
        start.assert();
        target.assert_hits(0);
    }

    #[tokio::test]
    async fn redirect_loop_gives_up() {
        let server = MockServer::start();
        let looping = server.mock(|when, then| {
            when.method(GET).path("/loop");
            then.status(301).header("location", "/loop");
        });

        let err = fetch(&create_test_client(), &server.url("/loop"), &permissive())
            .await
            .expect_err("redirect loop should fail");
        assert!(err.is_fetch());
        assert!(err.to_string().contains("too many redirects"));
        looping.assert_hits(MAX_REDIRECTS + 1);
    }

    #[tokio::test]
    async fn redirect_to_other_scheme_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/start");
            then.status(302).header("location", "file:///etc/passwd");
        });

        let err = fetch(&create_test_client(), &server.url("/start"), &permissive())
            .await
            .expect_err("file redirect should fail");
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[tokio::test]
    async fn declared_length_over_limit_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/big");
            then.status(200).body("x".repeat(64));
        });

        let response = create_test_client()
            .get(server.url("/big"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.content_length(), Some(64));

        let err = read_body(response, &server.url("/big"), 16)
            .await
            .expect_err("body over limit");
        assert!(err.is_fetch());
        assert!(err.to_string().contains("content too large"));
    }

    #[tokio::test]
    async fn fetch_rejects_body_over_max_content_length() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/huge");
            then.status(200).body(vec![b'x'; MAX_CONTENT_LENGTH + 1]);
        });

        let err = fetch(&create_test_client(), &server.url("/huge"), &permissive())
            .await
            .expect_err("body over cap");
        assert!(err.to_string().contains("content too large"));
    }

    /// Serves one chunked response with no Content-Length, then closes.
    fn serve_chunked(chunks: usize, chunk_size: usize) -> String {
        use std::io::{BufRead, BufReader, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).is_ok_and(|n| n > 0) && line != "\r\n" {
                line.clear();
            }

            let mut stream = stream;
            let payload = vec![b'x'; chunk_size];
            let _ = stream.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
            );
            for _ in 0..chunks {
                let header = format!("{:x}\r\n", chunk_size);
                if stream.write_all(header.as_bytes()).is_err()
                    || stream.write_all(&payload).is_err()
                    || stream.write_all(b"\r\n").is_err()
                {
                    return;
                }
            }
            let _ = stream.write_all(b"0\r\n\r\n");
        });
        format!("http://{}/stream", addr)
    }

    #[tokio::test]
    async fn streamed_body_over_limit_rejected() {
        let url = serve_chunked(64, 1024);

        let response = create_test_client().get(&url).send().await.unwrap();
        assert_eq!(response.content_length(), None);

        let err = read_body(response, &url, 4096)
            .await
            .expect_err("streamed body over limit");
        assert!(err.is_fetch());
        assert!(err.to_string().contains("content too large"));
    }

    #[tokio::test]
    async fn streamed_body_within_limit_is_read() {
        let url = serve_chunked(4, 256);

        let response = create_test_client().get(&url).send().await.unwrap();
        let body = read_body(response, &url, MAX_CONTENT_LENGTH)
            .await
            .expect("body within limit");
        assert_eq!(body.len(), 1024);
    }

    #[tokio::test]
    async fn rejects_bad_urls() {
        let client = create_test_client();
        let opts = permissive();

        assert!(fetch(&client, "", &opts).await.unwrap_err().is_invalid_url());
        assert!(fetch(&client, "not a url", &opts)
            .await
            .unwrap_err()
            .is_invalid_url());
        assert!(fetch(&client, "ftp://example.com/file", &opts)
            .await
            .unwrap_err()
            .is_invalid_url());
    }

    #[test]
    fn is_private_ip_ranges() {
        assert!(is_private_ip(&"10.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"172.31.255.255".parse().unwrap()));
        assert!(is_private_ip(&"192.168.1.1".parse().unwrap()));
        assert!(is_private_ip(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"169.254.0.1".parse().unwrap()));
        assert!(is_private_ip(&"::1".parse().unwrap()));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse().unwrap()));
        assert!(is_private_ip(&"0.0.0.0".parse().unwrap()));
        assert!(is_private_ip(&"0.1.2.3".parse().unwrap()));
        assert!(is_private_ip(&"100.64.0.1".parse().unwrap()));
        assert!(is_private_ip(&"100.127.255.254".parse().unwrap()));
        assert!(is_private_ip(&"::".parse().unwrap()));
        assert!(is_private_ip(&"::ffff:127.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"::ffff:10.1.2.3".parse().unwrap()));

        assert!(!is_private_ip(&"8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip(&"172.32.0.1".parse().unwrap()));
        assert!(!is_private_ip(&"2001:4860:4860::8888".parse().unwrap()));
        assert!(!is_private_ip(&"100.128.0.1".parse().unwrap()));
        assert!(!is_private_ip(&"::ffff:8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn extract_charset_variants() {
        assert_eq!(
            extract_charset("text/html; charset=utf-8"),
            Some("utf-8".to_string())
        );
        assert_eq!(
            extract_charset("text/html; charset=\"ISO-8859-1\""),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(extract_charset("text/html"), None);
    }

    #[test]
    fn decode_latin1_with_header() {
        let body: &[u8] = &[0x63, 0x61, 0x66, 0xe9];
        assert_eq!(decode_body(body, Some("text/html; charset=iso-8859-1")), "café");
    }
}
