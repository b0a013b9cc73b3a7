//! Shared HTTP client setup, fetch-failure classification, and the
//! private-host guard used by the website and API sources.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use leadharvest_shared::{FetchError, FetchErrorKind, LeadHarvestError, Result};

/// User-Agent string for outbound requests.
pub const USER_AGENT: &str = concat!("LeadHarvest/", env!("CARGO_PKG_VERSION"));

/// Largest response body a source may return (10 MiB).
pub const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Build the HTTP client shared by all HTTP-backed sources.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| LeadHarvestError::Network(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Map a non-success status to a fetch failure kind. `None` for 2xx/3xx.
pub fn classify_status(status: StatusCode) -> Option<FetchErrorKind> {
    if status.is_success() || status.is_redirection() {
        return None;
    }
    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => FetchErrorKind::RateLimited,
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchErrorKind::NotFound,
        s if s.is_server_error() => FetchErrorKind::ServerError,
        _ => FetchErrorKind::ClientError,
    };
    Some(kind)
}

/// Map a transport-level reqwest error to a fetch failure kind.
pub fn classify_reqwest_error(err: &reqwest::Error) -> FetchErrorKind {
    if let Some(status) = err.status() {
        if let Some(kind) = classify_status(status) {
            return kind;
        }
    }
    if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if err.is_builder() {
        FetchErrorKind::MalformedUrl
    } else if err.is_decode() {
        FetchErrorKind::MalformedPayload
    } else {
        // connect failures, resets mid-body, and other I/O trouble
        FetchErrorKind::Connection
    }
}

// ---------------------------------------------------------------------------
// Target checks
// ---------------------------------------------------------------------------

/// Parse a source URL and apply the private-host guard.
pub fn parse_target(raw: &str, allow_private: bool) -> std::result::Result<Url, FetchError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| FetchError::new(FetchErrorKind::MalformedUrl, format!("{raw}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(FetchError::new(
            FetchErrorKind::MalformedUrl,
            format!("{raw}: expected an http(s) URL with a host"),
        ));
    }

    if !allow_private && is_ssrf_target(&url) {
        return Err(FetchError::new(
            FetchErrorKind::Blocked,
            format!("{url}: private or loopback host"),
        ));
    }

    Ok(url)
}

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (carrier-grade NAT)
                || (o[0] == 100 && (o[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (o[0] == 192 && o[1] == 0 && o[2] == 0)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// GET `url` with a per-request timeout and return the body as text.
pub async fn get_text(
    client: &Client,
    url: &Url,
    timeout: Duration,
) -> std::result::Result<String, FetchError> {
    debug!(%url, "GET");

    let response = client
        .get(url.as_str())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| FetchError::new(classify_reqwest_error(&e), format!("{url}: {e}")))?;

    let status = response.status();
    if let Some(kind) = classify_status(status) {
        return Err(FetchError::new(kind, format!("{url}: HTTP {status}")));
    }

    read_body(response, url, MAX_BODY_BYTES).await
}

/// Read a response body, refusing anything over `max_bytes`.
async fn read_body(
    response: reqwest::Response,
    url: &Url,
    max_bytes: u64,
) -> std::result::Result<String, FetchError> {
    let too_large = |len: u64| {
        FetchError::new(
            FetchErrorKind::MalformedPayload,
            format!("{url}: response too large ({len} bytes, max {max_bytes})"),
        )
    };

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(too_large(len));
        }
    }

    // Chunked responses carry no length up front.
    let bytes = response.bytes().await.map_err(|e| {
        FetchError::new(
            classify_reqwest_error(&e),
            format!("{url}: body read failed: {e}"),
        )
    })?;
    if bytes.len() as u64 > max_bytes {
        return Err(too_large(bytes.len() as u64));
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
