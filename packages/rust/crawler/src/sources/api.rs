//! JSON API source: an HTTP endpoint returning an array of record objects.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use leadharvest_shared::{
    FetchAttempt, FetchError, FetchErrorKind, RawRecord, SourceDescriptor, SourceKind,
};

use super::dataset::objects_to_records;
use super::{SourceFetcher, wrong_kind};
use crate::http;

pub struct ApiFetcher {
    client: Client,
    allow_private: bool,
}

impl ApiFetcher {
    pub fn new(client: Client, allow_private: bool) -> Self {
        Self {
            client,
            allow_private,
        }
    }
}

#[async_trait]
impl SourceFetcher for ApiFetcher {
    fn kind(&self) -> SourceKind {
        SourceKind::Api
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn fetch(&self, source: &SourceDescriptor, timeout: Duration) -> FetchAttempt {
        let SourceDescriptor::Api {
            url,
            records_pointer,
        } = source
        else {
            return FetchAttempt::Failure(wrong_kind(self.kind(), source));
        };

        let target = match http::parse_target(url, self.allow_private) {
            Ok(target) => target,
            Err(e) => return FetchAttempt::Failure(e),
        };

        let body = match http::get_text(&self.client, &target, timeout).await {
            Ok(body) => body,
            Err(e) => return FetchAttempt::Failure(e),
        };

        let parsed = records_from_body(target.as_str(), &body, records_pointer.as_deref());
        if let Ok(records) = &parsed {
            debug!(records = records.len(), "api payload parsed");
        }
        parsed.into()
    }
}

/// Pull the record array out of a JSON body, at the root or at `pointer`.
pub fn records_from_body(
    origin: &str,
    body: &str,
    pointer: Option<&str>,
) -> Result<Vec<RawRecord>, FetchError> {
    let root: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        FetchError::new(FetchErrorKind::MalformedPayload, format!("{origin}: {e}"))
    })?;

    let target = match pointer.filter(|p| !p.is_empty()) {
        Some(p) => root.pointer(p).ok_or_else(|| {
            FetchError::new(
                FetchErrorKind::MalformedPayload,
                format!("{origin}: no value at pointer {p}"),
            )
        })?,
        None => &root,
    };

    match target {
        serde_json::Value::Array(items) => Ok(objects_to_records(origin, items)),
        // A single object is treated as a one-record payload.
        serde_json::Value::Object(obj) => Ok(vec![super::record_from_json(origin, obj)]),
        _ => Err(FetchError::new(
            FetchErrorKind::MalformedPayload,
            format!("{origin}: expected an array of objects"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_at_pointer() {
        let body = r#"{"meta": {"page": 1}, "data": {"companies": [
            {"name": "Globex", "website": "https://globex.com", "size": 120},
            {"name": "Initech", "email": "info@initech.dev", "address": {"city": "Austin"}}
        ]}}"#;
        let records = records_from_body("api", body, Some("/data/companies")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("size"), Some("120"));
        assert_eq!(records[1].get("address"), None);
    }

    #[test]
    fn bad_pointer_is_malformed() {
        let err = records_from_body("api", r#"{"items": []}"#, Some("/results")).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::MalformedPayload);
        assert!(!err.is_transient());
    }

    #[test]
    fn scalar_root_is_malformed() {
        let err = records_from_body("api", "17", None).unwrap_err();
        assert_eq!(err.kind, FetchErrorKind::MalformedPayload);
    }

    #[tokio::test]
    async fn fetches_records_from_mock_api() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/v1/leads"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {"email": "a@Foo.com"},
                    {"url": "http://bar.com", "verified": false}
                ]
            })))
            .mount(&server)
            .await;

        let client = http::build_client(Duration::from_secs(5)).unwrap();
        let fetcher = ApiFetcher::new(client, true);
        let source = SourceDescriptor::Api {
            url: format!("{}/v1/leads", server.uri()),
            records_pointer: Some("/results".into()),
        };

        let FetchAttempt::Success(records) = fetcher.fetch(&source, Duration::from_secs(5)).await
        else {
            panic!("api fetch should succeed");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("verified"), Some("false"));
        assert!(records[0].origin.ends_with("/v1/leads"));
    }

    #[tokio::test]
    async fn rate_limited_response_is_transient() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = http::build_client(Duration::from_secs(5)).unwrap();
        let fetcher = ApiFetcher::new(client, true);
        let source = SourceDescriptor::Api {
            url: server.uri(),
            records_pointer: None,
        };

        let FetchAttempt::Failure(err) = fetcher.fetch(&source, Duration::from_secs(5)).await else {
            panic!("429 should fail");
        };
        assert_eq!(err.kind, FetchErrorKind::RateLimited);
        assert!(err.is_transient());
    }
}
