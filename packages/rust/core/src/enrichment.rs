//! Post-pipeline enrichment of accepted leads from an external company-data
//! provider.
//!
//! Provider trouble never fails a run: the lead keeps `enrichment = None`
//! and the failure is logged and counted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use leadharvest_shared::{
    Enrichment, EnrichmentConfig, LeadHarvestError, LeadRecord, Result, enrichment_api_key,
};

use crate::scoring::QualityScorer;

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// External source of supplemental lead fields.
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Look up a lead by domain (and email when known).
    ///
    /// `Ok(None)` means the provider has nothing on it; `Err` means the
    /// provider could not answer.
    async fn enrich(&self, domain: &str, email: Option<&str>) -> Result<Option<Enrichment>>;

    /// Human-readable provider name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HTTP provider
// ---------------------------------------------------------------------------

/// Provider reached over HTTP: `GET {endpoint}?domain=…&email=…` with a
/// bearer key, answering a JSON object (404 when unknown).
pub struct HttpEnrichmentProvider {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpEnrichmentProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(leadharvest_crawler::http::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadHarvestError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    /// Build from the `[enrichment]` config section; the key comes from the
    /// configured environment variable.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let api_key = enrichment_api_key(config)?;
        Self::new(
            config.endpoint.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl EnrichmentProvider for HttpEnrichmentProvider {
    async fn enrich(&self, domain: &str, email: Option<&str>) -> Result<Option<Enrichment>> {
        let mut query = vec![("domain", domain)];
        if let Some(email) = email {
            query.push(("email", email));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.api_key)
            .query(&query)
            .send()
            .await
            .map_err(|e| LeadHarvestError::Enrichment(format!("{domain}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(LeadHarvestError::Enrichment(format!(
                "{domain}: provider returned HTTP {status}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LeadHarvestError::Enrichment(format!("{domain}: bad payload: {e}")))?;

        match body {
            serde_json::Value::Object(map) if map.is_empty() => Ok(None),
            serde_json::Value::Object(map) => Ok(Some(map)),
            serde_json::Value::Null => Ok(None),
            _ => Err(LeadHarvestError::Enrichment(format!(
                "{domain}: expected a JSON object"
            ))),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Counts from one enrichment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentStats {
    pub enriched: usize,
    pub not_found: usize,
    pub unavailable: usize,
    /// Leads skipped because they already carried enrichment.
    pub skipped: usize,
}

/// Attach provider fields to a lead and recompute its score.
pub fn attach_enrichment(record: &mut LeadRecord, enrichment: Enrichment, scorer: &QualityScorer) {
    record.enrichment = Some(enrichment);
    scorer.apply(record);
}

/// Enrich every lead that has no enrichment yet, one lookup at a time.
/// Stops early (leaving the rest untouched) when `cancel` fires.
#[instrument(skip_all, fields(provider = provider.name(), leads = records.len()))]
pub async fn enrich_records(
    records: &mut [LeadRecord],
    provider: &dyn EnrichmentProvider,
    scorer: &QualityScorer,
    cancel: &CancellationToken,
) -> EnrichmentStats {
    let mut stats = EnrichmentStats::default();

    for record in records.iter_mut() {
        if cancel.is_cancelled() {
            debug!("enrichment cancelled");
            break;
        }
        if record.has_enrichment() {
            stats.skipped += 1;
            continue;
        }

        match provider.enrich(&record.domain, record.email.as_deref()).await {
            Ok(Some(data)) => {
                debug!(domain = %record.domain, fields = data.len(), "lead enriched");
                attach_enrichment(record, data, scorer);
                stats.enriched += 1;
            }
            Ok(None) => {
                debug!(domain = %record.domain, "no enrichment data");
                stats.not_found += 1;
            }
            Err(e) => {
                warn!(domain = %record.domain, error = %e, "enrichment unavailable");
                stats.unavailable += 1;
            }
        }
    }

    info!(
        enriched = stats.enriched,
        not_found = stats.not_found,
        unavailable = stats.unavailable,
        skipped = stats.skipped,
        "enrichment pass finished"
    );
    stats
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn lead(domain: &str, email: Option<&str>) -> LeadRecord {
        LeadRecord {
            email: email.map(String::from),
            domain: domain.into(),
            company_name: None,
            source_url: format!("https://{domain}"),
            score: 0.0,
            fingerprint: format!("fp-{domain}"),
            enrichment: None,
        }
    }

    async fn provider(server: &MockServer) -> HttpEnrichmentProvider {
        HttpEnrichmentProvider::new(
            format!("{}/v1/company", server.uri()),
            "test-key",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn http_provider_sends_key_and_parses_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/company"))
            .and(query_param("domain", "globex.com"))
            .and(query_param("email", "sales@globex.com"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "industry": "Manufacturing",
                "employee_count": 120
            })))
            .mount(&server)
            .await;

        let data = provider(&server)
            .await
            .enrich("globex.com", Some("sales@globex.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data["industry"], "Manufacturing");
    }

    #[tokio::test]
    async fn not_found_and_server_errors() {
        let server = MockServer::start().await;
        Mock::given(query_param("domain", "unknown.io"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(query_param("domain", "broken.io"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let p = provider(&server).await;
        assert!(p.enrich("unknown.io", None).await.unwrap().is_none());
        let err = p.enrich("broken.io", None).await.unwrap_err();
        assert!(matches!(err, LeadHarvestError::Enrichment(_)));
    }

    #[tokio::test]
    async fn enrich_records_recomputes_scores_and_tolerates_failures() {
        let server = MockServer::start().await;
        Mock::given(query_param("domain", "globex.com"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"industry": "Tools"})),
            )
            .mount(&server)
            .await;
        Mock::given(query_param("domain", "down.io"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(query_param("domain", "nobody.io"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scorer = QualityScorer::default();
        let mut leads = vec![
            lead("globex.com", Some("sales@globex.com")),
            lead("down.io", None),
            lead("nobody.io", None),
        ];
        for l in &mut leads {
            scorer.apply(l);
        }
        let before = leads[0].score;

        let stats = enrich_records(
            &mut leads,
            &provider(&server).await,
            &scorer,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(
            stats,
            EnrichmentStats {
                enriched: 1,
                not_found: 1,
                unavailable: 1,
                skipped: 0
            }
        );
        assert!(leads[0].has_enrichment());
        assert!(leads[0].score > before);
        assert!(leads[1].enrichment.is_none());
        assert!(leads[2].enrichment.is_none());
    }

    #[tokio::test]
    async fn cancelled_pass_touches_nothing() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut leads = vec![lead("globex.com", None)];
        let stats = enrich_records(
            &mut leads,
            &provider(&server).await,
            &QualityScorer::default(),
            &cancel,
        )
        .await;
        assert_eq!(stats, EnrichmentStats::default());
        assert!(leads[0].enrichment.is_none());
    }

    #[test]
    fn missing_api_key_env_is_config_error() {
        let config = EnrichmentConfig {
            api_key_env: "LH_TEST_NO_SUCH_ENRICHMENT_KEY".into(),
            ..Default::default()
        };
        assert!(matches!(
            HttpEnrichmentProvider::from_config(&config),
            Err(LeadHarvestError::Config { .. })
        ));
    }
}
