//! Field validation and canonicalization: raw record in, lead record or
//! rejection out.

use serde::Serialize;
use url::{Host, Url};

use leadharvest_shared::{FingerprintStrategy, LeadRecord, PipelineConfig, RawRecord};

use crate::dedup;

/// Raw field names carrying an email address.
pub const EMAIL_FIELDS: &[&str] = &["email", "e-mail", "mail"];
/// Raw field names carrying a URL.
pub const URL_FIELDS: &[&str] = &["url", "website", "site", "source_url"];
/// Raw field names carrying a company name.
pub const COMPANY_FIELDS: &[&str] = &["company", "company_name", "name", "organization"];

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why a raw record did not become a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The record carried no fields at all.
    EmptyRecord,
    /// Neither a valid email nor a usable domain.
    MissingIdentity,
    /// The only identity anchors were on blocked domains.
    BlockedDomain,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyRecord => "empty_record",
            Self::MissingIdentity => "missing_identity",
            Self::BlockedDomain => "blocked_domain",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectionReason,
    /// Origin of the rejected record.
    pub origin: String,
}

// ---------------------------------------------------------------------------
// FieldValidator
// ---------------------------------------------------------------------------

/// Validates and canonicalizes raw records.
#[derive(Debug, Clone)]
pub struct FieldValidator {
    blocked_domains: Vec<String>,
    strategy: FingerprintStrategy,
}

impl Default for FieldValidator {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl FieldValidator {
    pub fn new(blocked_domains: Vec<String>, strategy: FingerprintStrategy) -> Self {
        let blocked_domains = blocked_domains
            .into_iter()
            .map(|d| d.trim().trim_end_matches('.').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            blocked_domains,
            strategy,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.blocked_domains.clone(), config.fingerprint_strategy)
    }

    /// True if `domain` is a blocked domain or a subdomain of one.
    pub fn is_blocked(&self, domain: &str) -> bool {
        self.blocked_domains.iter().any(|blocked| {
            domain == blocked
                || domain
                    .strip_suffix(blocked.as_str())
                    .is_some_and(|head| head.ends_with('.'))
        })
    }

    /// Turn a raw record into a canonical lead (score left at zero).
    pub fn validate(&self, raw: &RawRecord) -> Result<LeadRecord, Rejection> {
        let reject = |reason| Rejection {
            reason,
            origin: raw.origin.clone(),
        };

        if raw.is_empty() {
            return Err(reject(RejectionReason::EmptyRecord));
        }

        let mut hit_blocklist = false;

        let email = raw
            .first_of(EMAIL_FIELDS)
            .and_then(normalize_email)
            .filter(|email| {
                let blocked = email_domain(email).is_some_and(|d| self.is_blocked(d));
                hit_blocklist |= blocked;
                !blocked
            });

        let url_field = raw.first_of(URL_FIELDS).map(str::trim);

        let domain = match email.as_deref().and_then(email_domain) {
            Some(d) => Some(d.to_string()),
            None => url_field.and_then(domain_from_url).filter(|d| {
                let blocked = self.is_blocked(d);
                hit_blocklist |= blocked;
                !blocked
            }),
        };

        let Some(domain) = domain else {
            return Err(reject(if hit_blocklist {
                RejectionReason::BlockedDomain
            } else {
                RejectionReason::MissingIdentity
            }));
        };

        let company_name = raw.first_of(COMPANY_FIELDS).and_then(clean_company_name);
        let source_url = url_field
            .filter(|u| !u.is_empty())
            .map_or_else(|| raw.origin.clone(), String::from);

        let fingerprint = dedup::fingerprint(
            self.strategy,
            email.as_deref(),
            &domain,
            company_name.as_deref(),
        );

        Ok(LeadRecord {
            email,
            domain,
            company_name,
            source_url,
            score: 0.0,
            fingerprint,
            enrichment: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Field rules
// ---------------------------------------------------------------------------

/// Trim, lowercase and syntax-check an email. `None` if it is not usable.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim();
    let email = email.strip_prefix("mailto:").unwrap_or(email).to_lowercase();

    let (local, domain) = email.split_once('@')?;
    if domain.contains('@') || !is_valid_local(local) || !is_valid_domain(domain) {
        return None;
    }
    Some(email)
}

fn email_domain(email: &str) -> Option<&str> {
    email.split_once('@').map(|(_, d)| d)
}

fn is_valid_local(local: &str) -> bool {
    !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._%+-'".contains(c))
        && !local.starts_with(|c: char| c.is_ascii_punctuation())
        && !local.ends_with(|c: char| c.is_ascii_punctuation())
        && !local.contains("..")
}

/// Dotted hostname with alphanumeric/hyphen labels and an alphabetic TLD of
/// at least two letters.
fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));
    labels_ok && tld_ok
}

/// Bare lowercased hostname of a URL, without `www.`. Scheme is optional.
pub fn domain_from_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.chars().any(char::is_whitespace) {
        return None;
    }
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let url = Url::parse(&candidate).ok()?;
    let Some(Host::Domain(host)) = url.host() else {
        return None;
    };
    let host = host.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    is_valid_domain(host).then(|| host.to_string())
}

/// Display form of a company name: control characters removed, whitespace
/// collapsed. `None` when nothing remains.
pub fn clean_company_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}
