//! Lead fingerprints and the per-run deduplicator.
//!
//! Two leads sharing a mailbox (e.g. `info@` addresses used by several
//! companies) collapse into one under the email strategies; that is accepted.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use leadharvest_shared::{FingerprintIndex, FingerprintStrategy, LeadRecord};

/// Legal/business suffixes dropped when normalizing a company name.
const COMPANY_SUFFIXES: &[&str] = &[
    "inc", "llc", "ltd", "corp", "corporation", "limited", "company", "co", "gmbh", "sa", "bv",
    "nv", "ag", "plc",
];

/// Stable identity of a lead under `strategy`, as hex SHA-256.
pub fn fingerprint(
    strategy: FingerprintStrategy,
    email: Option<&str>,
    domain: &str,
    company_name: Option<&str>,
) -> String {
    let key = match (strategy, email) {
        (FingerprintStrategy::EmailOrDomainCompany, Some(email))
        | (FingerprintStrategy::EmailOrDomain, Some(email)) => format!("email:{email}"),
        (FingerprintStrategy::EmailOrDomainCompany, None) => format!(
            "domain:{domain}|company:{}",
            company_name.map(normalize_company).unwrap_or_default()
        ),
        (FingerprintStrategy::EmailOrDomain, None) | (FingerprintStrategy::Domain, _) => {
            format!("domain:{domain}")
        }
    };

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lowercase, drop punctuation and legal suffixes, collapse whitespace.
///
/// A name made only of suffixes ("The Company") keeps its words.
pub fn normalize_company(name: &str) -> String {
    let stripped: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let words: Vec<&str> = stripped.split_whitespace().collect();
    let kept: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !COMPANY_SUFFIXES.contains(w))
        .collect();

    if kept.is_empty() {
        words.join(" ")
    } else {
        kept.join(" ")
    }
}

/// Fingerprint set for one run. Only the ordering lane touches it.
#[derive(Debug, Default)]
pub struct Deduplicator {
    index: FingerprintIndex,
    seeded: usize,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a persisted index so earlier runs' leads count as seen.
    pub fn with_index(index: FingerprintIndex) -> Self {
        let seeded = index.len();
        Self { index, seeded }
    }

    /// `true` and record the fingerprint if unseen; `false` for a duplicate.
    pub fn admit(&mut self, record: &LeadRecord) -> bool {
        self.admit_at(record, Utc::now())
    }

    pub fn admit_at(&mut self, record: &LeadRecord, seen_at: DateTime<Utc>) -> bool {
        self.index.insert_if_absent(&record.fingerprint, seen_at)
    }

    /// Fingerprints admitted during this run.
    pub fn admitted(&self) -> usize {
        self.index.len() - self.seeded
    }

    /// Hand back the index (seed plus this run's admissions) for saving.
    pub fn into_index(self) -> FingerprintIndex {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn lead(fingerprint: &str, email: Option<&str>) -> LeadRecord {
        LeadRecord {
            email: email.map(String::from),
            domain: "foo.com".into(),
            company_name: None,
            source_url: "mem".into(),
            score: 0.0,
            fingerprint: fingerprint.into(),
            enrichment: None,
        }
    }

    #[test]
    fn admitting_twice_returns_true_then_false() {
        let mut dedup = Deduplicator::new();
        let record = lead("abc", Some("a@foo.com"));
        assert!(dedup.admit(&record));
        assert!(!dedup.admit(&record));
        assert_eq!(dedup.admitted(), 1);
    }

    #[test]
    fn first_seen_wins_regardless_of_completeness() {
        let mut dedup = Deduplicator::new();
        let sparse = lead("same", None);
        let mut rich = lead("same", Some("a@foo.com"));
        rich.company_name = Some("Foo".into());

        assert!(dedup.admit(&sparse));
        assert!(!dedup.admit(&rich));
    }

    #[test]
    fn seeded_index_rejects_earlier_fingerprints() {
        let first_seen = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let seed: FingerprintIndex = [("old".to_string(), first_seen)].into_iter().collect();

        let mut dedup = Deduplicator::with_index(seed);
        assert!(!dedup.admit(&lead("old", None)));
        assert!(dedup.admit(&lead("new", None)));
        assert_eq!(dedup.admitted(), 1);

        let index = dedup.into_index();
        assert_eq!(index.len(), 2);
        assert_eq!(index.first_seen("old"), Some(first_seen));
    }

    #[test]
    fn duplicate_count_is_order_independent() {
        let fps = ["a", "b", "a", "c", "b", "a"];
        let count_dupes = |order: &[&str]| {
            let mut dedup = Deduplicator::new();
            order.iter().filter(|fp| !dedup.admit(&lead(fp, None))).count()
        };
        let mut reversed = fps;
        reversed.reverse();
        assert_eq!(count_dupes(&fps), 3);
        assert_eq!(count_dupes(&reversed), 3);
    }

    #[test]
    fn company_normalization_drops_suffixes_and_punctuation() {
        assert_eq!(normalize_company("Globex, Inc."), "globex");
        assert_eq!(normalize_company("  ACME   Widgets GmbH "), "acme widgets");
        assert_eq!(normalize_company("Initech Co."), "initech");
        assert_eq!(normalize_company("The Company"), "the");
        assert_eq!(normalize_company("Company"), "company");
    }

    #[test]
    fn strategies_choose_identity_fields() {
        use FingerprintStrategy::*;

        let by_email = fingerprint(EmailOrDomainCompany, Some("a@foo.com"), "foo.com", Some("Foo"));
        assert_eq!(
            by_email,
            fingerprint(EmailOrDomain, Some("a@foo.com"), "foo.com", None)
        );

        let globex_inc = fingerprint(EmailOrDomainCompany, None, "globex.com", Some("Globex Inc"));
        let globex_llc = fingerprint(EmailOrDomainCompany, None, "globex.com", Some("GLOBEX, LLC"));
        let other = fingerprint(EmailOrDomainCompany, None, "globex.com", Some("Globex Labs"));
        assert_eq!(globex_inc, globex_llc);
        assert_ne!(globex_inc, other);

        // Domain strategy ignores email entirely.
        assert_eq!(
            fingerprint(Domain, Some("a@foo.com"), "foo.com", None),
            fingerprint(Domain, Some("b@foo.com"), "foo.com", Some("Foo"))
        );
        assert_ne!(by_email, fingerprint(Domain, Some("a@foo.com"), "foo.com", None));
    }
}
