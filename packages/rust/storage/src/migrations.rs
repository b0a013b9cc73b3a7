//! Versioned schema migrations, applied in order on read-write open.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "fingerprint index, run history and accepted leads",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS fingerprints (
    fingerprint TEXT PRIMARY KEY,
    first_seen  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

CREATE TABLE IF NOT EXISTS leads (
    fingerprint     TEXT PRIMARY KEY,
    email           TEXT,
    domain          TEXT NOT NULL,
    company_name    TEXT,
    source_url      TEXT NOT NULL,
    score           REAL NOT NULL,
    enrichment_json TEXT,
    run_id          TEXT NOT NULL REFERENCES runs(id),
    accepted_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_leads_domain ON leads(domain);
CREATE INDEX IF NOT EXISTS idx_leads_run ON leads(run_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
    ]
}
