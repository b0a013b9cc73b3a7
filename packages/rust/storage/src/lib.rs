//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the persisted
//! fingerprint index, run history, and accepted leads.
//!
//! **Access rules:**
//! - `leadharvest run` / `enrich`: read-write via [`Storage::open`]
//! - reporting commands (`leads`, `history`): read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use leadharvest_shared::{Enrichment, FingerprintIndex, LeadHarvestError, LeadRecord, Result, RunId};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// One row of run history.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    /// `None` while the run is in progress (or if it crashed).
    pub finished_at: Option<DateTime<Utc>>,
    pub stats_json: Option<String>,
}

/// An accepted lead as persisted, with the run that first accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLead {
    pub record: LeadRecord,
    pub run_id: String,
    pub accepted_at: DateTime<Utc>,
}

/// Filter for [`Storage::list_leads`]. Default lists everything.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub min_score: Option<f64>,
    pub domain: Option<String>,
    /// Only leads that carry no enrichment yet.
    pub missing_enrichment: bool,
}

fn storage_err(e: impl std::fmt::Display) -> LeadHarvestError {
    LeadHarvestError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| LeadHarvestError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LeadHarvestError::Storage(format!(
                "database not found at {} (run `leadharvest run` first)",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    LeadHarvestError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 when nothing has been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LeadHarvestError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fingerprint index
    // -----------------------------------------------------------------------

    /// Load the persisted index to seed a run's deduplicator.
    pub async fn load_fingerprint_index(&self) -> Result<FingerprintIndex> {
        let mut rows = self
            .conn
            .query("SELECT fingerprint, first_seen FROM fingerprints", params![])
            .await
            .map_err(storage_err)?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let fingerprint: String = row.get(0).map_err(storage_err)?;
            let first_seen = parse_timestamp(&row.get::<String>(1).map_err(storage_err)?)?;
            entries.push((fingerprint, first_seen));
        }
        tracing::debug!(fingerprints = entries.len(), "fingerprint index loaded");
        Ok(entries.into_iter().collect())
    }

    /// Persist every entry of `index`. Existing fingerprints keep their
    /// original first-seen timestamp. Returns the number of new entries.
    pub async fn save_fingerprint_index(&self, index: &FingerprintIndex) -> Result<usize> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let mut inserted = 0usize;
        for (fingerprint, first_seen) in index.iter() {
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO fingerprints (fingerprint, first_seen) VALUES (?1, ?2)",
                    params![fingerprint, first_seen.to_rfc3339()],
                )
                .await
                .map_err(storage_err)?;
            inserted += changed as usize;
        }
        tx.commit().await.map_err(storage_err)?;

        tracing::debug!(total = index.len(), inserted, "fingerprint index saved");
        Ok(inserted)
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record the start of a run.
    pub async fn insert_run(&self, run_id: &RunId, started_at: DateTime<Utc>) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO runs (id, started_at) VALUES (?1, ?2)",
                params![run_id.to_string(), started_at.to_rfc3339()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Mark a run finished and attach its serialized summary.
    pub async fn finish_run(
        &self,
        run_id: &RunId,
        finished_at: DateTime<Utc>,
        stats_json: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![finished_at.to_rfc3339(), stats_json, run_id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(LeadHarvestError::Storage(format!("unknown run {run_id}")));
        }
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<StoredRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, stats_json
                 FROM runs ORDER BY started_at DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let finished_at = match row.get::<String>(2).ok() {
                Some(s) => Some(parse_timestamp(&s)?),
                None => None,
            };
            runs.push(StoredRun {
                id: row.get(0).map_err(storage_err)?,
                started_at: parse_timestamp(&row.get::<String>(1).map_err(storage_err)?)?,
                finished_at,
                stats_json: row.get::<String>(3).ok(),
            });
        }
        Ok(runs)
    }

    // -----------------------------------------------------------------------
    // Leads
    // -----------------------------------------------------------------------

    /// Store accepted leads. A fingerprint already on file keeps its
    /// first-accepted row. Returns the number of rows inserted.
    pub async fn insert_leads(&self, run_id: &RunId, leads: &[LeadRecord]) -> Result<usize> {
        self.check_writable()?;
        let run_id = run_id.to_string();
        let accepted_at = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let mut inserted = 0usize;
        for lead in leads {
            let enrichment = enrichment_json(lead.enrichment.as_ref())?;
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO leads
                       (fingerprint, email, domain, company_name, source_url, score,
                        enrichment_json, run_id, accepted_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        lead.fingerprint.as_str(),
                        lead.email.as_deref(),
                        lead.domain.as_str(),
                        lead.company_name.as_deref(),
                        lead.source_url.as_str(),
                        lead.score,
                        enrichment.as_deref(),
                        run_id.as_str(),
                        accepted_at.as_str(),
                    ],
                )
                .await
                .map_err(storage_err)?;
            inserted += changed as usize;
        }
        tx.commit().await.map_err(storage_err)?;

        tracing::debug!(offered = leads.len(), inserted, "leads stored");
        Ok(inserted)
    }

    /// Leads matching `filter`, best score first.
    pub async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<StoredLead>> {
        let domain = filter.domain.as_deref().map(str::to_ascii_lowercase);
        let mut rows = self
            .conn
            .query(
                "SELECT fingerprint, email, domain, company_name, source_url, score,
                        enrichment_json, run_id, accepted_at
                 FROM leads
                 WHERE (?1 IS NULL OR score >= ?1)
                   AND (?2 IS NULL OR domain = ?2)
                   AND (?3 = 0 OR enrichment_json IS NULL)
                 ORDER BY score DESC, accepted_at ASC",
                params![filter.min_score, domain, filter.missing_enrichment as i64],
            )
            .await
            .map_err(storage_err)?;

        let mut leads = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            leads.push(row_to_stored_lead(&row)?);
        }
        Ok(leads)
    }

    /// Look up a lead by its identity fingerprint.
    pub async fn get_lead_by_fingerprint(&self, fingerprint: &str) -> Result<Option<StoredLead>> {
        let mut rows = self
            .conn
            .query(
                "SELECT fingerprint, email, domain, company_name, source_url, score,
                        enrichment_json, run_id, accepted_at
                 FROM leads WHERE fingerprint = ?1",
                params![fingerprint],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stored_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All leads for a company domain.
    pub async fn find_leads_by_domain(&self, domain: &str) -> Result<Vec<StoredLead>> {
        self.list_leads(&LeadFilter {
            domain: Some(domain.to_string()),
            ..Default::default()
        })
        .await
    }

    /// Replace a lead's enrichment and score. Returns false when no lead has
    /// `fingerprint`.
    pub async fn attach_enrichment(
        &self,
        fingerprint: &str,
        enrichment: &Enrichment,
        score: f64,
    ) -> Result<bool> {
        self.check_writable()?;
        let json = enrichment_json(Some(enrichment))?;
        let changed = self
            .conn
            .execute(
                "UPDATE leads SET enrichment_json = ?1, score = ?2 WHERE fingerprint = ?3",
                params![json.as_deref(), score, fingerprint],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LeadHarvestError::Storage(format!("invalid date '{s}': {e}")))
}

/// Empty enrichment is stored as NULL.
fn enrichment_json(enrichment: Option<&Enrichment>) -> Result<Option<String>> {
    match enrichment.filter(|e| !e.is_empty()) {
        Some(e) => serde_json::to_string(e).map(Some).map_err(storage_err),
        None => Ok(None),
    }
}

fn row_to_stored_lead(row: &libsql::Row) -> Result<StoredLead> {
    let enrichment = match row.get::<String>(6).ok() {
        Some(json) => Some(
            serde_json::from_str::<Enrichment>(&json)
                .map_err(|e| LeadHarvestError::Storage(format!("invalid enrichment json: {e}")))?,
        ),
        None => None,
    };

    Ok(StoredLead {
        record: LeadRecord {
            fingerprint: row.get(0).map_err(storage_err)?,
            email: row.get::<String>(1).ok(),
            domain: row.get(2).map_err(storage_err)?,
            company_name: row.get::<String>(3).ok(),
            source_url: row.get(4).map_err(storage_err)?,
            score: row.get::<f64>(5).map_err(storage_err)?,
            enrichment,
        },
        run_id: row.get(7).map_err(storage_err)?,
        accepted_at: parse_timestamp(&row.get::<String>(8).map_err(storage_err)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("lh_test_{}.db", Uuid::now_v7()))
    }

    async fn test_storage() -> Storage {
        Storage::open(&temp_db()).await.expect("open test db")
    }

    fn lead(fingerprint: &str, domain: &str, score: f64) -> LeadRecord {
        LeadRecord {
            email: Some(format!("sales@{domain}")),
            domain: domain.into(),
            company_name: Some("Globex".into()),
            source_url: format!("https://{domain}/contact"),
            score,
            fingerprint: fingerprint.into(),
            enrichment: None,
        }
    }

    async fn storage_with_run() -> (Storage, RunId) {
        let storage = test_storage().await;
        let run = RunId::new();
        storage.insert_run(&run, Utc::now()).await.unwrap();
        (storage, run)
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = temp_db();
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn fingerprint_index_keeps_first_seen() {
        let storage = test_storage().await;
        let early = Utc::now() - Duration::days(3);
        let late = Utc::now();

        let mut first = FingerprintIndex::new();
        first.insert_if_absent("fp-a", early);
        assert_eq!(storage.save_fingerprint_index(&first).await.unwrap(), 1);

        let mut second = FingerprintIndex::new();
        second.insert_if_absent("fp-a", late);
        second.insert_if_absent("fp-b", late);
        assert_eq!(storage.save_fingerprint_index(&second).await.unwrap(), 1);

        let loaded = storage.load_fingerprint_index().await.unwrap();
        assert_eq!(loaded.len(), 2);
        let seen = loaded.first_seen("fp-a").unwrap();
        assert_eq!(seen.timestamp(), early.timestamp());
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let (storage, run) = storage_with_run().await;
        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].finished_at.is_none());

        storage
            .finish_run(&run, Utc::now(), r#"{"accepted":2}"#)
            .await
            .unwrap();
        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs[0].id, run.to_string());
        assert!(runs[0].finished_at.is_some());
        assert_eq!(runs[0].stats_json.as_deref(), Some(r#"{"accepted":2}"#));

        assert!(storage.finish_run(&RunId::new(), Utc::now(), "{}").await.is_err());
    }

    #[tokio::test]
    async fn leads_first_seen_wins() {
        let (storage, run) = storage_with_run().await;
        let inserted = storage
            .insert_leads(&run, &[lead("fp-1", "globex.com", 0.8), lead("fp-2", "initech.dev", 0.4)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let mut changed = lead("fp-1", "globex.com", 0.1);
        changed.company_name = Some("Other".into());
        let again = storage.insert_leads(&run, &[changed]).await.unwrap();
        assert_eq!(again, 0);

        let stored = storage.get_lead_by_fingerprint("fp-1").await.unwrap().unwrap();
        assert_eq!(stored.record.company_name.as_deref(), Some("Globex"));
        assert_eq!(stored.record.score, 0.8);
        assert_eq!(stored.run_id, run.to_string());
        assert!(storage.get_lead_by_fingerprint("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lead_filters() {
        let (storage, run) = storage_with_run().await;
        let mut no_email = lead("fp-3", "globex.com", 0.2);
        no_email.email = None;
        storage
            .insert_leads(
                &run,
                &[lead("fp-1", "globex.com", 0.8), lead("fp-2", "initech.dev", 0.4), no_email],
            )
            .await
            .unwrap();

        let all = storage.list_leads(&LeadFilter::default()).await.unwrap();
        let scores: Vec<f64> = all.iter().map(|l| l.record.score).collect();
        assert_eq!(scores, vec![0.8, 0.4, 0.2]);

        let good = storage
            .list_leads(&LeadFilter {
                min_score: Some(0.4),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(good.len(), 2);

        let globex = storage.find_leads_by_domain("GLOBEX.com").await.unwrap();
        assert_eq!(globex.len(), 2);
        assert!(globex.iter().any(|l| l.record.email.is_none()));
    }

    #[tokio::test]
    async fn attach_enrichment_updates_score() {
        let (storage, run) = storage_with_run().await;
        storage
            .insert_leads(&run, &[lead("fp-1", "globex.com", 0.6), lead("fp-2", "initech.dev", 0.4)])
            .await
            .unwrap();

        let mut data = Enrichment::new();
        data.insert("industry".into(), "Manufacturing".into());
        assert!(storage.attach_enrichment("fp-1", &data, 0.8).await.unwrap());
        assert!(!storage.attach_enrichment("nope", &data, 0.8).await.unwrap());

        let stored = storage.get_lead_by_fingerprint("fp-1").await.unwrap().unwrap();
        assert_eq!(stored.record.score, 0.8);
        assert_eq!(stored.record.enrichment.unwrap()["industry"], "Manufacturing");

        let pending = storage
            .list_leads(&LeadFilter {
                missing_enrichment: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record.fingerprint, "fp-2");
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = temp_db();
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_run(&RunId::new(), Utc::now()).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_runs(5).await.unwrap().len(), 1);
        let result = ro.save_fingerprint_index(&FingerprintIndex::new()).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_db() {
        assert!(Storage::open_readonly(&temp_db()).await.is_err());
    }
}
