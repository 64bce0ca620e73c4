//! SQLite-backed customer and alert store.
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`)
//! and dates as `YYYY-MM-DD`, so ordering and range comparisons work on the
//! raw column values.

use crate::alert::{Alert, AlertKind, AlertQuery, Severity};
use crate::customer::{Customer, CustomerQuery, CustomerTier, CustomerUpdate, LifecycleStage, NewCustomer};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        domain TEXT,
        contact_email TEXT,
        tier TEXT NOT NULL,
        stage TEXT NOT NULL,
        health_score INTEGER NOT NULL,
        arr REAL NOT NULL DEFAULT 0,
        renewal_date TEXT,
        last_engagement_at TEXT,
        nps_score INTEGER,
        open_tickets INTEGER NOT NULL DEFAULT 0,
        usage_score INTEGER NOT NULL DEFAULT 0,
        onboarding_progress INTEGER NOT NULL DEFAULT 0,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_customers_name ON customers(name COLLATE NOCASE)",
    "CREATE INDEX IF NOT EXISTS idx_customers_stage ON customers(stage)",
    "CREATE INDEX IF NOT EXISTS idx_customers_renewal ON customers(renewal_date)",
    r#"
    CREATE TABLE IF NOT EXISTS alerts (
        id TEXT PRIMARY KEY,
        customer_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        severity TEXT NOT NULL,
        severity_rank INTEGER NOT NULL,
        message TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '{}',
        detected_at TEXT NOT NULL,
        acknowledged_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_alerts_customer_kind ON alerts(customer_id, kind, detected_at)",
    "CREATE INDEX IF NOT EXISTS idx_alerts_detected ON alerts(detected_at)",
];

const ACTIVE: &str = "stage != 'churned'";

/// Customer and alert persistence.
#[derive(Debug, Clone)]
pub struct CustomerStore {
    pool: SqlitePool,
}

impl CustomerStore {
    /// Connect to a database URL (e.g. `sqlite://customer_success.db?mode=rwc`)
    /// and apply the schema.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url = %url, "Customer store connected");
        Ok(store)
    }

    /// Private in-memory database, for tests and ephemeral runs.
    pub async fn in_memory() -> StoreResult<Self> {
        // One connection that never expires, or the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create tables and indexes if missing.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Customer store schema applied");
        Ok(())
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check the database answers.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Customers
    // ------------------------------------------------------------------

    /// Validate and insert a new customer.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewCustomer) -> StoreResult<Customer> {
        let customer = Customer::from_new(input);
        self.insert(&customer).await?;
        info!(customer_id = %customer.id, "Customer created");
        Ok(customer)
    }

    /// Validate and insert a fully-formed record (imports, fixtures).
    pub async fn insert(&self, customer: &Customer) -> StoreResult<()> {
        customer.validate()?;

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, name, domain, contact_email, tier, stage, health_score, arr,
                renewal_date, last_engagement_at, nps_score, open_tickets, usage_score,
                onboarding_progress, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(customer.id.to_string())
        .bind(&customer.name)
        .bind(&customer.domain)
        .bind(&customer.contact_email)
        .bind(customer.tier.as_str())
        .bind(customer.stage.as_str())
        .bind(customer.health_score as i64)
        .bind(customer.arr)
        .bind(customer.renewal_date.map(date_text))
        .bind(customer.last_engagement_at.as_ref().map(timestamp))
        .bind(customer.nps_score.map(i64::from))
        .bind(customer.open_tickets as i64)
        .bind(customer.usage_score as i64)
        .bind(customer.onboarding_progress as i64)
        .bind(serde_json::to_string(&customer.metadata)?)
        .bind(timestamp(&customer.created_at))
        .bind(timestamp(&customer.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a customer by id.
    pub async fn get(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        let row = sqlx::query("SELECT * FROM customers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(customer_from_row).transpose()
    }

    /// Fetch a customer by id, failing when absent.
    pub async fn require(&self, id: Uuid) -> StoreResult<Customer> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::customer_not_found(id))
    }

    /// List customers matching the filters, ordered by name.
    pub async fn list(&self, query: &CustomerQuery) -> StoreResult<Vec<Customer>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM customers WHERE 1 = 1");
        push_customer_filters(&mut builder, query);
        builder
            .push(" ORDER BY name COLLATE NOCASE, id LIMIT ")
            .push_bind(query.effective_limit() as i64)
            .push(" OFFSET ")
            .push_bind(query.offset.unwrap_or(0) as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(customer_from_row).collect()
    }

    /// Count customers matching the filters (paging ignored).
    pub async fn count(&self, query: &CustomerQuery) -> StoreResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM customers WHERE 1 = 1");
        push_customer_filters(&mut builder, query);

        let row = builder.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as u64)
    }

    /// Apply a partial update and return the new record.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: Uuid, update: CustomerUpdate) -> StoreResult<Customer> {
        if update.is_empty() {
            return Err(StoreError::Validation("update contains no fields".to_string()));
        }

        let mut customer = self.require(id).await?;
        customer.apply(update);
        customer.validate()?;

        sqlx::query(
            r#"
            UPDATE customers SET
                name = ?, domain = ?, contact_email = ?, tier = ?, stage = ?,
                health_score = ?, arr = ?, renewal_date = ?, last_engagement_at = ?,
                nps_score = ?, open_tickets = ?, usage_score = ?, onboarding_progress = ?,
                metadata = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&customer.name)
        .bind(&customer.domain)
        .bind(&customer.contact_email)
        .bind(customer.tier.as_str())
        .bind(customer.stage.as_str())
        .bind(customer.health_score as i64)
        .bind(customer.arr)
        .bind(customer.renewal_date.map(date_text))
        .bind(customer.last_engagement_at.as_ref().map(timestamp))
        .bind(customer.nps_score.map(i64::from))
        .bind(customer.open_tickets as i64)
        .bind(customer.usage_score as i64)
        .bind(customer.onboarding_progress as i64)
        .bind(serde_json::to_string(&customer.metadata)?)
        .bind(timestamp(&customer.updated_at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        info!(customer_id = %id, "Customer updated");
        Ok(customer)
    }

    /// Delete a customer and its alerts.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM alerts WHERE customer_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::customer_not_found(id));
        }

        tx.commit().await?;
        info!(customer_id = %id, "Customer deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Worker signal queries (churned customers are always excluded)
    // ------------------------------------------------------------------

    /// Every customer that has not churned.
    pub async fn all_active(&self) -> StoreResult<Vec<Customer>> {
        self.fetch_customers(&format!("SELECT * FROM customers WHERE {} ORDER BY name", ACTIVE), Vec::new())
            .await
    }

    /// Health score strictly below `threshold`.
    pub async fn below_health(&self, threshold: u8) -> StoreResult<Vec<Customer>> {
        self.fetch_customers(
            &format!(
                "SELECT * FROM customers WHERE {} AND health_score < ? ORDER BY health_score, name",
                ACTIVE
            ),
            vec![Bind::Int(threshold as i64)],
        )
        .await
    }

    /// Renewal date within `[from, to]`.
    pub async fn renewing_between(&self, from: NaiveDate, to: NaiveDate) -> StoreResult<Vec<Customer>> {
        self.fetch_customers(
            &format!(
                "SELECT * FROM customers WHERE {} AND renewal_date IS NOT NULL \
                 AND renewal_date >= ? AND renewal_date <= ? ORDER BY renewal_date, name",
                ACTIVE
            ),
            vec![Bind::Text(date_text(from)), Bind::Text(date_text(to))],
        )
        .await
    }

    /// No engagement since `cutoff` (creation time counts when never engaged).
    pub async fn inactive_since(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Customer>> {
        self.fetch_customers(
            &format!(
                "SELECT * FROM customers WHERE {} AND COALESCE(last_engagement_at, created_at) < ? \
                 ORDER BY COALESCE(last_engagement_at, created_at), name",
                ACTIVE
            ),
            vec![Bind::Text(timestamp(&cutoff))],
        )
        .await
    }

    /// At least `threshold` open tickets.
    pub async fn with_open_tickets_at_least(&self, threshold: u32) -> StoreResult<Vec<Customer>> {
        self.fetch_customers(
            &format!(
                "SELECT * FROM customers WHERE {} AND open_tickets >= ? ORDER BY open_tickets DESC, name",
                ACTIVE
            ),
            vec![Bind::Int(threshold as i64)],
        )
        .await
    }

    /// Usage score strictly below `threshold`.
    pub async fn low_usage(&self, threshold: u8) -> StoreResult<Vec<Customer>> {
        self.fetch_customers(
            &format!(
                "SELECT * FROM customers WHERE {} AND usage_score < ? ORDER BY usage_score, name",
                ACTIVE
            ),
            vec![Bind::Int(threshold as i64)],
        )
        .await
    }

    /// Still onboarding, below `max_progress`, and created before `created_before`.
    pub async fn stalled_onboarding(
        &self,
        max_progress: u8,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<Customer>> {
        self.fetch_customers(
            "SELECT * FROM customers WHERE stage = 'onboarding' AND onboarding_progress < ? \
             AND created_at < ? ORDER BY created_at, name",
            vec![Bind::Int(max_progress as i64), Bind::Text(timestamp(&created_before))],
        )
        .await
    }

    async fn fetch_customers(&self, sql: &str, binds: Vec<Bind>) -> StoreResult<Vec<Customer>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = match bind {
                Bind::Int(value) => query.bind(value),
                Bind::Text(value) => query.bind(value),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(customer_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    /// Persist an alert.
    pub async fn record_alert(&self, alert: &Alert) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, customer_id, kind, severity, severity_rank, message, details,
                detected_at, acknowledged_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.id.to_string())
        .bind(alert.customer_id.to_string())
        .bind(alert.kind.as_str())
        .bind(alert.severity.as_str())
        .bind(severity_rank(alert.severity))
        .bind(&alert.message)
        .bind(serde_json::to_string(&alert.details)?)
        .bind(timestamp(&alert.detected_at))
        .bind(alert.acknowledged_at.as_ref().map(timestamp))
        .execute(&self.pool)
        .await?;

        debug!(alert_id = %alert.id, topic = %alert.topic(), "Alert recorded");
        Ok(())
    }

    /// Fetch an alert by id.
    pub async fn get_alert(&self, id: Uuid) -> StoreResult<Option<Alert>> {
        let row = sqlx::query("SELECT * FROM alerts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(alert_from_row).transpose()
    }

    /// List alerts, newest first.
    pub async fn list_alerts(&self, query: &AlertQuery) -> StoreResult<Vec<Alert>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM alerts WHERE 1 = 1");
        if let Some(customer_id) = query.customer_id {
            builder.push(" AND customer_id = ").push_bind(customer_id.to_string());
        }
        if let Some(kind) = query.kind {
            builder.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(severity) = query.min_severity {
            builder.push(" AND severity_rank >= ").push_bind(severity_rank(severity));
        }
        if query.unacknowledged_only {
            builder.push(" AND acknowledged_at IS NULL");
        }
        builder
            .push(" ORDER BY detected_at DESC, id DESC LIMIT ")
            .push_bind(query.effective_limit() as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(alert_from_row).collect()
    }

    /// Mark an alert acknowledged (idempotent) and return it.
    pub async fn acknowledge_alert(&self, id: Uuid) -> StoreResult<Alert> {
        let result = sqlx::query(
            "UPDATE alerts SET acknowledged_at = COALESCE(acknowledged_at, ?) WHERE id = ?",
        )
        .bind(timestamp(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::alert_not_found(id));
        }

        self.get_alert(id)
            .await?
            .ok_or_else(|| StoreError::alert_not_found(id))
    }

    /// When the most recent alert of `kind` for a customer was detected.
    pub async fn last_alert_for(
        &self,
        customer_id: Uuid,
        kind: AlertKind,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(detected_at) AS last FROM alerts WHERE customer_id = ? AND kind = ?",
        )
        .bind(customer_id.to_string())
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        let last: Option<String> = row.try_get("last")?;
        last.as_deref().map(parse_timestamp).transpose()
    }
}

enum Bind {
    Int(i64),
    Text(String),
}

fn push_customer_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &CustomerQuery) {
    if let Some(tier) = query.tier {
        builder.push(" AND tier = ").push_bind(tier.as_str());
    }
    if let Some(stage) = query.stage {
        builder.push(" AND stage = ").push_bind(stage.as_str());
    }
    if let Some(min) = query.min_health {
        builder.push(" AND health_score >= ").push_bind(min as i64);
    }
    if let Some(max) = query.max_health {
        builder.push(" AND health_score <= ").push_bind(max as i64);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        builder
            .push(" AND name LIKE ")
            .push_bind(format!("%{}%", escape_like(search)))
            .push(" ESCAPE '\\'");
    }
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn severity_rank(severity: Severity) -> i64 {
    match severity {
        Severity::Low => 0,
        Severity::Medium => 1,
        Severity::High => 2,
        Severity::Critical => 3,
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("timestamp '{}': {}", raw, e)))
}

fn parse_date(raw: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| StoreError::InvalidData(format!("date '{}': {}", raw, e)))
}

fn parse_uuid(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::InvalidData(format!("id '{}': {}", raw, e)))
}

fn small<T: TryFrom<i64>>(row: &SqliteRow, column: &str) -> StoreResult<T> {
    let value: i64 = row.try_get(column)?;
    T::try_from(value).map_err(|_| StoreError::InvalidData(format!("{} out of range: {}", column, value)))
}

fn customer_from_row(row: &SqliteRow) -> StoreResult<Customer> {
    let tier: String = row.try_get("tier")?;
    let stage: String = row.try_get("stage")?;
    let metadata: String = row.try_get("metadata")?;
    let nps: Option<i64> = row.try_get("nps_score")?;

    Ok(Customer {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        domain: row.try_get("domain")?,
        contact_email: row.try_get("contact_email")?,
        tier: CustomerTier::parse(&tier)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown tier '{}'", tier)))?,
        stage: LifecycleStage::parse(&stage)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown stage '{}'", stage)))?,
        health_score: small(row, "health_score")?,
        arr: row.try_get("arr")?,
        renewal_date: row
            .try_get::<Option<String>, _>("renewal_date")?
            .as_deref()
            .map(parse_date)
            .transpose()?,
        last_engagement_at: row
            .try_get::<Option<String>, _>("last_engagement_at")?
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        nps_score: nps
            .map(|v| {
                i16::try_from(v)
                    .map_err(|_| StoreError::InvalidData(format!("nps_score out of range: {}", v)))
            })
            .transpose()?,
        open_tickets: small(row, "open_tickets")?,
        usage_score: small(row, "usage_score")?,
        onboarding_progress: small(row, "onboarding_progress")?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn alert_from_row(row: &SqliteRow) -> StoreResult<Alert> {
    let kind: String = row.try_get("kind")?;
    let severity: String = row.try_get("severity")?;
    let details: String = row.try_get("details")?;

    Ok(Alert {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        customer_id: parse_uuid(&row.try_get::<String, _>("customer_id")?)?,
        kind: AlertKind::parse(&kind)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown alert kind '{}'", kind)))?,
        severity: Severity::parse(&severity)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown severity '{}'", severity)))?,
        message: row.try_get("message")?,
        details: serde_json::from_str(&details)?,
        detected_at: parse_timestamp(&row.try_get::<String, _>("detected_at")?)?,
        acknowledged_at: row
            .try_get::<Option<String>, _>("acknowledged_at")?
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
    })
}
