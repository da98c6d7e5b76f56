//! SQLite storage layer for CivicSense.
//!
//! Four tables: `users`, `departments`, `complaints`, `complaint_history`.
//! Timestamps are stored as unix milliseconds; enums as their `as_str` form,
//! parsed back on read so a corrupted row surfaces as an error instead of an
//! impossible state.
//!
//! The one multi-statement write is [`Storage::apply_transition`]: the status
//! update and its history row commit in a single transaction, guarded by an
//! optimistic check on `updated_at`. A guard miss rolls the whole thing back
//! and reports the conflict to the caller.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::model::{Complaint, ComplaintStatus, Department, HistoryEntry, Role, User};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

fn to_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// `database_url` is a SQLite connection string such as
    /// `sqlite:civicsense.db?mode=rwc` or `sqlite::memory:`.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS departments (
                department_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                jurisdiction_polygon TEXT,
                centroid_lat REAL,
                centroid_lng REAL,
                is_default INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS complaints (
                complaint_id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                department_id INTEGER NOT NULL,
                assigned_worker_id INTEGER,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                issue_type TEXT NOT NULL,
                category TEXT NOT NULL,
                image_url TEXT,
                location_lat REAL NOT NULL,
                location_lng REAL NOT NULL,
                priority TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_complaints_user
            ON complaints(user_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_complaints_assignee
            ON complaints(assigned_worker_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS complaint_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                complaint_id TEXT NOT NULL,
                from_status TEXT NOT NULL,
                to_status TEXT NOT NULL,
                remarks TEXT,
                changed_by INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_history_complaint
            ON complaint_history(complaint_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Insert a new user and return it with its assigned id.
    pub async fn insert_user(
        &self,
        subject: &str,
        name: &str,
        email: &str,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (subject, name, email, role, is_active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            RETURNING user_id
            "#,
        )
        .bind(subject)
        .bind(name)
        .bind(email)
        .bind(role.as_str())
        .bind(to_ms(created_at))
        .fetch_one(&self.pool)
        .await?;

        Ok(User {
            user_id: row.get("user_id"),
            subject: subject.to_string(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            is_active: true,
            created_at,
        })
    }

    /// Look up an active user by identity-provider subject.
    pub async fn select_user_by_subject(&self, subject: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, subject, name, email, role, is_active, created_at
            FROM users
            WHERE subject = ? AND is_active = 1
            "#,
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| user_from_row(&r)).transpose()
    }

    // ------------------------------------------------------------------
    // Departments
    // ------------------------------------------------------------------

    /// Insert a department. Used by seed tooling and tests; the service
    /// itself never writes departments.
    pub async fn insert_department(&self, department: &Department) -> anyhow::Result<()> {
        let polygon_json = department
            .jurisdiction_polygon
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO departments
                (department_id, name, jurisdiction_polygon, centroid_lat, centroid_lng, is_default)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(department.department_id)
        .bind(&department.name)
        .bind(polygon_json)
        .bind(department.centroid_lat)
        .bind(department.centroid_lng)
        .bind(department.is_default)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All departments in ascending id order.
    pub async fn select_departments(&self) -> anyhow::Result<Vec<Department>> {
        let rows = sqlx::query(
            r#"
            SELECT department_id, name, jurisdiction_polygon, centroid_lat, centroid_lng, is_default
            FROM departments
            ORDER BY department_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(department_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Complaints
    // ------------------------------------------------------------------

    pub async fn insert_complaint(&self, complaint: &Complaint) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO complaints (
                complaint_id, user_id, department_id, assigned_worker_id,
                title, description, issue_type, category, image_url,
                location_lat, location_lng, priority, status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&complaint.complaint_id)
        .bind(complaint.user_id)
        .bind(complaint.department_id)
        .bind(complaint.assigned_worker_id)
        .bind(&complaint.title)
        .bind(&complaint.description)
        .bind(&complaint.issue_type)
        .bind(&complaint.category)
        .bind(&complaint.image_url)
        .bind(complaint.location_lat)
        .bind(complaint.location_lng)
        .bind(complaint.priority.as_str())
        .bind(complaint.status.as_str())
        .bind(to_ms(complaint.created_at))
        .bind(to_ms(complaint.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn select_complaint(&self, complaint_id: &str) -> anyhow::Result<Option<Complaint>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM complaints WHERE complaint_id = ?
            "#,
        )
        .bind(complaint_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| complaint_from_row(&r)).transpose()
    }

    /// A user's own complaints, newest first.
    pub async fn select_complaints_by_owner(&self, user_id: i64) -> anyhow::Result<Vec<Complaint>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM complaints WHERE user_id = ? ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(complaint_from_row).collect()
    }

    /// Complaints assigned to a staff member, newest first.
    pub async fn select_complaints_by_assignee(
        &self,
        worker_id: i64,
    ) -> anyhow::Result<Vec<Complaint>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM complaints WHERE assigned_worker_id = ? ORDER BY created_at DESC
            "#,
        )
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(complaint_from_row).collect()
    }

    /// Commit a lifecycle transition: status update plus history row, both or
    /// neither.
    ///
    /// The update is guarded by `expected_updated_at`; if another writer got
    /// there first the guard misses, everything rolls back, and this returns
    /// `Ok(false)` so the caller can re-read and retry or report a conflict.
    /// `assign_worker`, when set, lands in the same transaction.
    pub async fn apply_transition(
        &self,
        expected_updated_at: DateTime<Utc>,
        new_status: ComplaintStatus,
        new_updated_at: DateTime<Utc>,
        assign_worker: Option<i64>,
        entry: &HistoryEntry,
    ) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE complaints
            SET status = ?,
                updated_at = ?,
                assigned_worker_id = COALESCE(?, assigned_worker_id)
            WHERE complaint_id = ? AND updated_at = ?
            "#,
        )
        .bind(new_status.as_str())
        .bind(to_ms(new_updated_at))
        .bind(assign_worker)
        .bind(&entry.complaint_id)
        .bind(to_ms(expected_updated_at))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO complaint_history
                (complaint_id, from_status, to_status, remarks, changed_by, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.complaint_id)
        .bind(entry.from_status.as_str())
        .bind(entry.to_status.as_str())
        .bind(&entry.remarks)
        .bind(entry.changed_by)
        .bind(to_ms(entry.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }

    // ------------------------------------------------------------------
    // History ledger
    // ------------------------------------------------------------------

    /// Audit trail for a complaint, oldest entry first.
    pub async fn list_history(&self, complaint_id: &str) -> anyhow::Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT complaint_id, from_status, to_status, remarks, changed_by, created_at
            FROM complaint_history
            WHERE complaint_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(complaint_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(history_from_row).collect()
    }
}

fn user_from_row(row: &SqliteRow) -> anyhow::Result<User> {
    let role: String = row.get("role");
    Ok(User {
        user_id: row.get("user_id"),
        subject: row.get("subject"),
        name: row.get("name"),
        email: row.get("email"),
        role: role.parse()?,
        is_active: row.get("is_active"),
        created_at: from_ms(row.get("created_at")),
    })
}

fn department_from_row(row: &SqliteRow) -> anyhow::Result<Department> {
    let polygon_json: Option<String> = row.get("jurisdiction_polygon");
    let jurisdiction_polygon = polygon_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(Department {
        department_id: row.get("department_id"),
        name: row.get("name"),
        jurisdiction_polygon,
        centroid_lat: row.get("centroid_lat"),
        centroid_lng: row.get("centroid_lng"),
        is_default: row.get("is_default"),
    })
}

fn complaint_from_row(row: &SqliteRow) -> anyhow::Result<Complaint> {
    let priority: String = row.get("priority");
    let status: String = row.get("status");

    Ok(Complaint {
        complaint_id: row.get("complaint_id"),
        user_id: row.get("user_id"),
        department_id: row.get("department_id"),
        assigned_worker_id: row.get("assigned_worker_id"),
        title: row.get("title"),
        description: row.get("description"),
        issue_type: row.get("issue_type"),
        category: row.get("category"),
        image_url: row.get("image_url"),
        location_lat: row.get("location_lat"),
        location_lng: row.get("location_lng"),
        priority: priority.parse()?,
        status: status.parse()?,
        created_at: from_ms(row.get("created_at")),
        updated_at: from_ms(row.get("updated_at")),
    })
}

fn history_from_row(row: &SqliteRow) -> anyhow::Result<HistoryEntry> {
    let from_status: String = row.get("from_status");
    let to_status: String = row.get("to_status");

    Ok(HistoryEntry {
        complaint_id: row.get("complaint_id"),
        from_status: from_status.parse()?,
        to_status: to_status.parse()?,
        remarks: row.get("remarks"),
        changed_by: row.get("changed_by"),
        created_at: from_ms(row.get("created_at")),
    })
}

/// Whether a write failed on a UNIQUE constraint, as opposed to any other
/// driver error. Callers map this to a validation failure.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db| db.is_unique_violation())
}
