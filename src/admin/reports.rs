/// User report intake and processing
use crate::{
    admin::{AccessGate, Role},
    config::ListingConfig,
    db::{
        content::{ContentKind, ContentStore},
        parse_optional_timestamp, parse_timestamp,
    },
    error::{ModError, ModResult},
    pagination::{Page, PageRequest},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// Minimum length of a trimmed report reason
pub const MIN_REASON_LEN: usize = 5;

/// Reportable content kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportTarget {
    Post,
    Resource,
}

impl ReportTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportTarget::Post => "post",
            ReportTarget::Resource => "resource",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "post" => Ok(ReportTarget::Post),
            "resource" => Ok(ReportTarget::Resource),
            _ => Err(ModError::Validation(format!("Invalid report target type: {}", s))),
        }
    }

    fn content_kind(&self) -> ContentKind {
        match self {
            ReportTarget::Post => ContentKind::Post,
            ReportTarget::Resource => ContentKind::Resource,
        }
    }
}

/// Report status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Processed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Processed => "processed",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReportStatus::Pending),
            "processed" => Ok(ReportStatus::Processed),
            _ => Err(ModError::Validation(format!("Invalid report status: {}", s))),
        }
    }
}

/// Report record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub reporter_id: i64,
    pub target_type: ReportTarget,
    pub target_id: i64,
    pub reason: String,
    pub status: ReportStatus,
    pub processed_by: Option<i64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Report workflow.
///
/// Each report moves `pending -> processed` exactly once. Processing is not
/// audited; the report row carries who processed it and when.
#[derive(Clone)]
pub struct ReportWorkflow {
    db: SqlitePool,
    content: ContentStore,
    gate: AccessGate,
    listing: ListingConfig,
}

impl ReportWorkflow {
    pub fn new(
        db: SqlitePool,
        content: ContentStore,
        gate: AccessGate,
        listing: ListingConfig,
    ) -> Self {
        Self {
            db,
            content,
            gate,
            listing,
        }
    }

    /// File a report against a post or resource
    pub async fn create(
        &self,
        reporter_id: i64,
        target_type: &str,
        target_id: i64,
        reason: &str,
    ) -> ModResult<Report> {
        self.gate.require_role(reporter_id, Role::User).await?;

        let target_type = ReportTarget::from_str(target_type)?;

        let reason = reason.trim();
        if reason.chars().count() < MIN_REASON_LEN {
            return Err(ModError::Validation(format!(
                "Report reason must be at least {} characters",
                MIN_REASON_LEN
            )));
        }

        let kind = target_type.content_kind();
        match self.content.get_entity(kind, target_id).await? {
            Some(entity) if !entity.is_deleted => {}
            _ => return Err(kind.not_found(target_id)),
        }

        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM reports
            WHERE reporter_id = ? AND target_type = ? AND target_id = ? AND status = 'pending'
            "#,
        )
        .bind(reporter_id)
        .bind(target_type.as_str())
        .bind(target_id)
        .fetch_optional(&self.db)
        .await?;

        if existing.is_some() {
            return Err(duplicate_pending());
        }

        let now = Utc::now();

        // The partial unique index catches a concurrent insert that slipped past the lookup
        let result = sqlx::query(
            r#"
            INSERT INTO reports (reporter_id, target_type, target_id, reason, status, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(reporter_id)
        .bind(target_type.as_str())
        .bind(target_id)
        .bind(reason)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                duplicate_pending()
            }
            other => ModError::Database(other),
        })?;

        let id = result.last_insert_rowid();
        tracing::info!(
            report_id = id,
            reporter_id,
            target_type = target_type.as_str(),
            target_id,
            "Report filed"
        );

        Ok(Report {
            id,
            reporter_id,
            target_type,
            target_id,
            reason: reason.to_string(),
            status: ReportStatus::Pending,
            processed_by: None,
            processed_at: None,
            remark: None,
            created_at: now,
        })
    }

    /// Mark a pending report as processed
    pub async fn process(
        &self,
        admin_id: i64,
        report_id: i64,
        remark: Option<&str>,
    ) -> ModResult<Report> {
        self.gate.require_privileged(admin_id).await?;

        let report = self
            .fetch(report_id)
            .await?
            .ok_or_else(|| report_not_found(report_id))?;

        if report.status == ReportStatus::Processed {
            return Err(ModError::Conflict(format!(
                "Report {} has already been processed",
                report_id
            )));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE reports
            SET status = 'processed',
                processed_by = ?,
                processed_at = ?,
                remark = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(admin_id)
        .bind(now.to_rfc3339())
        .bind(remark)
        .bind(report_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ModError::Conflict(format!(
                "Report {} has already been processed",
                report_id
            )));
        }

        tracing::info!(report_id, admin_id, "Report processed");

        Ok(Report {
            status: ReportStatus::Processed,
            processed_by: Some(admin_id),
            processed_at: Some(now),
            remark: remark.map(String::from),
            ..report
        })
    }

    /// Get a report by id, privileged viewers only
    pub async fn get(&self, viewer_id: i64, report_id: i64) -> ModResult<Report> {
        self.gate.require_privileged(viewer_id).await?;
        self.fetch(report_id)
            .await?
            .ok_or_else(|| report_not_found(report_id))
    }

    /// List reports newest first
    pub async fn list(
        &self,
        viewer_id: i64,
        status: Option<ReportStatus>,
        page: PageRequest,
    ) -> ModResult<Page<Report>> {
        self.gate.require_privileged(viewer_id).await?;

        let (page_no, limit) = page.normalize(&self.listing);
        let offset = page.offset(&self.listing) as i64;
        let status = status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reports WHERE (?1 IS NULL OR status = ?1)",
        )
        .bind(status)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query(
            r#"
            SELECT id, reporter_id, target_type, target_id, reason, status,
                   processed_by, processed_at, remark, created_at
            FROM reports
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(status)
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let mut reports = Vec::with_capacity(rows.len());
        for row in rows {
            reports.push(parse_report(row)?);
        }

        Ok(Page::new(reports, total as u64, page_no, limit))
    }

    async fn fetch(&self, report_id: i64) -> ModResult<Option<Report>> {
        let row = sqlx::query(
            r#"
            SELECT id, reporter_id, target_type, target_id, reason, status,
                   processed_by, processed_at, remark, created_at
            FROM reports
            WHERE id = ?
            "#,
        )
        .bind(report_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(parse_report).transpose()
    }
}

fn duplicate_pending() -> ModError {
    ModError::Conflict("A pending report for this target already exists".to_string())
}

fn report_not_found(id: i64) -> ModError {
    ModError::NotFound(format!("Report {} not found", id))
}

fn parse_report(row: sqlx::sqlite::SqliteRow) -> ModResult<Report> {
    let target_type_str: String = row.try_get("target_type")?;
    let status_str: String = row.try_get("status")?;
    let created_at_str: String = row.try_get("created_at")?;

    Ok(Report {
        id: row.try_get("id")?,
        reporter_id: row.try_get("reporter_id")?,
        target_type: ReportTarget::from_str(&target_type_str)?,
        target_id: row.try_get("target_id")?,
        reason: row.try_get("reason")?,
        status: ReportStatus::from_str(&status_str)?,
        processed_by: row.try_get("processed_by")?,
        processed_at: parse_optional_timestamp(row.try_get("processed_at")?)?,
        remark: row.try_get("remark")?,
        created_at: parse_timestamp(&created_at_str)?,
    })
}
