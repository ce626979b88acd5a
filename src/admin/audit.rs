/// Append-only audit trail of privileged actions
use crate::{
    admin::{AccessGate, Role},
    api::middleware::RequestContext,
    config::ListingConfig,
    db::parse_timestamp,
    error::{ModError, ModResult},
    pagination::{Page, PageRequest},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};
use tokio::sync::mpsc;

/// Closed set of audited actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    DeletePost,
    RestorePost,
    PinPost,
    UnpinPost,
    LockPost,
    UnlockPost,
    DeleteComment,
    RestoreComment,
    DeleteResource,
    RestoreResource,
    BanUser,
    UnbanUser,
    ChangeRole,
    ResetPassword,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DeletePost => "delete_post",
            AuditAction::RestorePost => "restore_post",
            AuditAction::PinPost => "pin_post",
            AuditAction::UnpinPost => "unpin_post",
            AuditAction::LockPost => "lock_post",
            AuditAction::UnlockPost => "unlock_post",
            AuditAction::DeleteComment => "delete_comment",
            AuditAction::RestoreComment => "restore_comment",
            AuditAction::DeleteResource => "delete_resource",
            AuditAction::RestoreResource => "restore_resource",
            AuditAction::BanUser => "ban_user",
            AuditAction::UnbanUser => "unban_user",
            AuditAction::ChangeRole => "change_role",
            AuditAction::ResetPassword => "reset_password",
            AuditAction::CreateCategory => "create_category",
            AuditAction::UpdateCategory => "update_category",
            AuditAction::DeleteCategory => "delete_category",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        let action = match s {
            "delete_post" => AuditAction::DeletePost,
            "restore_post" => AuditAction::RestorePost,
            "pin_post" => AuditAction::PinPost,
            "unpin_post" => AuditAction::UnpinPost,
            "lock_post" => AuditAction::LockPost,
            "unlock_post" => AuditAction::UnlockPost,
            "delete_comment" => AuditAction::DeleteComment,
            "restore_comment" => AuditAction::RestoreComment,
            "delete_resource" => AuditAction::DeleteResource,
            "restore_resource" => AuditAction::RestoreResource,
            "ban_user" => AuditAction::BanUser,
            "unban_user" => AuditAction::UnbanUser,
            "change_role" => AuditAction::ChangeRole,
            "reset_password" => AuditAction::ResetPassword,
            "create_category" => AuditAction::CreateCategory,
            "update_category" => AuditAction::UpdateCategory,
            "delete_category" => AuditAction::DeleteCategory,
            _ => return Err(ModError::Validation(format!("Invalid audit action: {}", s))),
        };
        Ok(action)
    }
}

/// Kind of entity an audit record points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditTarget {
    Post,
    Comment,
    Resource,
    User,
    Category,
}

impl AuditTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditTarget::Post => "post",
            AuditTarget::Comment => "comment",
            AuditTarget::Resource => "resource",
            AuditTarget::User => "user",
            AuditTarget::Category => "category",
        }
    }
}

/// Immutable audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub actor_id: i64,
    pub action: AuditAction,
    pub target_type: Option<String>,
    pub target_id: Option<i64>,
    pub description: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A write that could not be persisted
#[derive(Debug, Clone)]
pub struct AuditFailure {
    pub actor_id: i64,
    pub action: AuditAction,
    pub target_id: Option<i64>,
    pub error: String,
}

/// Listing filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<i64>,
    pub action: Option<AuditAction>,
    pub target_type: Option<AuditTarget>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Audit log.
///
/// Recording never fails from the caller's point of view: a store error is
/// logged and forwarded to the optional failure channel, and the action being
/// documented carries on.
#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
    gate: AccessGate,
    listing: ListingConfig,
    failures: Option<mpsc::UnboundedSender<AuditFailure>>,
}

impl AuditLog {
    pub fn new(db: SqlitePool, gate: AccessGate, listing: ListingConfig) -> Self {
        Self {
            db,
            gate,
            listing,
            failures: None,
        }
    }

    /// Route emission failures to a receiver in addition to the log
    pub fn with_failure_channel(mut self) -> (Self, mpsc::UnboundedReceiver<AuditFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.failures = Some(tx);
        (self, rx)
    }

    /// Record a privileged action
    pub async fn record(
        &self,
        actor_id: i64,
        action: AuditAction,
        target_type: Option<AuditTarget>,
        target_id: Option<i64>,
        description: Option<&str>,
        request: Option<&RequestContext>,
    ) {
        let result = self
            .insert(actor_id, action, target_type, target_id, description, request)
            .await;

        if let Err(e) = result {
            tracing::warn!(
                actor_id,
                action = action.as_str(),
                ?target_id,
                "Audit record could not be written: {}",
                e
            );

            if let Some(tx) = &self.failures {
                let _ = tx.send(AuditFailure {
                    actor_id,
                    action,
                    target_id,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Fire-and-forget variant that does not hold up the caller at all
    pub fn record_detached(
        &self,
        actor_id: i64,
        action: AuditAction,
        target_type: Option<AuditTarget>,
        target_id: Option<i64>,
        description: Option<String>,
        request: Option<RequestContext>,
    ) -> tokio::task::JoinHandle<()> {
        let log = self.clone();
        tokio::spawn(async move {
            log.record(
                actor_id,
                action,
                target_type,
                target_id,
                description.as_deref(),
                request.as_ref(),
            )
            .await;
        })
    }

    async fn insert(
        &self,
        actor_id: i64,
        action: AuditAction,
        target_type: Option<AuditTarget>,
        target_id: Option<i64>,
        description: Option<&str>,
        request: Option<&RequestContext>,
    ) -> ModResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO audit_logs
            (actor_id, action, target_type, target_id, description,
             ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(actor_id)
        .bind(action.as_str())
        .bind(target_type.map(|t| t.as_str()))
        .bind(target_id)
        .bind(description)
        .bind(request.and_then(|r| r.ip.as_deref()))
        .bind(request.and_then(|r| r.user_agent.as_deref()))
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// List records visible to a privileged viewer.
    ///
    /// Records whose actor holds a strictly higher role than the viewer are
    /// hidden.
    pub async fn list(
        &self,
        viewer_id: i64,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> ModResult<Page<AuditRecord>> {
        let viewer = self.gate.require_privileged(viewer_id).await?;
        let viewer_role = viewer.role;
        let (page_no, limit) = page.normalize(&self.listing);

        let mut count_query = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) FROM audit_logs a LEFT JOIN users u ON u.id = a.actor_id",
        );
        push_filters(&mut count_query, viewer_role, filter);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.db)
            .await?;

        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT a.id, a.actor_id, a.action, a.target_type, a.target_id, a.description,
                   a.ip_address, a.user_agent, a.created_at
            FROM audit_logs a
            LEFT JOIN users u ON u.id = a.actor_id
            "#,
        );
        push_filters(&mut query, viewer_role, filter);
        query.push(" ORDER BY a.created_at DESC, a.id DESC LIMIT ");
        query.push_bind(limit as i64);
        query.push(" OFFSET ");
        query.push_bind(page.offset(&self.listing) as i64);

        let rows = query.build().fetch_all(&self.db).await?;
        let items = rows
            .into_iter()
            .map(parse_record)
            .collect::<ModResult<Vec<_>>>()?;

        Ok(Page::new(items, total as u64, page_no, limit))
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, viewer_role: Role, filter: &AuditFilter) {
    query.push(
        " WHERE (CASE COALESCE(u.role, 'user') \
         WHEN 'super_admin' THEN 2 WHEN 'admin' THEN 1 ELSE 0 END) <= ",
    );
    query.push_bind(viewer_role.rank());

    if let Some(actor_id) = filter.actor_id {
        query.push(" AND a.actor_id = ").push_bind(actor_id);
    }
    if let Some(action) = filter.action {
        query.push(" AND a.action = ").push_bind(action.as_str());
    }
    if let Some(target_type) = filter.target_type {
        query.push(" AND a.target_type = ").push_bind(target_type.as_str());
    }
    if let Some(from) = filter.from {
        query.push(" AND a.created_at >= ").push_bind(from.to_rfc3339());
    }
    if let Some(to) = filter.to {
        query.push(" AND a.created_at <= ").push_bind(to.to_rfc3339());
    }
}

fn parse_record(row: SqliteRow) -> ModResult<AuditRecord> {
    let action_str: String = row.try_get("action")?;
    let created_at_str: String = row.try_get("created_at")?;

    Ok(AuditRecord {
        id: row.try_get("id")?,
        actor_id: row.try_get("actor_id")?,
        action: AuditAction::from_str(&action_str)?,
        target_type: row.try_get("target_type")?,
        target_id: row.try_get("target_id")?,
        description: row.try_get("description")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_pool, users::UserStore};

    async fn setup() -> (AuditLog, UserStore, SqlitePool) {
        let pool = memory_pool().await.unwrap();
        let users = UserStore::new(pool.clone());
        (
            AuditLog::new(pool.clone(), AccessGate::new(users), ListingConfig::default()),
            UserStore::new(pool.clone()),
            pool,
        )
    }

    #[test]
    fn test_action_names_round_trip() {
        let actions = [
            AuditAction::DeletePost,
            AuditAction::ChangeRole,
            AuditAction::DeleteCategory,
        ];
        for action in actions {
            assert_eq!(AuditAction::from_str(action.as_str()).unwrap(), action);
        }
        assert!(AuditAction::from_str("drop_table").is_err());
    }

    #[tokio::test]
    async fn test_record_captures_request_origin() {
        let (log, users, _) = setup().await;
        let admin = users.create_user("a@example.com", "admin", Role::Admin).await.unwrap();
        let request = RequestContext {
            ip: Some("203.0.113.9".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
        };

        log.record(
            admin.id,
            AuditAction::DeletePost,
            Some(AuditTarget::Post),
            Some(12),
            Some("spam"),
            Some(&request),
        )
        .await;

        let page = log
            .list(admin.id, &AuditFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        let record = &page.items[0];
        assert_eq!(record.action, AuditAction::DeletePost);
        assert_eq!(record.target_type.as_deref(), Some("post"));
        assert_eq!(record.target_id, Some(12));
        assert_eq!(record.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(record.user_agent.as_deref(), Some("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_record_swallows_store_failure() {
        let (log, users, pool) = setup().await;
        let (log, mut failures) = log.with_failure_channel();
        let admin = users.create_user("a@example.com", "admin", Role::Admin).await.unwrap();

        sqlx::query("DROP TABLE audit_logs").execute(&pool).await.unwrap();

        log.record(admin.id, AuditAction::BanUser, Some(AuditTarget::User), Some(3), None, None)
            .await;

        let failure = failures.try_recv().unwrap();
        assert_eq!(failure.action, AuditAction::BanUser);
        assert_eq!(failure.target_id, Some(3));
    }

    #[tokio::test]
    async fn test_detached_record_lands() {
        let (log, users, _) = setup().await;
        let admin = users.create_user("a@example.com", "admin", Role::Admin).await.unwrap();

        let target = Some(AuditTarget::Post);
        log.record_detached(admin.id, AuditAction::LockPost, target, Some(1), None, None)
            .await
            .unwrap();

        let page = log
            .list(admin.id, &AuditFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn test_list_hides_higher_roles_and_filters() {
        let (log, users, _) = setup().await;
        let admin = users.create_user("a@example.com", "admin", Role::Admin).await.unwrap();
        let root = users.create_user("r@example.com", "root", Role::SuperAdmin).await.unwrap();

        let post = Some(AuditTarget::Post);
        let user = Some(AuditTarget::User);
        log.record(admin.id, AuditAction::DeletePost, post, Some(1), None, None).await;
        log.record(root.id, AuditAction::ChangeRole, user, Some(admin.id), None, None).await;
        log.record(admin.id, AuditAction::PinPost, post, Some(1), None, None).await;

        let as_admin = log
            .list(admin.id, &AuditFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(as_admin.total, 2);
        assert!(as_admin.items.iter().all(|r| r.actor_id == admin.id));

        let as_root = log
            .list(root.id, &AuditFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(as_root.total, 3);

        let filter = AuditFilter {
            action: Some(AuditAction::PinPost),
            ..Default::default()
        };
        let pins = log.list(root.id, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(pins.total, 1);

        let filter = AuditFilter {
            from: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        let future = log.list(root.id, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(future.total, 0);

        let filter = AuditFilter {
            to: Some(Utc::now() - chrono::Duration::hours(1)),
            ..Default::default()
        };
        let past = log.list(root.id, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(past.total, 0);

        let filter = AuditFilter {
            to: Some(Utc::now() + chrono::Duration::hours(1)),
            ..Default::default()
        };
        let until_later = log.list(root.id, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(until_later.total, 3);

        let filter = AuditFilter {
            target_type: Some(AuditTarget::User),
            ..Default::default()
        };
        let on_users = log.list(root.id, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(on_users.total, 1);
        assert_eq!(on_users.items[0].action, AuditAction::ChangeRole);
        assert_eq!(on_users.items[0].target_id, Some(admin.id));

        let filter = AuditFilter {
            target_type: Some(AuditTarget::Comment),
            ..Default::default()
        };
        let on_comments = log.list(root.id, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(on_comments.total, 0);

        let paged = log
            .list(root.id, &AuditFilter::default(), PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(paged.items.len(), 1);
        assert_eq!(paged.total_pages, 2);
        assert!(paged.has_prev);
        assert!(!paged.has_next);
    }
}
