/// Shared state and dependency wiring
use crate::{
    admin::{AccessGate, AuditLog, ModerationStateMachine, ReportWorkflow},
    auth::{SessionIdentity, TokenService},
    config::ModerationConfig,
    db::{self, content::ContentStore, users::UserStore},
    error::{ModError, ModResult},
    identity::AnonymityMask,
};
use axum::response::Response;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

/// Everything a request handler needs, cheap to clone
#[derive(Clone)]
pub struct ModerationContext {
    pub config: Arc<ModerationConfig>,
    pub db: SqlitePool,
    pub users: UserStore,
    pub content: ContentStore,
    pub session: SessionIdentity,
    pub gate: AccessGate,
    pub audit: AuditLog,
    pub moderation: ModerationStateMachine,
    pub reports: ReportWorkflow,
    pub anonymity: AnonymityMask,
}

impl ModerationContext {
    /// Open the configured store, apply migrations and wire the components
    pub async fn new(config: ModerationConfig) -> ModResult<Self> {
        config.validate()?;

        let db = if config.storage.database_path == Path::new(":memory:") {
            db::memory_pool().await?
        } else {
            let options = db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            };
            let pool = db::create_pool(&config.storage.database_path, options).await?;
            db::run_migrations(&pool).await?;
            pool
        };

        tracing::info!(
            "Moderation store ready at {}",
            config.storage.database_path.display()
        );

        Ok(Self::with_pool(config, db))
    }

    /// Wire components over an existing, migrated pool
    pub fn with_pool(config: ModerationConfig, db: SqlitePool) -> Self {
        let users = UserStore::new(db.clone());
        let content = ContentStore::new(db.clone());
        let gate = AccessGate::new(users.clone());
        let session = SessionIdentity::new(TokenService::new(&config.auth), users.clone());
        let audit = AuditLog::new(db.clone(), gate.clone(), config.listing.clone());
        let moderation = ModerationStateMachine::new(
            users.clone(),
            content.clone(),
            gate.clone(),
            audit.clone(),
        );
        let reports = ReportWorkflow::new(
            db.clone(),
            content.clone(),
            gate.clone(),
            config.listing.clone(),
        );
        let anonymity =
            AnonymityMask::new(users.clone(), content.clone(), config.anonymity.clone());

        Self {
            config: Arc::new(config),
            db,
            users,
            content,
            session,
            gate,
            audit,
            moderation,
            reports,
            anonymity,
        }
    }

    /// Render a failure, attaching internal detail only in development
    pub fn error_response(&self, error: ModError) -> Response {
        error.into_response_with(self.config.diagnostics.expose_internal_errors)
    }

    /// Route audit failures to a receiver, e.g. for alerting
    pub fn with_audit_failure_channel(
        mut self,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<crate::admin::AuditFailure>) {
        let (audit, rx) = self.audit.with_failure_channel();
        self.moderation = ModerationStateMachine::new(
            self.users.clone(),
            self.content.clone(),
            self.gate.clone(),
            audit.clone(),
        );
        self.audit = audit;
        (self, rx)
    }
}
