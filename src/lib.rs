/// Forum moderation
///
/// Role-gated moderation of posts, comments, resources, accounts and
/// categories, with an append-only audit trail, a user report workflow and
/// author masking for anonymous categories.

pub mod admin;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod identity;
pub mod pagination;

pub use admin::{
    AccessGate, AuditAction, AuditLog, AuditRecord, ModerationStateMachine, Report, ReportStatus,
    ReportWorkflow, Role,
};
pub use auth::{AuthContext, SessionIdentity, TokenService};
pub use config::ModerationConfig;
pub use context::ModerationContext;
pub use error::{ErrorKind, ModError, ModResult};
pub use identity::{AnonymityMask, DisplayIdentity, PostView};
pub use pagination::{Page, PageRequest};

use config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Returns an error if a subscriber
/// is already installed.
pub fn init_tracing(config: &LoggingConfig) -> ModResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| ModError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
