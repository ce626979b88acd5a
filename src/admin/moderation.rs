/// Moderation state machine for content, accounts and categories
use crate::{
    admin::{
        audit::{AuditAction, AuditLog, AuditTarget},
        AccessGate, Role,
    },
    api::middleware::RequestContext,
    db::{
        content::{
            Category, CategoryUpdate, ContentEntity, ContentFlag, ContentKind, ContentStore,
            NewCategory,
        },
        users::{Identity, UserStore},
    },
    error::{ModError, ModResult},
};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Length of generated temporary passwords
const TEMP_PASSWORD_LEN: usize = 12;

/// One-time result of a password reset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporaryPassword {
    pub user_id: i64,
    /// Plaintext, shown once and never stored
    pub password: String,
}

impl From<ContentKind> for AuditTarget {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Post => AuditTarget::Post,
            ContentKind::Comment => AuditTarget::Comment,
            ContentKind::Resource => AuditTarget::Resource,
        }
    }
}

/// Applies privileged transitions and records each one in the audit log.
///
/// Content state is `active <-> deleted`, plus independent `pinned` and
/// `locked` flags on posts. Repeating a transition in the same direction is a
/// `Conflict`. Every write is conditional on the prior state, so of two
/// concurrent identical calls exactly one succeeds and is audited.
#[derive(Clone)]
pub struct ModerationStateMachine {
    users: UserStore,
    content: ContentStore,
    gate: AccessGate,
    audit: AuditLog,
}

impl ModerationStateMachine {
    pub fn new(users: UserStore, content: ContentStore, gate: AccessGate, audit: AuditLog) -> Self {
        Self {
            users,
            content,
            gate,
            audit,
        }
    }

    // ------------------------------------------------------------------
    // Soft delete / restore
    // ------------------------------------------------------------------

    pub async fn delete_post(
        &self,
        actor_id: i64,
        post_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        self.set_deleted(actor_id, ContentKind::Post, post_id, true, request).await
    }

    pub async fn restore_post(
        &self,
        actor_id: i64,
        post_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        self.set_deleted(actor_id, ContentKind::Post, post_id, false, request).await
    }

    pub async fn delete_comment(
        &self,
        actor_id: i64,
        comment_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        self.set_deleted(actor_id, ContentKind::Comment, comment_id, true, request).await
    }

    pub async fn restore_comment(
        &self,
        actor_id: i64,
        comment_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        self.set_deleted(actor_id, ContentKind::Comment, comment_id, false, request).await
    }

    /// Restore a resource its owner soft-deleted
    pub async fn restore_resource(
        &self,
        actor_id: i64,
        resource_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        self.set_deleted(actor_id, ContentKind::Resource, resource_id, false, request).await
    }

    /// Permanently remove a resource.
    ///
    /// Unlike posts and comments the row is gone afterwards, so a repeated
    /// call reports `NotFound`.
    pub async fn delete_resource(
        &self,
        actor_id: i64,
        resource_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<()> {
        let actor = self.gate.require_privileged(actor_id).await?;

        let entity = self
            .content
            .get_entity(ContentKind::Resource, resource_id)
            .await?
            .ok_or_else(|| ContentKind::Resource.not_found(resource_id))?;

        if !self.content.hard_delete_resource(resource_id).await? {
            return Err(ContentKind::Resource.not_found(resource_id));
        }

        tracing::info!(
            actor_id = actor.id,
            resource_id,
            owner_id = entity.owner_id,
            "Resource permanently deleted"
        );

        self.audit
            .record(
                actor.id,
                AuditAction::DeleteResource,
                Some(AuditTarget::Resource),
                Some(resource_id),
                None,
                request,
            )
            .await;

        Ok(())
    }

    async fn set_deleted(
        &self,
        actor_id: i64,
        kind: ContentKind,
        id: i64,
        deleted: bool,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        let actor = self.gate.require_privileged(actor_id).await?;
        let entity = self.transition_deleted(kind, id, deleted).await?;

        tracing::info!(
            actor_id = actor.id,
            target = kind.as_str(),
            id,
            deleted,
            "Content moderation state changed"
        );

        self.audit
            .record(
                actor.id,
                deletion_action(kind, deleted),
                Some(kind.into()),
                Some(id),
                None,
                request,
            )
            .await;

        Ok(entity)
    }

    /// NotFound / Conflict ladder followed by the guarded write
    async fn transition_deleted(
        &self,
        kind: ContentKind,
        id: i64,
        deleted: bool,
    ) -> ModResult<ContentEntity> {
        let entity = self
            .content
            .get_entity(kind, id)
            .await?
            .ok_or_else(|| kind.not_found(id))?;

        if entity.is_deleted == deleted {
            return Err(already(kind, id, if deleted { "deleted" } else { "active" }));
        }

        if !self.content.set_deleted(kind, id, deleted).await? {
            return Err(already(kind, id, if deleted { "deleted" } else { "active" }));
        }

        self.content
            .get_entity(kind, id)
            .await?
            .ok_or_else(|| kind.not_found(id))
    }

    // ------------------------------------------------------------------
    // Owner-initiated delete
    // ------------------------------------------------------------------

    pub async fn delete_own_post(
        &self,
        caller_id: i64,
        post_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<()> {
        self.delete_own(caller_id, ContentKind::Post, post_id, request).await
    }

    pub async fn delete_own_comment(
        &self,
        caller_id: i64,
        comment_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<()> {
        self.delete_own(caller_id, ContentKind::Comment, comment_id, request).await
    }

    pub async fn delete_own_resource(
        &self,
        caller_id: i64,
        resource_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<()> {
        self.delete_own(caller_id, ContentKind::Resource, resource_id, request).await
    }

    /// Privileged callers take the audited path; plain owners soft-delete silently
    async fn delete_own(
        &self,
        caller_id: i64,
        kind: ContentKind,
        id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<()> {
        let caller = self.gate.require_role(caller_id, Role::User).await?;

        if caller.role.is_privileged() {
            return match kind {
                ContentKind::Resource => self.delete_resource(caller.id, id, request).await,
                _ => self.set_deleted(caller.id, kind, id, true, request).await.map(|_| ()),
            };
        }

        let entity = self
            .content
            .get_entity(kind, id)
            .await?
            .ok_or_else(|| kind.not_found(id))?;

        if entity.owner_id != caller.id {
            return Err(ModError::Forbidden(format!(
                "Only the owner can delete this {}",
                kind.as_str()
            )));
        }

        self.transition_deleted(kind, id, true).await?;
        tracing::debug!(owner_id = caller.id, target = kind.as_str(), id, "Owner deleted content");

        Ok(())
    }

    // ------------------------------------------------------------------
    // Pin / lock
    // ------------------------------------------------------------------

    pub async fn pin_post(
        &self,
        actor_id: i64,
        post_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        self.set_flag(actor_id, post_id, ContentFlag::Pinned, true, request).await
    }

    pub async fn unpin_post(
        &self,
        actor_id: i64,
        post_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        self.set_flag(actor_id, post_id, ContentFlag::Pinned, false, request).await
    }

    pub async fn lock_post(
        &self,
        actor_id: i64,
        post_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        self.set_flag(actor_id, post_id, ContentFlag::Locked, true, request).await
    }

    pub async fn unlock_post(
        &self,
        actor_id: i64,
        post_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        self.set_flag(actor_id, post_id, ContentFlag::Locked, false, request).await
    }

    async fn set_flag(
        &self,
        actor_id: i64,
        post_id: i64,
        flag: ContentFlag,
        value: bool,
        request: Option<&RequestContext>,
    ) -> ModResult<ContentEntity> {
        let actor = self.gate.require_privileged(actor_id).await?;

        let entity = self
            .content
            .get_entity(ContentKind::Post, post_id)
            .await?
            .ok_or_else(|| ContentKind::Post.not_found(post_id))?;

        if entity.is_deleted {
            return Err(ModError::Conflict(format!("Post {} is deleted", post_id)));
        }

        let (current, action, state) = match (flag, value) {
            (ContentFlag::Pinned, true) => (entity.is_pinned, AuditAction::PinPost, "pinned"),
            (ContentFlag::Pinned, false) => (entity.is_pinned, AuditAction::UnpinPost, "unpinned"),
            (ContentFlag::Locked, true) => (entity.is_locked, AuditAction::LockPost, "locked"),
            (ContentFlag::Locked, false) => (entity.is_locked, AuditAction::UnlockPost, "unlocked"),
        };

        if current == Some(value) || !self.content.set_post_flag(post_id, flag, value).await? {
            return Err(already(ContentKind::Post, post_id, state));
        }

        tracing::info!(actor_id = actor.id, post_id, action = action.as_str(), "Post flag changed");

        self.audit
            .record(actor.id, action, Some(AuditTarget::Post), Some(post_id), None, request)
            .await;

        self.content
            .get_entity(ContentKind::Post, post_id)
            .await?
            .ok_or_else(|| ContentKind::Post.not_found(post_id))
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub async fn ban_user(
        &self,
        actor_id: i64,
        user_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<Identity> {
        self.set_active(actor_id, user_id, false, request).await
    }

    pub async fn unban_user(
        &self,
        actor_id: i64,
        user_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<Identity> {
        self.set_active(actor_id, user_id, true, request).await
    }

    async fn set_active(
        &self,
        actor_id: i64,
        user_id: i64,
        active: bool,
        request: Option<&RequestContext>,
    ) -> ModResult<Identity> {
        let actor = self.gate.require_privileged(actor_id).await?;
        let target = self.load_subordinate(&actor, user_id).await?;

        let state = if active { "active" } else { "banned" };
        if target.is_active == active || !self.users.set_active(user_id, active).await? {
            return Err(ModError::Conflict(format!("User {} is already {}", user_id, state)));
        }

        let action = if active {
            AuditAction::UnbanUser
        } else {
            AuditAction::BanUser
        };
        tracing::info!(
            actor_id = actor.id,
            user_id,
            action = action.as_str(),
            "Account status changed"
        );

        self.audit
            .record(actor.id, action, Some(AuditTarget::User), Some(user_id), None, request)
            .await;

        Ok(Identity {
            is_active: active,
            ..target
        })
    }

    /// Grant or revoke a role. Super admins only.
    pub async fn change_role(
        &self,
        actor_id: i64,
        user_id: i64,
        role: Role,
        request: Option<&RequestContext>,
    ) -> ModResult<Identity> {
        let actor = self.gate.require_super_privileged(actor_id).await?;

        if actor.id == user_id {
            return Err(ModError::Forbidden("Cannot change your own role".to_string()));
        }

        let target = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| ModError::NotFound(format!("User {} not found", user_id)))?;

        if target.role == role {
            return Err(ModError::Conflict(format!(
                "User {} already has role {}",
                user_id,
                role.as_str()
            )));
        }

        self.users.set_role(user_id, role).await?;

        let description = format!("{} -> {}", target.role.as_str(), role.as_str());
        tracing::info!(actor_id = actor.id, user_id, %description, "Role changed");

        self.audit
            .record(
                actor.id,
                AuditAction::ChangeRole,
                Some(AuditTarget::User),
                Some(user_id),
                Some(&description),
                request,
            )
            .await;

        Ok(Identity { role, ..target })
    }

    /// Replace a user's password with a generated one and return it once
    pub async fn reset_password(
        &self,
        actor_id: i64,
        user_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<TemporaryPassword> {
        let actor = self.gate.require_privileged(actor_id).await?;
        self.load_subordinate(&actor, user_id).await?;

        let password = generate_temporary_password();
        let hash = hash_password(&password)?;
        self.users.set_password_hash(user_id, &hash).await?;

        tracing::info!(actor_id = actor.id, user_id, "Password reset");

        self.audit
            .record(
                actor.id,
                AuditAction::ResetPassword,
                Some(AuditTarget::User),
                Some(user_id),
                None,
                request,
            )
            .await;

        Ok(TemporaryPassword { user_id, password })
    }

    /// Target must exist, not be the actor, and rank strictly below the actor
    async fn load_subordinate(&self, actor: &Identity, user_id: i64) -> ModResult<Identity> {
        let target = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| ModError::NotFound(format!("User {} not found", user_id)))?;

        if target.id == actor.id {
            return Err(ModError::Forbidden("Cannot moderate your own account".to_string()));
        }

        if target.role >= actor.role {
            tracing::warn!(
                "Moderation: {} ({}) cannot act on {} ({})",
                actor.id,
                actor.role.as_str(),
                target.id,
                target.role.as_str()
            );
            return Err(ModError::Forbidden(format!(
                "Cannot moderate a user with role {}",
                target.role.as_str()
            )));
        }

        Ok(target)
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    pub async fn create_category(
        &self,
        actor_id: i64,
        input: &NewCategory,
        request: Option<&RequestContext>,
    ) -> ModResult<Category> {
        let actor = self.gate.require_privileged(actor_id).await?;
        input.validate()?;

        let name = input.name.trim();
        if name.is_empty() {
            return Err(ModError::Validation("Category name cannot be blank".to_string()));
        }

        let category = self
            .content
            .create_category(name, input.description.as_deref(), input.is_anonymous)
            .await?;

        tracing::info!(actor_id = actor.id, category_id = category.id, "Category created");

        self.audit
            .record(
                actor.id,
                AuditAction::CreateCategory,
                Some(AuditTarget::Category),
                Some(category.id),
                Some(&category.name),
                request,
            )
            .await;

        Ok(category)
    }

    pub async fn update_category(
        &self,
        actor_id: i64,
        category_id: i64,
        update: &CategoryUpdate,
        request: Option<&RequestContext>,
    ) -> ModResult<Category> {
        let actor = self.gate.require_privileged(actor_id).await?;
        update.validate()?;

        if update.is_empty() {
            return Err(ModError::Validation("Nothing to update".to_string()));
        }

        let category = self.content.update_category(category_id, update).await?;

        tracing::info!(actor_id = actor.id, category_id, "Category updated");

        self.audit
            .record(
                actor.id,
                AuditAction::UpdateCategory,
                Some(AuditTarget::Category),
                Some(category_id),
                None,
                request,
            )
            .await;

        Ok(category)
    }

    pub async fn delete_category(
        &self,
        actor_id: i64,
        category_id: i64,
        request: Option<&RequestContext>,
    ) -> ModResult<()> {
        let actor = self.gate.require_privileged(actor_id).await?;

        let category = self
            .content
            .get_category(category_id)
            .await?
            .ok_or_else(|| ModError::NotFound(format!("Category {} not found", category_id)))?;

        if self.content.category_in_use(category_id).await? {
            return Err(ModError::Conflict(format!(
                "Category {} still has posts or resources",
                category_id
            )));
        }

        if !self.content.delete_category(category_id).await? {
            return Err(ModError::NotFound(format!("Category {} not found", category_id)));
        }

        tracing::info!(actor_id = actor.id, category_id, "Category deleted");

        self.audit
            .record(
                actor.id,
                AuditAction::DeleteCategory,
                Some(AuditTarget::Category),
                Some(category_id),
                Some(&category.name),
                request,
            )
            .await;

        Ok(())
    }
}

fn deletion_action(kind: ContentKind, deleted: bool) -> AuditAction {
    match (kind, deleted) {
        (ContentKind::Post, true) => AuditAction::DeletePost,
        (ContentKind::Post, false) => AuditAction::RestorePost,
        (ContentKind::Comment, true) => AuditAction::DeleteComment,
        (ContentKind::Comment, false) => AuditAction::RestoreComment,
        (ContentKind::Resource, true) => AuditAction::DeleteResource,
        (ContentKind::Resource, false) => AuditAction::RestoreResource,
    }
}

fn already(kind: ContentKind, id: i64, state: &str) -> ModError {
    ModError::Conflict(format!("{} {} is already {}", kind.as_str(), id, state))
}

fn generate_temporary_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

fn hash_password(password: &str) -> ModResult<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|e| ModError::Internal(format!("Failed to generate salt: {}", e)))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| ModError::Internal(format!("Failed to encode salt: {}", e)))?;

    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ModError::Internal(format!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(phc)
}

/// Check a plaintext password against a stored PHC hash
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        admin::audit::AuditFilter,
        config::ListingConfig,
        db::memory_pool,
        pagination::PageRequest,
    };
    use sqlx::SqlitePool;

    struct Fixture {
        machine: ModerationStateMachine,
        audit: AuditLog,
        users: UserStore,
        content: ContentStore,
        pool: SqlitePool,
        member: Identity,
        admin: Identity,
        root: Identity,
        category: Category,
    }

    async fn setup() -> Fixture {
        let pool = memory_pool().await.unwrap();
        let users = UserStore::new(pool.clone());
        let content = ContentStore::new(pool.clone());
        let gate = AccessGate::new(users.clone());
        let audit = AuditLog::new(pool.clone(), gate.clone(), ListingConfig::default());
        let machine =
            ModerationStateMachine::new(users.clone(), content.clone(), gate, audit.clone());

        let member = users.create_user("m@example.com", "member", Role::User).await.unwrap();
        let admin = users.create_user("a@example.com", "admin", Role::Admin).await.unwrap();
        let root = users.create_user("r@example.com", "root", Role::SuperAdmin).await.unwrap();
        let category = content.create_category("general", None, false).await.unwrap();

        Fixture {
            machine,
            audit,
            users,
            content,
            pool,
            member,
            admin,
            root,
            category,
        }
    }

    async fn audit_count(f: &Fixture) -> u64 {
        f.audit
            .list(f.root.id, &AuditFilter::default(), PageRequest::default())
            .await
            .unwrap()
            .total
    }

    #[tokio::test]
    async fn test_post_delete_restore_cycle() {
        let f = setup().await;
        let post = f.content.create_post(f.member.id, f.category.id, "t", "c").await.unwrap();

        let deleted = f.machine.delete_post(f.admin.id, post.id, None).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(deleted.deleted_at.is_some());
        assert!(matches!(
            f.machine.delete_post(f.admin.id, post.id, None).await,
            Err(ModError::Conflict(_))
        ));

        let restored = f.machine.restore_post(f.admin.id, post.id, None).await.unwrap();
        assert!(!restored.is_deleted);
        assert!(restored.deleted_at.is_none());
        assert!(matches!(
            f.machine.restore_post(f.admin.id, post.id, None).await,
            Err(ModError::Conflict(_))
        ));

        assert_eq!(audit_count(&f).await, 2);
    }

    #[tokio::test]
    async fn test_comment_cycle_and_missing_rows() {
        let f = setup().await;
        let post = f.content.create_post(f.member.id, f.category.id, "t", "c").await.unwrap();
        let comment = f.content.create_comment(post.id, f.member.id, "hi").await.unwrap();

        f.machine.delete_comment(f.admin.id, comment.id, None).await.unwrap();
        assert!(matches!(
            f.machine.delete_comment(f.admin.id, comment.id, None).await,
            Err(ModError::Conflict(_))
        ));
        f.machine.restore_comment(f.admin.id, comment.id, None).await.unwrap();
        assert!(matches!(
            f.machine.restore_comment(f.admin.id, comment.id, None).await,
            Err(ModError::Conflict(_))
        ));

        assert!(matches!(
            f.machine.delete_comment(f.admin.id, 999, None).await,
            Err(ModError::NotFound(_))
        ));
        assert!(matches!(
            f.machine.restore_post(f.admin.id, 999, None).await,
            Err(ModError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_member_cannot_moderate() {
        let f = setup().await;
        let post = f.content.create_post(f.admin.id, f.category.id, "t", "c").await.unwrap();

        assert!(matches!(
            f.machine.delete_post(f.member.id, post.id, None).await,
            Err(ModError::Forbidden(_))
        ));
        assert!(matches!(
            f.machine.pin_post(f.member.id, post.id, None).await,
            Err(ModError::Forbidden(_))
        ));
        assert_eq!(audit_count(&f).await, 0);
    }

    #[tokio::test]
    async fn test_resource_hard_delete_and_restore() {
        let f = setup().await;
        let resource = f
            .content
            .create_resource(
                f.member.id,
                f.category.id,
                "Rust book",
                "https://doc.rust-lang.org/book/",
            )
            .await
            .unwrap();

        f.machine.delete_own_resource(f.member.id, resource.id, None).await.unwrap();
        f.machine.restore_resource(f.admin.id, resource.id, None).await.unwrap();
        assert!(matches!(
            f.machine.restore_resource(f.admin.id, resource.id, None).await,
            Err(ModError::Conflict(_))
        ));

        f.machine.delete_resource(f.admin.id, resource.id, None).await.unwrap();
        assert!(f.content.get_resource(resource.id).await.unwrap().is_none());
        assert!(matches!(
            f.machine.delete_resource(f.admin.id, resource.id, None).await,
            Err(ModError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pin_and_lock_reject_repeats() {
        let f = setup().await;
        let post = f.content.create_post(f.member.id, f.category.id, "t", "c").await.unwrap();

        let pinned = f.machine.pin_post(f.admin.id, post.id, None).await.unwrap();
        assert_eq!(pinned.is_pinned, Some(true));
        assert!(matches!(
            f.machine.pin_post(f.admin.id, post.id, None).await,
            Err(ModError::Conflict(_))
        ));
        f.machine.unpin_post(f.admin.id, post.id, None).await.unwrap();
        assert!(matches!(
            f.machine.unpin_post(f.admin.id, post.id, None).await,
            Err(ModError::Conflict(_))
        ));

        let locked = f.machine.lock_post(f.admin.id, post.id, None).await.unwrap();
        assert_eq!(locked.is_locked, Some(true));
        assert_eq!(locked.is_pinned, Some(false));
        assert!(matches!(
            f.machine.lock_post(f.admin.id, post.id, None).await,
            Err(ModError::Conflict(_))
        ));
        f.machine.unlock_post(f.admin.id, post.id, None).await.unwrap();

        assert_eq!(audit_count(&f).await, 4);
    }

    #[tokio::test]
    async fn test_owner_delete_is_unaudited() {
        let f = setup().await;
        let other = f.users.create_user("o@example.com", "other", Role::User).await.unwrap();
        let post = f.content.create_post(f.member.id, f.category.id, "t", "c").await.unwrap();

        assert!(matches!(
            f.machine.delete_own_post(other.id, post.id, None).await,
            Err(ModError::Forbidden(_))
        ));

        f.machine.delete_own_post(f.member.id, post.id, None).await.unwrap();
        assert!(f.content.get_post(post.id).await.unwrap().unwrap().is_deleted);
        assert!(matches!(
            f.machine.delete_own_post(f.member.id, post.id, None).await,
            Err(ModError::Conflict(_))
        ));
        assert_eq!(audit_count(&f).await, 0);

        let second = f.content.create_post(f.member.id, f.category.id, "t2", "c2").await.unwrap();
        f.machine.delete_own_post(f.admin.id, second.id, None).await.unwrap();
        assert_eq!(audit_count(&f).await, 1);
    }

    #[tokio::test]
    async fn test_ban_rules() {
        let f = setup().await;

        let banned = f.machine.ban_user(f.admin.id, f.member.id, None).await.unwrap();
        assert!(!banned.is_active);
        assert!(matches!(
            f.machine.ban_user(f.admin.id, f.member.id, None).await,
            Err(ModError::Conflict(_))
        ));
        f.machine.unban_user(f.admin.id, f.member.id, None).await.unwrap();
        assert!(matches!(
            f.machine.unban_user(f.admin.id, f.member.id, None).await,
            Err(ModError::Conflict(_))
        ));

        assert!(matches!(
            f.machine.ban_user(f.admin.id, f.admin.id, None).await,
            Err(ModError::Forbidden(_))
        ));
        assert!(matches!(
            f.machine.ban_user(f.admin.id, f.root.id, None).await,
            Err(ModError::Forbidden(_))
        ));
        assert!(matches!(
            f.machine.ban_user(f.admin.id, 4242, None).await,
            Err(ModError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_change_role_requires_super_admin() {
        let f = setup().await;

        assert!(matches!(
            f.machine.change_role(f.admin.id, f.member.id, Role::Admin, None).await,
            Err(ModError::Forbidden(_))
        ));
        assert!(matches!(
            f.machine.change_role(f.root.id, f.root.id, Role::User, None).await,
            Err(ModError::Forbidden(_))
        ));

        let promoted = f
            .machine
            .change_role(f.root.id, f.member.id, Role::Admin, None)
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert!(matches!(
            f.machine.change_role(f.root.id, f.member.id, Role::Admin, None).await,
            Err(ModError::Conflict(_))
        ));

        let page = f
            .audit
            .list(f.root.id, &AuditFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].description.as_deref(), Some("user -> admin"));
    }

    #[tokio::test]
    async fn test_reset_password_stores_hash() {
        let f = setup().await;

        let temp = f.machine.reset_password(f.admin.id, f.member.id, None).await.unwrap();
        assert_eq!(temp.password.len(), TEMP_PASSWORD_LEN);

        let stored = f.users.password_hash(f.member.id).await.unwrap().unwrap();
        assert_ne!(stored, temp.password);
        assert!(verify_password(&stored, &temp.password));
        assert!(!verify_password(&stored, "wrong-password"));

        assert!(matches!(
            f.machine.reset_password(f.admin.id, f.root.id, None).await,
            Err(ModError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_category_lifecycle() {
        let f = setup().await;

        let input = NewCategory {
            name: "  confessions ".to_string(),
            description: Some("Say it quietly".to_string()),
            is_anonymous: true,
        };
        let category = f.machine.create_category(f.admin.id, &input, None).await.unwrap();
        assert_eq!(category.name, "confessions");
        assert!(category.is_anonymous);

        assert!(matches!(
            f.machine.create_category(f.admin.id, &input, None).await,
            Err(ModError::Conflict(_))
        ));
        assert!(matches!(
            f.machine
                .create_category(f.admin.id, &NewCategory::default(), None)
                .await,
            Err(ModError::Validation(_))
        ));

        let update = CategoryUpdate {
            is_anonymous: Some(false),
            ..Default::default()
        };
        let updated = f
            .machine
            .update_category(f.admin.id, category.id, &update, None)
            .await
            .unwrap();
        assert!(!updated.is_anonymous);
        assert!(matches!(
            f.machine
                .update_category(f.admin.id, category.id, &CategoryUpdate::default(), None)
                .await,
            Err(ModError::Validation(_))
        ));

        assert!(matches!(
            f.machine.delete_category(f.admin.id, f.category.id, None).await,
            Ok(())
        ));
        f.content.create_post(f.member.id, category.id, "t", "c").await.unwrap();
        assert!(matches!(
            f.machine.delete_category(f.admin.id, category.id, None).await,
            Err(ModError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_block_action() {
        let f = setup().await;
        let post = f.content.create_post(f.member.id, f.category.id, "t", "c").await.unwrap();

        sqlx::query("DROP TABLE audit_logs").execute(&f.pool).await.unwrap();

        let deleted = f.machine.delete_post(f.admin.id, post.id, None).await.unwrap();
        assert!(deleted.is_deleted);
    }
}
