/// Author masking for anonymous categories
use crate::{
    config::AnonymityConfig,
    db::{
        content::{Category, ContentStore, Post},
        users::{Identity, UserStore},
    },
    error::{ModError, ModResult},
    identity::{DisplayIdentity, PostView},
};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Substitutes a shared synthetic identity for authors in anonymous categories.
///
/// The synthetic account is looked up by its reserved handle the first time it
/// is needed and kept for the life of the process. Concurrent first lookups may
/// both hit the store; they converge on the same row. An unprovisioned account
/// is not cached, so provisioning it later takes effect without a restart.
#[derive(Clone)]
pub struct AnonymityMask {
    users: UserStore,
    content: ContentStore,
    config: AnonymityConfig,
    memo: Arc<OnceCell<Identity>>,
}

impl AnonymityMask {
    pub fn new(users: UserStore, content: ContentStore, config: AnonymityConfig) -> Self {
        Self {
            users,
            content,
            config,
            memo: Arc::new(OnceCell::new()),
        }
    }

    /// Resolve the synthetic anonymous identity, or `None` if it is not provisioned
    pub async fn resolve_anonymous_identity(&self) -> Option<Identity> {
        if let Some(identity) = self.memo.get() {
            return Some(identity.clone());
        }

        match self.users.find_by_username(&self.config.handle).await {
            Ok(Some(identity)) => {
                let _ = self.memo.set(identity);
                self.memo.get().cloned()
            }
            Ok(None) => {
                tracing::debug!("Anonymous identity '{}' is not provisioned", self.config.handle);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to resolve anonymous identity: {}", e);
                None
            }
        }
    }

    /// Presentation-only substitution; `user` is never modified
    pub fn mask_if_anonymous_category(
        &self,
        user: &Identity,
        category_is_anonymous: bool,
    ) -> DisplayIdentity {
        if !category_is_anonymous {
            return DisplayIdentity::from(user);
        }

        DisplayIdentity {
            id: self.memo.get().map(|anon| anon.id),
            display_name: self.config.display_name.clone(),
            avatar: None,
        }
    }

    /// Resolve the memo first so the masked view carries the synthetic id
    pub async fn present_author(&self, owner: &Identity, category: &Category) -> DisplayIdentity {
        if category.is_anonymous {
            self.resolve_anonymous_identity().await;
        }
        self.mask_if_anonymous_category(owner, category.is_anonymous)
    }

    /// Load the owner and category of a post and build its display view
    pub async fn present_post(&self, post: Post) -> ModResult<PostView> {
        let owner = self
            .users
            .get_user(post.owner_id)
            .await?
            .ok_or_else(|| ModError::NotFound(format!("User {} not found", post.owner_id)))?;

        let category = self
            .content
            .get_category(post.category_id)
            .await?
            .ok_or_else(|| ModError::NotFound(format!("Category {} not found", post.category_id)))?;

        let author = self.present_author(&owner, &category).await;

        Ok(PostView {
            post,
            author,
            category_anonymous: category.is_anonymous,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{admin::Role, db::memory_pool};

    async fn setup() -> (AnonymityMask, UserStore, ContentStore) {
        let pool = memory_pool().await.unwrap();
        let users = UserStore::new(pool.clone());
        let content = ContentStore::new(pool);
        let mask = AnonymityMask::new(users.clone(), content.clone(), AnonymityConfig::default());
        (mask, users, content)
    }

    #[tokio::test]
    async fn test_unprovisioned_resolves_to_none() {
        let (mask, users, _) = setup().await;
        assert!(mask.resolve_anonymous_identity().await.is_none());

        // Provisioning later is picked up since absence was not cached
        let anon = users.create_user("anon@example.com", "anonymous", Role::User).await.unwrap();
        assert_eq!(mask.resolve_anonymous_identity().await.map(|i| i.id), Some(anon.id));
    }

    #[tokio::test]
    async fn test_resolution_is_memoized() {
        let (mask, users, _) = setup().await;
        let anon = users.create_user("anon@example.com", "anonymous", Role::User).await.unwrap();

        let first = mask.resolve_anonymous_identity().await.unwrap();
        users.set_avatar(anon.id, Some("changed.png")).await.unwrap();
        let second = mask.clone().resolve_anonymous_identity().await.unwrap();

        assert_eq!(first, second);
        assert!(second.avatar.is_none());
    }

    #[tokio::test]
    async fn test_mask_is_presentation_only() {
        let (mask, users, _) = setup().await;
        let alice = users.create_user("alice@example.com", "alice", Role::User).await.unwrap();
        users.set_avatar(alice.id, Some("alice.png")).await.unwrap();
        let alice = users.get_user(alice.id).await.unwrap().unwrap();

        let masked = mask.mask_if_anonymous_category(&alice, true);
        assert_eq!(masked.display_name, "Anonymous");
        assert!(masked.avatar.is_none());
        assert_ne!(masked.id, Some(alice.id));

        let plain = mask.mask_if_anonymous_category(&alice, false);
        assert_eq!(plain.id, Some(alice.id));
        assert_eq!(plain.display_name, "alice");
        assert_eq!(plain.avatar.as_deref(), Some("alice.png"));
    }

    #[tokio::test]
    async fn test_present_post_keeps_owner() {
        let (mask, users, content) = setup().await;
        let anon = users.create_user("anon@example.com", "anonymous", Role::User).await.unwrap();
        let alice = users.create_user("alice@example.com", "alice", Role::User).await.unwrap();
        let secret = content.create_category("confessions", None, true).await.unwrap();
        let post = content.create_post(alice.id, secret.id, "t", "c").await.unwrap();

        let view = mask.present_post(post).await.unwrap();
        assert_eq!(view.author.id, Some(anon.id));
        assert_eq!(view.author.display_name, "Anonymous");
        assert_eq!(view.post.owner_id, alice.id);
        assert!(view.category_anonymous);

        let stored = content.get_post(view.post.id).await.unwrap().unwrap();
        assert_eq!(stored.owner_id, alice.id);
    }
}
