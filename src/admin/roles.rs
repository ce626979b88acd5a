/// Role hierarchy and privilege gate
use crate::{
    auth::AuthContext,
    db::users::{Identity, UserStore},
    error::{ModError, ModResult},
};
use serde::{Deserialize, Serialize};

/// Account role levels, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular member
    User,
    /// Can moderate content and accounts below admin
    Admin,
    /// Full access, can grant and revoke roles
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn from_str(s: &str) -> ModResult<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            _ => Err(ModError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Numeric rank used for comparisons inside SQL
    pub fn rank(&self) -> i64 {
        match self {
            Role::User => 0,
            Role::Admin => 1,
            Role::SuperAdmin => 2,
        }
    }

    /// Check if this role can perform actions requiring another role
    pub fn can_act_as(&self, required: Role) -> bool {
        self >= &required
    }

    pub fn is_privileged(&self) -> bool {
        self.can_act_as(Role::Admin)
    }
}

/// Grants or denies privileged operations.
///
/// The role is always re-read from the account store so that a demotion or a
/// ban takes effect on the very next request, whatever the caller's token says.
#[derive(Clone)]
pub struct AccessGate {
    users: UserStore,
}

impl AccessGate {
    pub fn new(users: UserStore) -> Self {
        Self { users }
    }

    /// Shared primitive behind both gate variants
    pub async fn require_role(&self, actor_id: i64, required: Role) -> ModResult<Identity> {
        let identity = self
            .users
            .get_user(actor_id)
            .await?
            .ok_or_else(|| ModError::NotFound(format!("User {} not found", actor_id)))?;

        if !identity.is_active {
            tracing::warn!("AccessGate: disabled account {} denied", actor_id);
            return Err(ModError::Forbidden("Account is disabled".to_string()));
        }

        if !identity.role.can_act_as(required) {
            tracing::warn!(
                "AccessGate: user {} with role {} denied, requires {}",
                actor_id,
                identity.role.as_str(),
                required.as_str()
            );
            return Err(ModError::Forbidden(format!(
                "Requires {} role or higher",
                required.as_str()
            )));
        }

        tracing::debug!("AccessGate: user {} granted as {}", actor_id, identity.role.as_str());
        Ok(identity)
    }

    /// Accept admin or super_admin
    pub async fn require_privileged(&self, actor_id: i64) -> ModResult<Identity> {
        self.require_role(actor_id, Role::Admin).await
    }

    /// Accept super_admin only
    pub async fn require_super_privileged(&self, actor_id: i64) -> ModResult<Identity> {
        self.require_role(actor_id, Role::SuperAdmin).await
    }

    /// Gate an optional authenticated context; absence is `Unauthenticated`
    pub async fn check(&self, auth: Option<&AuthContext>, required: Role) -> ModResult<Identity> {
        let auth = auth
            .ok_or_else(|| ModError::Unauthenticated("Authentication required".to_string()))?;
        self.require_role(auth.user_id, required).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::SuperAdmin > Role::Admin);
        assert!(Role::Admin > Role::User);

        assert!(Role::SuperAdmin.can_act_as(Role::Admin));
        assert!(Role::Admin.can_act_as(Role::User));
        assert!(!Role::User.can_act_as(Role::Admin));
        assert!(!Role::Admin.can_act_as(Role::SuperAdmin));

        assert!(Role::Admin.is_privileged());
        assert!(!Role::User.is_privileged());
        assert!(Role::User.rank() < Role::SuperAdmin.rank());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("user").unwrap(), Role::User);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("super_admin").unwrap(), Role::SuperAdmin);
        assert!(Role::from_str("moderator").is_err());
    }

    #[tokio::test]
    async fn test_gate_ladder() {
        let users = UserStore::new(memory_pool().await.unwrap());
        let gate = AccessGate::new(users.clone());

        let member = users.create_user("m@example.com", "member", Role::User).await.unwrap();
        let admin = users.create_user("a@example.com", "admin", Role::Admin).await.unwrap();
        let root = users.create_user("r@example.com", "root", Role::SuperAdmin).await.unwrap();

        assert!(matches!(
            gate.require_privileged(member.id).await,
            Err(ModError::Forbidden(_))
        ));
        assert!(gate.require_privileged(admin.id).await.is_ok());
        assert!(gate.require_privileged(root.id).await.is_ok());

        assert!(matches!(
            gate.require_super_privileged(admin.id).await,
            Err(ModError::Forbidden(_))
        ));
        assert!(gate.require_super_privileged(root.id).await.is_ok());

        assert!(matches!(
            gate.require_privileged(4242).await,
            Err(ModError::NotFound(_))
        ));
        assert!(matches!(
            gate.check(None, Role::Admin).await,
            Err(ModError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_demotion_takes_effect_immediately() {
        let users = UserStore::new(memory_pool().await.unwrap());
        let gate = AccessGate::new(users.clone());

        let admin = users.create_user("a@example.com", "admin", Role::Admin).await.unwrap();
        assert!(gate.require_privileged(admin.id).await.is_ok());

        users.set_role(admin.id, Role::User).await.unwrap();
        assert!(matches!(
            gate.require_privileged(admin.id).await,
            Err(ModError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_admin_denied() {
        let users = UserStore::new(memory_pool().await.unwrap());
        let gate = AccessGate::new(users.clone());

        let admin = users.create_user("a@example.com", "admin", Role::Admin).await.unwrap();
        users.set_active(admin.id, false).await.unwrap();

        assert!(matches!(
            gate.require_privileged(admin.id).await,
            Err(ModError::Forbidden(_))
        ));
    }
}
