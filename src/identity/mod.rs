/// Display identities
///
/// What readers see as the author of a piece of content, including the
/// substitution applied in anonymous categories.

pub mod anonymous;

pub use anonymous::AnonymityMask;

use crate::db::{content::Post, users::Identity};
use serde::Serialize;

/// Author as presented to readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayIdentity {
    /// `None` when masked and no synthetic account is provisioned
    pub id: Option<i64>,
    pub display_name: String,
    pub avatar: Option<String>,
}

impl From<&Identity> for DisplayIdentity {
    fn from(identity: &Identity) -> Self {
        Self {
            id: Some(identity.id),
            display_name: identity.username.clone(),
            avatar: identity.avatar.clone(),
        }
    }
}

/// A post paired with its presented author
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub post: Post,
    pub author: DisplayIdentity,
    pub category_anonymous: bool,
}
