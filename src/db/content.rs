/// User-generated content records: categories, posts, comments, resources
use crate::error::{ModError, ModResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use validator::Validate;

/// Kinds of moderated content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Comment,
    Resource,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Comment => "comment",
            ContentKind::Resource => "resource",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ContentKind::Post => "Post",
            ContentKind::Comment => "Comment",
            ContentKind::Resource => "Resource",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            ContentKind::Post => "posts",
            ContentKind::Comment => "comments",
            ContentKind::Resource => "resources",
        }
    }

    pub(crate) fn not_found(&self, id: i64) -> ModError {
        ModError::NotFound(format!("{} {} not found", self.label(), id))
    }
}

/// Per-entity toggles that only posts carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFlag {
    Pinned,
    Locked,
}

impl ContentFlag {
    fn column(&self) -> &'static str {
        match self {
            ContentFlag::Pinned => "is_pinned",
            ContentFlag::Locked => "is_locked",
        }
    }
}

/// Moderation-relevant state of any content row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ContentEntity {
    pub id: i64,
    pub owner_id: i64,
    pub category_id: i64,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Present only for posts
    pub is_pinned: Option<bool>,
    /// Present only for posts
    pub is_locked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub owner_id: i64,
    pub category_id: i64,
    pub title: String,
    pub content: String,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub is_pinned: bool,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub owner_id: i64,
    pub content: String,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Resource {
    pub id: i64,
    pub owner_id: i64,
    pub category_id: i64,
    pub title: String,
    pub url: String,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for a new category
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Partial category update
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CategoryUpdate {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub is_anonymous: Option<bool>,
}

impl CategoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.is_anonymous.is_none()
    }
}

/// Content store
#[derive(Clone)]
pub struct ContentStore {
    db: SqlitePool,
}

impl ContentStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    // ------------------------------------------------------------------
    // Moderation state
    // ------------------------------------------------------------------

    /// Load the moderation state of a post, comment or resource
    pub async fn get_entity(
        &self,
        kind: ContentKind,
        id: i64,
    ) -> ModResult<Option<ContentEntity>> {
        let sql = match kind {
            ContentKind::Post => {
                r#"
                SELECT id, owner_id, category_id, is_deleted, deleted_at, is_pinned, is_locked
                FROM posts WHERE id = ?
                "#
            }
            ContentKind::Comment => {
                r#"
                SELECT c.id, c.owner_id, p.category_id, c.is_deleted, c.deleted_at,
                       NULL AS is_pinned, NULL AS is_locked
                FROM comments c
                JOIN posts p ON p.id = c.post_id
                WHERE c.id = ?
                "#
            }
            ContentKind::Resource => {
                r#"
                SELECT id, owner_id, category_id, is_deleted, deleted_at,
                       NULL AS is_pinned, NULL AS is_locked
                FROM resources WHERE id = ?
                "#
            }
        };

        let entity = sqlx::query_as::<_, ContentEntity>(sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(entity)
    }

    /// Flip the soft-delete flag, guarded on the expected prior state.
    ///
    /// Returns false when another writer got there first.
    pub async fn set_deleted(&self, kind: ContentKind, id: i64, deleted: bool) -> ModResult<bool> {
        let deleted_at = if deleted {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };

        let sql = format!(
            "UPDATE {} SET is_deleted = ?, deleted_at = ? WHERE id = ? AND is_deleted = ?",
            kind.table()
        );

        let result = sqlx::query(&sql)
            .bind(deleted)
            .bind(deleted_at)
            .bind(id)
            .bind(!deleted)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Flip a post flag, guarded on the expected prior state
    pub async fn set_post_flag(&self, id: i64, flag: ContentFlag, value: bool) -> ModResult<bool> {
        let column = flag.column();
        let sql = format!(
            "UPDATE posts SET {column} = ? WHERE id = ? AND {column} = ?"
        );

        let result = sqlx::query(&sql)
            .bind(value)
            .bind(id)
            .bind(!value)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Permanently remove a resource row
    pub async fn hard_delete_resource(&self, id: i64) -> ModResult<bool> {
        let result = sqlx::query("DELETE FROM resources WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Categories
    // ------------------------------------------------------------------

    pub async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
        is_anonymous: bool,
    ) -> ModResult<Category> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO categories (name, description, is_anonymous, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(is_anonymous)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await
        .map_err(|e| unique_as_conflict(e, name))?;

        Ok(Category {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(String::from),
            is_anonymous,
            created_at: now,
        })
    }

    pub async fn get_category(&self, id: i64) -> ModResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, is_anonymous, created_at FROM categories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(category)
    }

    pub async fn update_category(&self, id: i64, update: &CategoryUpdate) -> ModResult<Category> {
        let name = update.name.as_deref().unwrap_or_default();
        let result = sqlx::query(
            r#"
            UPDATE categories
            SET name = COALESCE(?, name),
                description = COALESCE(?, description),
                is_anonymous = COALESCE(?, is_anonymous)
            WHERE id = ?
            "#,
        )
        .bind(update.name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.is_anonymous)
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(|e| unique_as_conflict(e, name))?;

        if result.rows_affected() == 0 {
            return Err(ModError::NotFound(format!("Category {} not found", id)));
        }

        self.get_category(id)
            .await?
            .ok_or_else(|| ModError::NotFound(format!("Category {} not found", id)))
    }

    /// Whether any post or resource still references the category
    pub async fn category_in_use(&self, id: i64) -> ModResult<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT (SELECT COUNT(*) FROM posts WHERE category_id = ?1)
                 + (SELECT COUNT(*) FROM resources WHERE category_id = ?1)
            "#,
        )
        .bind(id)
        .fetch_one(&self.db)
        .await?;

        Ok(count > 0)
    }

    pub async fn delete_category(&self, id: i64) -> ModResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Posts, comments, resources
    // ------------------------------------------------------------------

    pub async fn create_post(
        &self,
        owner_id: i64,
        category_id: i64,
        title: &str,
        content: &str,
    ) -> ModResult<Post> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO posts (owner_id, category_id, title, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(category_id)
        .bind(title)
        .bind(content)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Post {
            id: result.last_insert_rowid(),
            owner_id,
            category_id,
            title: title.to_string(),
            content: content.to_string(),
            is_deleted: false,
            deleted_at: None,
            is_pinned: false,
            is_locked: false,
            created_at: now,
        })
    }

    pub async fn get_post(&self, id: i64) -> ModResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, owner_id, category_id, title, content, is_deleted, deleted_at,
                   is_pinned, is_locked, created_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(post)
    }

    pub async fn create_comment(
        &self,
        post_id: i64,
        owner_id: i64,
        content: &str,
    ) -> ModResult<Comment> {
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO comments (post_id, owner_id, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(owner_id)
        .bind(content)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            post_id,
            owner_id,
            content: content.to_string(),
            is_deleted: false,
            deleted_at: None,
            created_at: now,
        })
    }

    pub async fn get_comment(&self, id: i64) -> ModResult<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, owner_id, content, is_deleted, deleted_at, created_at
            FROM comments WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(comment)
    }

    pub async fn create_resource(
        &self,
        owner_id: i64,
        category_id: i64,
        title: &str,
        url: &str,
    ) -> ModResult<Resource> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO resources (owner_id, category_id, title, url, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(category_id)
        .bind(title)
        .bind(url)
        .bind(now.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(Resource {
            id: result.last_insert_rowid(),
            owner_id,
            category_id,
            title: title.to_string(),
            url: url.to_string(),
            is_deleted: false,
            deleted_at: None,
            created_at: now,
        })
    }

    pub async fn get_resource(&self, id: i64) -> ModResult<Option<Resource>> {
        let resource = sqlx::query_as::<_, Resource>(
            r#"
            SELECT id, owner_id, category_id, title, url, is_deleted, deleted_at, created_at
            FROM resources WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(resource)
    }
}

fn unique_as_conflict(e: sqlx::Error, name: &str) -> ModError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            ModError::Conflict(format!("Category {} already exists", name))
        }
        other => ModError::Database(other),
    }
}
