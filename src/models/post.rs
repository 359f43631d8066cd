use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use tokio_postgres::Row;

use crate::schema::{Column, ColumnType, ForeignKey, Table};

/// A submitted link with a title, optionally owned by a user.
/// Comments and votes reference it and are removed with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub post_url: String,
    pub user_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A post together with its live vote count.
/// `vote_count` is computed by the query that loads the row; it is never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostWithVotes {
    #[serde(flatten)]
    pub post: Post,
    pub vote_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub post_url: String,
    pub user_id: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub post_url: Option<String>,
}

pub const TITLE_MAX_LEN: u32 = 100;
pub const POST_URL_MAX_LEN: u32 = 100;

pub const POST_COLUMNS: &str = "id, title, post_url, user_id, created_at, updated_at";

/// Correlated subquery counting the votes of the outer `p` row.
pub const VOTE_COUNT_SUBQUERY: &str =
    "(SELECT COUNT(v.id) FROM votes v WHERE v.post_id = p.id) AS vote_count";

pub fn table() -> Table {
    Table::new("posts")
        .column(Column::primary_key("id"))
        .column(Column::new("title", ColumnType::Varchar(TITLE_MAX_LEN)).not_null())
        .column(Column::new("post_url", ColumnType::Varchar(POST_URL_MAX_LEN)).not_null())
        .column(Column::new("user_id", ColumnType::Integer))
        .column(Column::new("created_at", ColumnType::Timestamp).not_null())
        .column(Column::new("updated_at", ColumnType::Timestamp).not_null())
        .foreign_key(ForeignKey::new("user_id", "users"))
        .index("idx_posts_user_id", "user_id")
        .index("idx_posts_created_at", "created_at DESC")
}

/// `SELECT` over `posts p` that includes the computed vote count.
pub fn select_with_votes() -> String {
    format!(
        "SELECT p.id, p.title, p.post_url, p.user_id, p.created_at, p.updated_at, {} FROM posts p",
        VOTE_COUNT_SUBQUERY
    )
}

impl TryFrom<&Row> for Post {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Post {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            post_url: row.try_get("post_url")?,
            user_id: row.try_get("user_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<&Row> for PostWithVotes {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(PostWithVotes {
            post: Post::try_from(row)?,
            vote_count: row.try_get("vote_count")?,
        })
    }
}

impl UpdatePost {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.post_url.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post() -> Post {
        let created = DateTime::parse_from_rfc3339("2022-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        Post {
            id: 1,
            title: "Donec posuere metus vitae ipsum".to_string(),
            post_url: "https://buzzfeed.com/in/imperdiet/et".to_string(),
            user_id: Some(4),
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_update_post_is_empty() {
        assert!(UpdatePost::default().is_empty());
        assert!(!UpdatePost { title: Some("t".to_string()), post_url: None }.is_empty());
    }

    #[test]
    fn test_post_with_votes_serialization_is_flat() {
        let summary = PostWithVotes {
            post: sample_post(),
            vote_count: 3,
        };

        let json = serde_json::to_string(&summary).expect("Failed to serialize post");
        let expected = r#"{"id":1,"title":"Donec posuere metus vitae ipsum","post_url":"https://buzzfeed.com/in/imperdiet/et","user_id":4,"created_at":"2022-01-01T00:00:00Z","updated_at":"2022-01-01T00:00:00Z","vote_count":3}"#;
        assert_eq!(json, expected);
    }

    #[test]
    fn test_new_post_deserialization_without_user() {
        let json = r#"{"title":"Nunc purus","post_url":"http://desdev.cn/enim/blandit/mi.jpg"}"#;
        let request: NewPost = serde_json::from_str(json).expect("Failed to deserialize NewPost");

        assert_eq!(request.title, "Nunc purus");
        assert_eq!(request.user_id, None);
    }

    #[test]
    fn test_posts_table_declaration() {
        let table = table();
        let sql = table.create_sql();

        assert!(sql.contains("title VARCHAR(100) NOT NULL"));
        assert!(sql.contains("post_url VARCHAR(100) NOT NULL"));
        assert!(sql.contains("user_id INTEGER,"));
        assert!(sql.contains("FOREIGN KEY (user_id) REFERENCES users(id)"));
        assert_eq!(table.column_names().join(", "), POST_COLUMNS);
    }

    #[test]
    fn test_select_with_votes_uses_correlated_count() {
        let sql = select_with_votes();
        assert!(sql.contains("SELECT COUNT(v.id) FROM votes v WHERE v.post_id = p.id"));
        assert!(sql.ends_with("FROM posts p"));
    }
}
