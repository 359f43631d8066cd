use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use tokio_postgres::Row;

use crate::schema::{Column, ColumnType, ForeignKey, OnDelete, Table};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i32,
    pub comment_text: String,
    pub user_id: Option<i32>,
    pub post_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewComment {
    pub comment_text: String,
    pub user_id: Option<i32>,
    pub post_id: i32,
}

pub const COMMENT_COLUMNS: &str = "id, comment_text, user_id, post_id, created_at, updated_at";

pub fn table() -> Table {
    Table::new("comments")
        .column(Column::primary_key("id"))
        .column(Column::new("comment_text", ColumnType::Varchar(255)).not_null())
        .column(Column::new("user_id", ColumnType::Integer))
        .column(Column::new("post_id", ColumnType::Integer).not_null())
        .column(Column::new("created_at", ColumnType::Timestamp).not_null())
        .column(Column::new("updated_at", ColumnType::Timestamp).not_null())
        .foreign_key(ForeignKey::new("user_id", "users"))
        .foreign_key(ForeignKey::new("post_id", "posts").on_delete(OnDelete::Cascade))
        .index("idx_comments_post_id", "post_id")
}

impl TryFrom<&Row> for Comment {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Comment {
            id: row.try_get("id")?,
            comment_text: row.try_get("comment_text")?,
            user_id: row.try_get("user_id")?,
            post_id: row.try_get("post_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
