use serde::{Deserialize, Serialize};
use tokio_postgres::Row;

use crate::schema::{Column, ColumnType, ForeignKey, OnDelete, Table};

/// One user's upvote on one post.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: i32,
    pub user_id: Option<i32>,
    pub post_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct NewVote {
    pub user_id: Option<i32>,
    pub post_id: i32,
}

pub const VOTE_COLUMNS: &str = "id, user_id, post_id";

pub fn table() -> Table {
    Table::new("votes")
        .column(Column::primary_key("id"))
        .column(Column::new("user_id", ColumnType::Integer))
        .column(Column::new("post_id", ColumnType::Integer).not_null())
        .foreign_key(ForeignKey::new("user_id", "users"))
        .foreign_key(ForeignKey::new("post_id", "posts").on_delete(OnDelete::Cascade))
        .index("idx_votes_post_id", "post_id")
}

impl TryFrom<&Row> for Vote {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Vote {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            post_id: row.try_get("post_id")?,
        })
    }
}
