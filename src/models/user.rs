use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use tokio_postgres::Row;

use crate::schema::{Column, ColumnType, Table};

/// Author of posts, comments and votes.
/// Only the columns other tables need are declared here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

pub const USER_COLUMNS: &str = "id, username, email, created_at, updated_at";

pub fn table() -> Table {
    Table::new("users")
        .column(Column::primary_key("id"))
        .column(Column::new("username", ColumnType::Varchar(50)).not_null())
        .column(Column::new("email", ColumnType::Varchar(50)).not_null().unique())
        .column(Column::new("created_at", ColumnType::Timestamp).not_null())
        .column(Column::new("updated_at", ColumnType::Timestamp).not_null())
}

impl TryFrom<&Row> for User {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl NewUser {
    /// Trim the username and lowercase the email before insert.
    pub fn normalized(self) -> Self {
        NewUser {
            username: self.username.trim().to_string(),
            email: self.email.trim().to_lowercase(),
        }
    }
}
