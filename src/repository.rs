//! Queries over the blog tables, run through a request's `Session`.
//!
//! Driver errors are returned unchanged (`ApiError::Postgres`); only "no row
//! matched" is turned into `ApiError::NotFound`.

use chrono::Utc;
use postgres_types::ToSql;
use tracing::info;

use crate::error::ApiError;
use crate::models::comment::COMMENT_COLUMNS;
use crate::models::post::{select_with_votes, POST_COLUMNS};
use crate::models::user::USER_COLUMNS;
use crate::models::vote::VOTE_COLUMNS;
use crate::models::{
    Comment, NewComment, NewPost, NewUser, NewVote, Post, PostWithVotes, UpdatePost, User, Vote,
};
use crate::session::Session;

impl Session {
    // User operations

    pub async fn create_user(&self, request: NewUser) -> Result<User, ApiError> {
        let user = request.normalized();
        let now = Utc::now();

        let query = format!(
            "INSERT INTO users (username, email, created_at, updated_at) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );
        let row = self
            .query_one(&query, &[&user.username, &user.email, &now, &now])
            .await?;

        let created = User::try_from(&row)?;
        info!("Created user with id: {}", created.id);
        Ok(created)
    }

    pub async fn get_user(&self, user_id: i32) -> Result<User, ApiError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        match self.query_opt(&query, &[&user_id]).await? {
            Some(row) => Ok(User::try_from(&row)?),
            None => Err(ApiError::not_found(format!("User with id {}", user_id))),
        }
    }

    // Post operations

    /// Insert a post. Both timestamps come from the application clock.
    pub async fn create_post(&self, request: NewPost) -> Result<Post, ApiError> {
        let now = Utc::now();

        let query = format!(
            "INSERT INTO posts (title, post_url, user_id, created_at, updated_at) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            POST_COLUMNS
        );
        let row = self
            .query_one(
                &query,
                &[&request.title, &request.post_url, &request.user_id, &now, &now],
            )
            .await?;

        let created = Post::try_from(&row)?;
        info!("Created post with id: {}", created.id);
        Ok(created)
    }

    pub async fn get_post(&self, post_id: i32) -> Result<Post, ApiError> {
        let query = format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS);

        match self.query_opt(&query, &[&post_id]).await? {
            Some(row) => Ok(Post::try_from(&row)?),
            None => Err(ApiError::not_found(format!("Post with id {}", post_id))),
        }
    }

    /// Load a post with its vote count evaluated by the correlated subquery.
    pub async fn get_post_with_votes(&self, post_id: i32) -> Result<PostWithVotes, ApiError> {
        let query = format!("{} WHERE p.id = $1", select_with_votes());

        match self.query_opt(&query, &[&post_id]).await? {
            Some(row) => Ok(PostWithVotes::try_from(&row)?),
            None => Err(ApiError::not_found(format!("Post with id {}", post_id))),
        }
    }

    /// Every post with its vote count, newest first.
    pub async fn list_posts(&self) -> Result<Vec<PostWithVotes>, ApiError> {
        let query = format!("{} ORDER BY p.created_at DESC, p.id DESC", select_with_votes());

        let rows = self.query(&query, &[]).await?;
        let posts = rows
            .iter()
            .map(|row| PostWithVotes::try_from(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    /// Update the provided fields and refresh `updated_at`.
    /// An empty update leaves the row untouched.
    pub async fn update_post(&self, post_id: i32, request: UpdatePost) -> Result<Post, ApiError> {
        if request.is_empty() {
            return self.get_post(post_id).await;
        }

        // Build dynamic query based on provided fields
        let mut query_parts = Vec::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        let mut param_count = 1;

        let updated_at = Utc::now();

        if let Some(ref title) = request.title {
            query_parts.push(format!("title = ${}", param_count));
            params.push(title);
            param_count += 1;
        }

        if let Some(ref post_url) = request.post_url {
            query_parts.push(format!("post_url = ${}", param_count));
            params.push(post_url);
            param_count += 1;
        }

        query_parts.push(format!("updated_at = ${}", param_count));
        params.push(&updated_at);
        param_count += 1;

        params.push(&post_id);

        let query = format!(
            "UPDATE posts SET {} WHERE id = ${} RETURNING {}",
            query_parts.join(", "),
            param_count,
            POST_COLUMNS
        );

        match self.query_opt(&query, &params).await? {
            Some(row) => {
                let updated = Post::try_from(&row)?;
                info!("Updated post with id: {}", updated.id);
                Ok(updated)
            }
            None => Err(ApiError::not_found(format!("Post with id {}", post_id))),
        }
    }

    /// Delete a post. Its comments and votes go with it through the
    /// `ON DELETE CASCADE` foreign keys.
    pub async fn delete_post(&self, post_id: i32) -> Result<(), ApiError> {
        let rows_affected = self
            .execute("DELETE FROM posts WHERE id = $1", &[&post_id])
            .await?;

        if rows_affected == 0 {
            Err(ApiError::not_found(format!("Post with id {}", post_id)))
        } else {
            info!("Deleted post with id: {} (comments and votes cascaded)", post_id);
            Ok(())
        }
    }

    // Vote operations

    pub async fn create_vote(&self, request: NewVote) -> Result<Vote, ApiError> {
        let query = format!(
            "INSERT INTO votes (user_id, post_id) VALUES ($1, $2) RETURNING {}",
            VOTE_COLUMNS
        );
        let row = self
            .query_one(&query, &[&request.user_id, &request.post_id])
            .await?;

        Ok(Vote::try_from(&row)?)
    }

    /// Live number of votes on a post. Runs a query on every call.
    pub async fn count_votes_for_post(&self, post_id: i32) -> Result<i64, ApiError> {
        let row = self
            .query_one("SELECT COUNT(id) FROM votes WHERE post_id = $1", &[&post_id])
            .await?;

        Ok(row.try_get(0)?)
    }

    // Comment operations

    pub async fn create_comment(&self, request: NewComment) -> Result<Comment, ApiError> {
        let now = Utc::now();

        let query = format!(
            "INSERT INTO comments (comment_text, user_id, post_id, created_at, updated_at) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            COMMENT_COLUMNS
        );
        let row = self
            .query_one(
                &query,
                &[&request.comment_text, &request.user_id, &request.post_id, &now, &now],
            )
            .await?;

        Ok(Comment::try_from(&row)?)
    }

    /// Comments on a post, oldest first.
    pub async fn comments_for_post(&self, post_id: i32) -> Result<Vec<Comment>, ApiError> {
        let query = format!(
            "SELECT {} FROM comments WHERE post_id = $1 ORDER BY created_at ASC, id ASC",
            COMMENT_COLUMNS
        );

        let rows = self.query(&query, &[&post_id]).await?;
        let comments = rows
            .iter()
            .map(|row| Comment::try_from(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(comments)
    }
}
