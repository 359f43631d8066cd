// Library root for the blog backend

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod handlers;
pub mod repository;
pub mod schema;
pub mod session;

// Re-export commonly used types
pub use db::{init_db, Database};
pub use error::ApiError;
pub use models::{Comment, NewComment, NewPost, NewUser, NewVote, Post, PostWithVotes, UpdatePost, User, Vote};
pub use session::{Db, RequestContext, Session};
