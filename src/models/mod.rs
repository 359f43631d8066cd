// Models module

pub mod user;
pub mod post;
pub mod comment;
pub mod vote;

use crate::schema::Metadata;

// Re-export commonly used types
pub use user::{User, NewUser};
pub use post::{Post, PostWithVotes, NewPost, UpdatePost};
pub use comment::{Comment, NewComment};
pub use vote::{Vote, NewVote};

impl Metadata {
    /// Declarations for every blog table, parents first.
    pub fn blog() -> Self {
        let mut metadata = Metadata::new();
        metadata.declare(user::table());
        metadata.declare(post::table());
        metadata.declare(comment::table());
        metadata.declare(vote::table());
        metadata
    }
}
