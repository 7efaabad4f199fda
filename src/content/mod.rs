mod posts;

pub use posts::{Post, PostAuthor, PostMeta, PostStore};
