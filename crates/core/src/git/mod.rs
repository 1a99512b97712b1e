//! Git operations for TopicsGit.

pub mod client;
pub mod status;

pub use client::GitClient;
pub use status::ChangeSet;
