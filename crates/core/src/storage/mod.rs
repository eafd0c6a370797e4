pub mod json_file;

pub use json_file::JsonFileUserStore;

use crate::error::StorageResult;
use crate::types::{NewUser, User, UserId};

/// Storage abstraction for the user record collection
///
/// Every call works against durable state; implementations keep no copy of
/// the collection between calls.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Load the full collection in insertion order
    async fn load_all(&self) -> StorageResult<Vec<User>>;

    /// Append a record with id `count + 1`, persist the collection and return the id
    async fn append_and_persist(&self, candidate: NewUser) -> StorageResult<UserId>;

    /// Find the first record with the given id
    async fn find_by_id(&self, id: UserId) -> StorageResult<Option<User>> {
        let users = self.load_all().await?;
        Ok(users.into_iter().find(|user| user.id == id))
    }
}
