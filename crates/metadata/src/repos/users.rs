//! User repository.

use crate::error::MetadataResult;
use crate::models::UserRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Minimal user access: enough for assignments to reference real users.
/// Full user management lives upstream of this crate.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Create a user. Fails with `AlreadyExists` on a duplicate username.
    async fn create_user(&self, user: &UserRow) -> MetadataResult<()>;

    /// Fetch a user by ID.
    async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>>;

    /// List all users.
    async fn list_users(&self) -> MetadataResult<Vec<UserRow>>;
}
