// Read-only views over the user collection

use super::{Resource, ResourceTemplate};
use crate::protocol::{
    ReadResourceResult, ResourceContents, ResourceSchema, ResourceTemplateSchema, Annotations,
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use userbook_core::storage::UserStore;
use userbook_core::UserId;

pub const ALL_USERS_URI: &str = "users://all";
pub const USER_PROFILE_TEMPLATE: &str = "users://{userId}/profile";

const USER_NOT_FOUND: &str = "User not found";

/// The full user collection as one JSON document
pub struct AllUsersResource {
    store: Arc<dyn UserStore>,
}

impl AllUsersResource {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Resource for AllUsersResource {
    fn schema(&self) -> ResourceSchema {
        ResourceSchema {
            uri: ALL_USERS_URI.to_string(),
            name: "users".to_string(),
            title: Some("Users".to_string()),
            description: Some("Get all users data from the database".to_string()),
            mime_type: Some("application/json".to_string()),
            annotations: Some(Annotations::read_only("Users")),
        }
    }

    async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        let users = self.store.load_all().await.context("Failed to load users")?;
        let json = serde_json::to_string_pretty(&users)?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::json(uri, json)],
        })
    }
}

/// One user's record, addressed by id
pub struct UserProfileResource {
    store: Arc<dyn UserStore>,
}

impl UserProfileResource {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ResourceTemplate for UserProfileResource {
    fn schema(&self) -> ResourceTemplateSchema {
        ResourceTemplateSchema {
            uri_template: USER_PROFILE_TEMPLATE.to_string(),
            name: "user-details".to_string(),
            title: Some("User Details".to_string()),
            description: Some("Get a user's details from the database".to_string()),
            mime_type: Some("application/json".to_string()),
            annotations: Some(Annotations::read_only("User Details")),
        }
    }

    async fn read(
        &self,
        uri: &str,
        variables: &HashMap<String, String>,
    ) -> Result<ReadResourceResult> {
        // An id that is not an integer cannot match any record
        let id = variables
            .get("userId")
            .and_then(|raw| raw.parse::<UserId>().ok());

        let user = match id {
            Some(id) => self
                .store
                .find_by_id(id)
                .await
                .context("Failed to load users")?,
            None => None,
        };

        let contents = match user {
            Some(user) => ResourceContents::json(uri, serde_json::to_string_pretty(&user)?),
            None => ResourceContents::plain(uri, USER_NOT_FOUND),
        };

        Ok(ReadResourceResult {
            contents: vec![contents],
        })
    }
}
