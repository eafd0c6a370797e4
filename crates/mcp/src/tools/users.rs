// User record tools

use crate::protocol::{CallToolResult, Annotations, ToolContent, ToolSchema};
use crate::tools::{json_schema_integer, json_schema_object, json_schema_string, Tool};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use userbook_core::storage::UserStore;
use userbook_core::NewUser;

const CREATE_USER_FAILED: &str = "Error creating user";

/// Tool to create a new user record
pub struct CreateUserTool {
    store: Arc<dyn UserStore>,
}

impl CreateUserTool {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct CreateUserArgs {
    name: String,
    email: String,
    address: String,
    phone: String,
}

impl From<CreateUserArgs> for NewUser {
    fn from(args: CreateUserArgs) -> Self {
        Self {
            name: args.name,
            email: args.email,
            address: args.address,
            phone: args.phone,
        }
    }
}

#[async_trait::async_trait]
impl Tool for CreateUserTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "create-user".to_string(),
            title: Some("Create User".to_string()),
            description: "Create a new user in the database".to_string(),
            input_schema: json_schema_object(
                serde_json::json!({
                    "name": json_schema_string("Full name of the user"),
                    "email": json_schema_string("Email address of the user"),
                    "address": json_schema_string("Postal address of the user"),
                    "phone": json_schema_string("Phone number of the user")
                }),
                vec!["name", "email", "address", "phone"],
            ),
            output_schema: Some(json_schema_object(
                serde_json::json!({
                    "userId": json_schema_integer("Id assigned to the new user"),
                    "error": json_schema_string("Set when the user could not be created")
                }),
                vec![],
            )),
            annotations: None,
        }
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<CallToolResult> {
        let args: CreateUserArgs = serde_json::from_value(arguments)
            .context("Invalid arguments for create-user")?;

        match self.store.append_and_persist(args.into()).await {
            Ok(id) => {
                tracing::info!("Created user {}", id);
                Ok(CallToolResult::structured(serde_json::json!({ "userId": id })))
            }
            Err(e) => {
                tracing::warn!("create-user failed: {}", e);
                Ok(CallToolResult {
                    content: vec![ToolContent::text(format!("{}: {}", CREATE_USER_FAILED, e))],
                    structured_content: Some(serde_json::json!({ "error": CREATE_USER_FAILED })),
                    is_error: Some(true),
                })
            }
        }
    }

    fn annotations(&self) -> Annotations {
        Annotations {
            title: Some("Create User".to_string()),
            read_only_hint: Some(false),
            destructive_hint: Some(false),
            idempotent_hint: Some(false),
            open_world_hint: Some(true),
        }
    }
}
