// MCP resource definitions and registry

use super::template::{TemplateError, UriTemplate};
use crate::protocol::{ReadResourceResult, ResourceSchema, ResourceTemplateSchema};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A resource served at one fixed URI
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    fn schema(&self) -> ResourceSchema;

    async fn read(&self, uri: &str) -> Result<ReadResourceResult>;
}

/// A family of resources addressed through a URI template
#[async_trait::async_trait]
pub trait ResourceTemplate: Send + Sync {
    fn schema(&self) -> ResourceTemplateSchema;

    /// Read the resource at `uri`; `variables` holds the values the template extracted
    async fn read(
        &self,
        uri: &str,
        variables: &HashMap<String, String>,
    ) -> Result<ReadResourceResult>;
}

/// Resource registry; exact URIs take precedence over templates
pub struct ResourceRegistry {
    resources: BTreeMap<String, Arc<dyn Resource>>,
    templates: Vec<(UriTemplate, Arc<dyn ResourceTemplate>)>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            resources: BTreeMap::new(),
            templates: Vec::new(),
        }
    }

    /// Register a fixed-URI resource
    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        let schema = resource.schema();
        tracing::debug!("Registering resource {}", schema.uri);
        self.resources.insert(schema.uri, resource);
    }

    /// Register a templated resource; fails if its template does not parse
    pub fn register_template(
        &mut self,
        resource: Arc<dyn ResourceTemplate>,
    ) -> Result<(), TemplateError> {
        let template = UriTemplate::parse(&resource.schema().uri_template)?;
        tracing::debug!("Registering resource template {}", template);
        self.templates.push((template, resource));
        Ok(())
    }

    pub fn list_schemas(&self) -> Vec<ResourceSchema> {
        self.resources.values().map(|r| r.schema()).collect()
    }

    pub fn list_template_schemas(&self) -> Vec<ResourceTemplateSchema> {
        self.templates.iter().map(|(_, r)| r.schema()).collect()
    }

    /// Read `uri`, or `None` when nothing is registered for it
    pub async fn read(&self, uri: &str) -> Option<Result<ReadResourceResult>> {
        if let Some(resource) = self.resources.get(uri) {
            return Some(resource.read(uri).await);
        }

        for (template, resource) in &self.templates {
            if let Some(variables) = template.matches(uri) {
                return Some(resource.read(uri, &variables).await);
            }
        }

        None
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
