//! Workflow-engine connector.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::ServicesConfig;
use crate::services::{ConnectorError, endpoint, ensure_deleted};

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn delete_instance(&self, instance_id: &str) -> Result<(), ConnectorError>;
}

/// HTTP implementation of [`WorkflowEngine`]
pub struct BpmnEngineConnector {
    client: Client,
    base_url: String,
}

impl BpmnEngineConnector {
    pub fn new(client: Client, config: &ServicesConfig) -> Self {
        Self {
            client,
            base_url: config.workflow_engine_url.clone(),
        }
    }
}

#[async_trait]
impl WorkflowEngine for BpmnEngineConnector {
    async fn delete_instance(&self, instance_id: &str) -> Result<(), ConnectorError> {
        let url = endpoint(&self.base_url, &["instance", instance_id])?;
        tracing::debug!("Deleting workflow instance {}", instance_id);

        ensure_deleted(self.client.delete(url).send().await?).await
    }
}
