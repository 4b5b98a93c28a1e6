//! # Services Module
//!
//! Outbound connectors to the record store and the workflow engine, plus the
//! merge of record-store rows with locally mirrored student data.

pub mod record_store;
pub mod roster;
pub mod workflow_engine;

use reqwest::{Response, StatusCode};
use thiserror::Error;

pub use record_store::{BaserowConnector, RecordStore, RemoteRow, StudentRecord};
pub use workflow_engine::{BpmnEngineConnector, WorkflowEngine};

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("invalid service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Turn non-2xx answers into [`ConnectorError::Status`], keeping the body for the logs.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, ConnectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ConnectorError::Status { status, body })
}

/// Like [`ensure_success`] for deletes: a 404 means the row is already gone,
/// so a partly failed removal can be retried.
pub(crate) async fn ensure_deleted(response: Response) -> Result<(), ConnectorError> {
    if response.status() == StatusCode::NOT_FOUND {
        tracing::info!("{} was already deleted", response.url());
        return Ok(());
    }
    ensure_success(response).await?;
    Ok(())
}

/// Join percent-encoded path segments onto a base URL.
pub(crate) fn endpoint(base_url: &str, segments: &[&str]) -> Result<url::Url, ConnectorError> {
    let mut url = url::Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| ConnectorError::UnexpectedResponse(format!("{base_url} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
