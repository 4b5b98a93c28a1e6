//! Record-store connector.
//!
//! Talks to the HTTP connector in front of the no-code database that holds
//! the authoritative student and company records.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ServicesConfig;
use crate::services::{ConnectorError, endpoint, ensure_deleted, ensure_success};

/// A record-store row, kept as free-form JSON
pub type RemoteRow = Map<String, Value>;

/// Student fields mirrored into the record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentRecord {
    pub name: String,
    pub surname: String,
    pub jmbag: String,
    pub email: String,
    pub year_of_study: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a student row and return the id the record store assigned to it
    async fn create_student(&self, record: &StudentRecord) -> Result<i32, ConnectorError>;
    async fn list_students(&self) -> Result<Vec<RemoteRow>, ConnectorError>;
    /// Companies visible to every signed-in user
    async fn list_companies(&self) -> Result<Vec<RemoteRow>, ConnectorError>;
    /// Companies table used by the admin console
    async fn list_admin_companies(&self) -> Result<Vec<RemoteRow>, ConnectorError>;
    async fn delete_student_by_email(&self, email: &str) -> Result<(), ConnectorError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct CreatedRow {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RowPage {
    results: Vec<RemoteRow>,
}

/// HTTP implementation of [`RecordStore`]
pub struct BaserowConnector {
    client: Client,
    base_url: String,
    students_table: String,
    companies_table: String,
    admin_companies_table: String,
}

impl BaserowConnector {
    pub fn new(client: Client, config: &ServicesConfig) -> Self {
        Self {
            client,
            base_url: config.record_store_url.clone(),
            students_table: config.students_table.clone(),
            companies_table: config.companies_table.clone(),
            admin_companies_table: config.admin_companies_table.clone(),
        }
    }

    async fn list_table(&self, table: &str) -> Result<Vec<RemoteRow>, ConnectorError> {
        let url = endpoint(&self.base_url, &[table])?;
        tracing::debug!("Fetching record-store table {}", table);

        let response = ensure_success(self.client.get(url).send().await?).await?;
        let page: Envelope<RowPage> = response.json().await?;
        Ok(page.data.results)
    }
}

#[async_trait]
impl RecordStore for BaserowConnector {
    async fn create_student(&self, record: &StudentRecord) -> Result<i32, ConnectorError> {
        let url = endpoint(&self.base_url, &["students"])?;
        let response = ensure_success(self.client.post(url).json(record).send().await?).await?;
        let created: Envelope<CreatedRow> = response.json().await?;

        i32::try_from(created.data.id).map_err(|_| {
            ConnectorError::UnexpectedResponse(format!(
                "record id {} does not fit the local schema",
                created.data.id
            ))
        })
    }

    async fn list_students(&self) -> Result<Vec<RemoteRow>, ConnectorError> {
        self.list_table(&self.students_table).await
    }

    async fn list_companies(&self) -> Result<Vec<RemoteRow>, ConnectorError> {
        self.list_table(&self.companies_table).await
    }

    async fn list_admin_companies(&self) -> Result<Vec<RemoteRow>, ConnectorError> {
        self.list_table(&self.admin_companies_table).await
    }

    async fn delete_student_by_email(&self, email: &str) -> Result<(), ConnectorError> {
        let url = endpoint(&self.base_url, &["students", "email", email])?;
        ensure_deleted(self.client.delete(url).send().await?).await
    }
}
