use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header;
use tracing::{debug, warn};
use uuid::Uuid;

use super::remote::{RowStore, TaskRow};
use crate::error::PersistError;

#[derive(Debug, Clone)]
pub struct RestSettings {
    pub base_url: String,
    pub api_key: String,
    pub table: String,
    pub timeout: Duration,
}

/// PostgREST-style table client: `{base_url}/rest/v1/{table}` with
/// `column=eq.value` filters.
pub struct RestRowStore {
    client: Client,
    endpoint: String,
    api_key: String,
    bearer: String,
}

impl RestRowStore {
    pub fn new(settings: RestSettings, access_token: &str) -> Result<Self, PersistError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        let endpoint = format!(
            "{}/rest/v1/{}",
            settings.base_url.trim_end_matches('/'),
            settings.table
        );
        debug!(endpoint = %endpoint, "built remote row client");

        Ok(Self {
            client,
            endpoint,
            api_key: settings.api_key,
            bearer: format!("Bearer {access_token}"),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: Method, filter: &str) -> RequestBuilder {
        let url = if filter.is_empty() {
            self.endpoint.clone()
        } else {
            format!("{}?{}", self.endpoint, filter)
        };
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header(header::AUTHORIZATION, &self.bearer)
            .header(header::ACCEPT, "application/json")
    }

    fn send(&self, request: RequestBuilder, op: &'static str) -> Result<Response, PersistError> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            debug!(op, status = status.as_u16(), "remote call succeeded");
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        warn!(op, status = status.as_u16(), body = %body, "remote call failed");
        Err(PersistError::Remote {
            status: status.as_u16(),
            body,
        })
    }
}

fn owner_filter(owner: Uuid) -> String {
    format!("user_id=eq.{owner}")
}

impl RowStore for RestRowStore {
    #[tracing::instrument(skip(self))]
    fn select_by_owner(&mut self, owner: Uuid) -> Result<Vec<TaskRow>, PersistError> {
        let filter = format!("select=*&{}&order=id.asc", owner_filter(owner));
        let response = self.send(self.request(Method::GET, &filter), "select")?;
        Ok(response.json::<Vec<TaskRow>>()?)
    }

    #[tracing::instrument(skip(self, row), fields(id = row.id))]
    fn insert(&mut self, row: &TaskRow) -> Result<(), PersistError> {
        let request = self
            .request(Method::POST, "")
            .header("Prefer", "return=minimal")
            .json(row);
        self.send(request, "insert")?;
        Ok(())
    }

    #[tracing::instrument(skip(self, row), fields(id = row.id))]
    fn update_by_id(&mut self, owner: Uuid, row: &TaskRow) -> Result<(), PersistError> {
        let filter = format!("id=eq.{}&{}", row.id, owner_filter(owner));
        let request = self
            .request(Method::PATCH, &filter)
            .header("Prefer", "return=minimal")
            .json(row);
        self.send(request, "update")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn delete_by_id(&mut self, owner: Uuid, id: u64) -> Result<(), PersistError> {
        let filter = format!("id=eq.{id}&{}", owner_filter(owner));
        self.send(self.request(Method::DELETE, &filter), "delete")?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn delete_by_owner(&mut self, owner: Uuid) -> Result<(), PersistError> {
        self.send(
            self.request(Method::DELETE, &owner_filter(owner)),
            "delete_all",
        )?;
        Ok(())
    }
}
