use crate::domain::models::{
    format_local_timestamp, Assignment, BlockId, BreakActivity, CalendarBlock, NewBlock, Settings,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// REST backend the calendar page talks to.
#[async_trait]
pub trait PlannerApi: Send + Sync {
    async fn get_settings(&self) -> Result<Settings, InfraError>;

    async fn list_assignments(&self) -> Result<Vec<Assignment>, InfraError>;

    async fn list_break_activities(&self) -> Result<Vec<BreakActivity>, InfraError>;

    /// Blocks intersecting `[start, end)`.
    async fn list_blocks(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarBlock>, InfraError>;

    async fn create_block(&self, payload: &NewBlock) -> Result<BlockId, InfraError>;

    async fn delete_block(&self, block_id: BlockId) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestPlannerApi {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct CreatedBlockResponse {
    id: BlockId,
}

impl ReqwestPlannerApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid planner base url '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "planner base url '{base_url}' cannot be a base"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| InfraError::Network(format!("failed to build http client: {error}")))?;
        Ok(Self { client, base_url })
    }

    /// `base/api/<segments>`; an empty trailing segment yields a trailing slash.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("planner base url cannot be a base".to_string())
            })?;
            path.pop_if_empty().push("api");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn blocks_endpoint(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Url, InfraError> {
        let mut url = self.endpoint(&["calendar", "blocks"])?;
        url.query_pairs_mut()
            .append_pair("start", &format_local_timestamp(start))
            .append_pair("end", &format_local_timestamp(end));
        Ok(url)
    }

    async fn read_body(response: reqwest::Response, action: &str) -> Result<String, InfraError> {
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Network(format!("failed reading {action} response: {error}"))
        })?;
        if !status.is_success() {
            return Err(InfraError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, action: &str) -> Result<T, InfraError> {
        let response = self.client.get(url).send().await.map_err(|error| {
            InfraError::Network(format!("network error while {action}: {error}"))
        })?;
        let body = Self::read_body(response, action).await?;
        serde_json::from_str(&body).map_err(InfraError::from)
    }
}

#[async_trait]
impl PlannerApi for ReqwestPlannerApi {
    async fn get_settings(&self) -> Result<Settings, InfraError> {
        let url = self.endpoint(&["settings", ""])?;
        self.get_json(url, "loading settings").await
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>, InfraError> {
        let url = self.endpoint(&["assignments"])?;
        self.get_json(url, "listing assignments").await
    }

    async fn list_break_activities(&self) -> Result<Vec<BreakActivity>, InfraError> {
        let url = self.endpoint(&["break-activities", ""])?;
        self.get_json(url, "listing break activities").await
    }

    async fn list_blocks(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<CalendarBlock>, InfraError> {
        let url = self.blocks_endpoint(start, end)?;
        self.get_json(url, "listing calendar blocks").await
    }

    async fn create_block(&self, payload: &NewBlock) -> Result<BlockId, InfraError> {
        payload.validate().map_err(InfraError::InvalidInput)?;

        let url = self.endpoint(&["calendar", "blocks"])?;
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|error| {
                InfraError::Network(format!("network error while creating block: {error}"))
            })?;
        let body = Self::read_body(response, "block create").await?;

        let created: CreatedBlockResponse = serde_json::from_str(&body)?;
        Ok(created.id)
    }

    async fn delete_block(&self, block_id: BlockId) -> Result<(), InfraError> {
        let url = self.endpoint(&["calendar", "blocks", &block_id.to_string()])?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|error| {
                InfraError::Network(format!("network error while deleting block: {error}"))
            })?;
        Self::read_body(response, "block delete").await?;
        Ok(())
    }
}
