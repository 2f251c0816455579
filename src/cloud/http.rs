//! HTTP backend for the cloud container.

use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

use super::{
    CloudContainer, CloudError, CloudOptions, CloudRecord, RecordRef, RemoteRecord, ShareHandle,
    SharePermission, SyncCursor,
};
use async_trait::async_trait;

/// Talks to a container server over HTTP. Routes live under
/// `{server}/containers/{container}/{scope}`.
pub struct HttpCloudContainer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    records: &'a [CloudRecord],
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    records: &'a [RecordRef],
}

#[derive(Deserialize)]
struct ChangesResponse {
    records: Vec<RemoteRecord>,
    cursor: Option<String>,
}

#[derive(Serialize)]
struct ShareRequest {
    record: CloudRecord,
    permission: SharePermission,
}

impl HttpCloudContainer {
    pub fn new(options: &CloudOptions) -> Self {
        let base_url = format!(
            "{}/containers/{}/{}",
            options.server_url.trim_end_matches('/'),
            options.container_id,
            options.scope
        );

        HttpCloudContainer {
            client: reqwest::Client::new(),
            base_url,
            api_key: options.api_key.clone(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CloudError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::Status(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl CloudContainer for HttpCloudContainer {
    async fn push(&self, records: &[CloudRecord]) -> Result<(), CloudError> {
        if records.is_empty() {
            return Ok(());
        }

        let url = format!("{}/records", self.base_url);
        let request = self.client.post(&url).json(&PushRequest { records });
        let response = self.authorize(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, refs: &[RecordRef]) -> Result<(), CloudError> {
        if refs.is_empty() {
            return Ok(());
        }

        let url = format!("{}/records/delete", self.base_url);
        let request = self.client.post(&url).json(&DeleteRequest { records: refs });
        let response = self.authorize(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn pull_since(
        &self,
        cursor: &SyncCursor,
    ) -> Result<(Vec<RemoteRecord>, SyncCursor), CloudError> {
        let mut url = format!("{}/changes", self.base_url);
        if let Some(position) = &cursor.0 {
            url = format!("{}?since={}", url, position);
        }

        let request = self.client.get(&url);
        let response = self.authorize(request).send().await?;
        let response = Self::check(response).await?;

        let changes: ChangesResponse = response
            .json()
            .await
            .map_err(|e| CloudError::Decode(e.to_string()))?;

        Ok((changes.records, SyncCursor(changes.cursor)))
    }

    async fn share(
        &self,
        record: CloudRecord,
        permission: SharePermission,
    ) -> Result<ShareHandle, CloudError> {
        let url = format!("{}/shares", self.base_url);
        let request = self
            .client
            .post(&url)
            .json(&ShareRequest { record, permission });
        let response = self.authorize(request).send().await?;
        let response = Self::check(response).await?;

        response
            .json()
            .await
            .map_err(|e| CloudError::Decode(e.to_string()))
    }
}
