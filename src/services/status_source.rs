use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;

use crate::models::job::JobId;
use crate::models::remote::RemoteRecord;

/// The authoritative source of job existence and status.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetch every job the source knows about. Individual entries may be malformed.
    async fn list_jobs(&self) -> Result<Vec<RemoteRecord>, SourceError>;

    /// Register a job created on this side. `record.id` is kept by the source.
    async fn create_job(&self, record: &RemoteRecord) -> Result<RemoteRecord, SourceError>;

    async fn delete_job(&self, id: &JobId) -> Result<(), SourceError>;
}

/// Client for the status source's JSON API.
pub struct HttpStatusSource {
    http: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpStatusSource {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> Result<Self, SourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Config(e.to_string()))?;

        let base_url = Url::parse(base_url).map_err(|e| SourceError::Config(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(SourceError::Config(format!("{base_url} cannot be used as a base URL")));
        }

        Ok(Self {
            http,
            base_url,
            api_token,
        })
    }

    /// Append `segments` to the base path, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.http.request(method, self.endpoint(segments));
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> Result<Response, TransportError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }
        Ok(response)
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn list_jobs(&self) -> Result<Vec<RemoteRecord>, SourceError> {
        let fetch = async {
            let response = Self::send(self.request(Method::GET, &["jobs"])).await?;
            let body = response.bytes().await?;
            let entries: Vec<serde_json::Value> = serde_json::from_slice(&body)?;
            Ok::<_, TransportError>(entries)
        };
        let entries = fetch.await.map_err(SourceError::RemoteUnavailable)?;

        let total = entries.len();
        let records: Vec<RemoteRecord> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping unparseable status source entry");
                    metrics::counter!("kitchen_remote_entries_dropped_total", "reason" => "unparseable")
                        .increment(1);
                    None
                }
            })
            .collect();

        tracing::debug!(total, parsed = records.len(), "Fetched status source snapshot");
        Ok(records)
    }

    async fn create_job(&self, record: &RemoteRecord) -> Result<RemoteRecord, SourceError> {
        let id = JobId::new(record.id.clone().unwrap_or_default());
        let create = async {
            let response = Self::send(self.request(Method::POST, &["jobs"]).json(record)).await?;
            Ok::<_, TransportError>(response.json::<RemoteRecord>().await?)
        };
        create
            .await
            .map_err(|source| SourceError::UploadFailed { id, source })
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), SourceError> {
        match Self::send(self.request(Method::DELETE, &["jobs", id.as_str()])).await {
            Ok(_) => Ok(()),
            // Already gone on the remote side.
            Err(TransportError::Status(StatusCode::NOT_FOUND)) => Ok(()),
            Err(source) => Err(SourceError::DeleteFailed {
                id: id.clone(),
                source,
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("status source answered {0}")]
    Status(StatusCode),

    #[error("malformed status source response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("status source unavailable: {0}")]
    RemoteUnavailable(#[source] TransportError),

    #[error("upload of job {id} failed: {source}")]
    UploadFailed {
        id: JobId,
        #[source]
        source: TransportError,
    },

    #[error("delete of job {id} failed: {source}")]
    DeleteFailed {
        id: JobId,
        #[source]
        source: TransportError,
    },

    #[error("status source configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(base: &str) -> HttpStatusSource {
        HttpStatusSource::new(base, None, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        assert_eq!(source("http://kitchen.local").endpoint(&["jobs"]).as_str(), "http://kitchen.local/jobs");
        assert_eq!(
            source("http://kitchen.local/api/v2/").endpoint(&["jobs"]).as_str(),
            "http://kitchen.local/api/v2/jobs"
        );
    }

    #[test]
    fn test_job_id_is_one_encoded_segment() {
        let url = source("http://kitchen.local").endpoint(&["jobs", "a?x/b#c d"]);
        assert_eq!(url.path(), "/jobs/a%3Fx%2Fb%23c%20d");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        assert!(matches!(
            HttpStatusSource::new("not a url", None, Duration::from_secs(1)),
            Err(SourceError::Config(_))
        ));
        assert!(matches!(
            HttpStatusSource::new("mailto:chef@kitchen.local", None, Duration::from_secs(1)),
            Err(SourceError::Config(_))
        ));
    }
}
