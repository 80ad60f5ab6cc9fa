//! HTTP adapters for the execution gateway and the module validator

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::lims::{ExecutionGateway, JobPayload};
use super::modules::ModuleValidator;
use super::ServiceError;

const LIMS: &str = "execution gateway";
const BILLING: &str = "module validator";

fn build_client(service: &'static str, timeout: Duration) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::from_http(service, e))
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[derive(Serialize)]
struct JobEnvelope<'a> {
    data: JobData<'a>,
}

#[derive(Serialize)]
struct JobData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: i64,
    attributes: &'a JobPayload,
}

/// Posts jobs as JSON:API documents to `<base_url>/jobs`
#[derive(Debug, Clone)]
pub struct HttpExecutionGateway {
    client: Client,
    base_url: String,
}

impl HttpExecutionGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(LIMS, timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

#[async_trait]
impl ExecutionGateway for HttpExecutionGateway {
    async fn submit_job(&self, payload: &JobPayload) -> Result<(), ServiceError> {
        let url = format!("{}/jobs", self.base_url);
        let body = JobEnvelope {
            data: JobData {
                kind: "jobs",
                id: payload.job_id.0,
                attributes: payload,
            },
        };

        debug!(job_id = %payload.job_id, url = %url, "Submitting job to LIMS");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::from_http(LIMS, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(job_id = %payload.job_id, %status, "LIMS rejected job: {}", text);
            return Err(ServiceError::UnexpectedResponse {
                service: LIMS,
                message: format!("HTTP {status}: {text}"),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    verified: bool,
}

/// Checks module names against `<base_url>/process_module_names/<name>/verify`
#[derive(Debug, Clone)]
pub struct HttpModuleValidator {
    client: Client,
    base_url: String,
}

impl HttpModuleValidator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(BILLING, timeout)?,
            base_url: trim_base(base_url),
        })
    }
}

#[async_trait]
impl ModuleValidator for HttpModuleValidator {
    async fn is_valid_module_name(&self, name: &str) -> Result<bool, ServiceError> {
        let url = format!("{}/process_module_names/{}/verify", self.base_url, name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ServiceError::from_http(BILLING, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(ServiceError::UnexpectedResponse {
                service: BILLING,
                message: format!("HTTP {status}"),
            });
        }

        let verify: VerifyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::from_http(BILLING, e))?;
        Ok(verify.verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let gateway = HttpExecutionGateway::new("http://lims.local/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(gateway.base_url, "http://lims.local/api");
    }
}
