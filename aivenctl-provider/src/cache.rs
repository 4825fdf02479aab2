//! Memoised "is the service powered on" checks
//!
//! Some endpoints fail with a generic 503 when the service is powered off.
//! The state of each `project/service` is fetched once and shared between
//! concurrent callers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::client::{AivenClient, escape};
use crate::errors::{AivenError, Result};
use crate::schemautil::build_resource_id;

const POWEROFF: &str = "POWEROFF";

#[derive(Debug, Default)]
pub struct ServicePoweredCache {
    entries: DashMap<String, Arc<OnceCell<bool>>>,
}

impl ServicePoweredCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors with `ServicePoweredOff` when the service state is POWEROFF
    pub async fn check(&self, client: &AivenClient, project: &str, service: &str) -> Result<()> {
        let key = build_resource_id(&[project, service]);
        let cell = self.entries.entry(key).or_default().clone();

        let powered = cell
            .get_or_try_init(|| async {
                let body = client
                    .get(&format!(
                        "/project/{}/service/{}",
                        escape(project),
                        escape(service)
                    ))
                    .await?;
                let state = body["service"]["state"].as_str().unwrap_or_default();
                Ok::<_, AivenError>(state != POWEROFF)
            })
            .await?;

        if *powered {
            Ok(())
        } else {
            Err(AivenError::ServicePoweredOff)
        }
    }

    /// Drop the cached state, e.g. after the service was updated
    pub fn forget(&self, project: &str, service: &str) {
        self.entries.remove(&build_resource_id(&[project, service]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn powered_off_service_errors_and_is_fetched_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/kafka-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"service": {"state": "POWEROFF"}})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = AivenClient::new("t").unwrap().with_base_url(mock_server.uri());
        let cache = ServicePoweredCache::new();

        for _ in 0..2 {
            let err = cache.check(&client, "acme", "kafka-1").await.unwrap_err();
            assert_eq!(err.to_string(), "the service is powered off");
        }
    }

    #[tokio::test]
    async fn running_service_passes_and_forget_refetches() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/project/acme/service/pg-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"service": {"state": "RUNNING"}})),
            )
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = AivenClient::new("t").unwrap().with_base_url(mock_server.uri());
        let cache = ServicePoweredCache::new();

        cache.check(&client, "acme", "pg-1").await.unwrap();
        cache.forget("acme", "pg-1");
        cache.check(&client, "acme", "pg-1").await.unwrap();
    }
}
