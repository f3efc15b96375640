// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP Audit Sink
//
// Pushes each batch as one JSON array to a log aggregation endpoint. Any
// non-2xx answer is a failed attempt; the dispatcher owns retries.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;

use super::{AuditSink, SinkError};
use crate::domain::audit::AuditRecord;

pub struct HttpAuditSink {
    client: Client,
    endpoint: String,
    headers: BTreeMap<String, String>,
}

impl HttpAuditSink {
    pub fn new(endpoint: String, headers: BTreeMap<String, String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("aegis-decision/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            headers,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    fn name(&self) -> &str {
        "http"
    }

    async fn deliver(&self, batch: &[AuditRecord]) -> Result<(), SinkError> {
        let mut request = self.client.post(&self.endpoint).json(batch);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audit::test_record;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_posts_batch_as_json_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/loki/api/v1/push")
            .match_header("content-type", "application/json")
            .match_header("x-scope-orgid", "acme-corp")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"^\[\{"#.to_string()),
                Matcher::Regex(r#""decision_id":"d1""#.to_string()),
                Matcher::Regex(r#""rule":"allow_workspace_viewer_read""#.to_string()),
            ]))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let mut headers = BTreeMap::new();
        headers.insert("X-Scope-OrgID".to_string(), "acme-corp".to_string());
        let sink = HttpAuditSink::new(format!("{}/loki/api/v1/push", server.url()), headers).unwrap();

        sink.deliver(&[test_record("d1")]).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/push")
            .with_status(503)
            .create_async()
            .await;

        let sink = HttpAuditSink::new(format!("{}/push", server.url()), BTreeMap::new()).unwrap();
        let err = sink.deliver(&[test_record("d1")]).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected { status: 503 }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let sink = HttpAuditSink::new("http://127.0.0.1:9/push".to_string(), BTreeMap::new()).unwrap();
        let err = sink.deliver(&[test_record("d1")]).await.unwrap_err();
        assert!(matches!(err, SinkError::Transport(_)));
    }
}
