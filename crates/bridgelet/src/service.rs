//! Bridge service shared by the HTTP transport.
//!
//! Owns the correlation registry and the outbound emitter, and fixes the
//! submission order: the waiter is registered *before* the request record
//! is emitted, so the collaborator cannot answer a request whose waiter
//! does not exist yet. The reverse race - a response line for an id that
//! was never registered - still lands on the orphan path and is reported
//! there.

use std::sync::Arc;
use std::time::Duration;

use crate::bridge::protocol::RequestRecord;
use crate::emitter::RecordEmitter;
use crate::registry::{PendingResponse, ResponseRegistry};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("failed to emit request record: {0}")]
    Emit(#[source] std::io::Error),
}

/// Transport-facing bridge state.
pub struct BridgeService {
    registry: Arc<ResponseRegistry>,
    emitter: RecordEmitter,
    response_deadline: Option<Duration>,
}

impl BridgeService {
    pub fn new(registry: Arc<ResponseRegistry>, emitter: RecordEmitter) -> Self {
        Self {
            registry,
            emitter,
            response_deadline: None,
        }
    }

    /// Bound the per-request wait for a response.
    ///
    /// Off by default: an unanswered request then holds its handler and
    /// connection open indefinitely, matching the base wire contract.
    pub fn with_response_deadline(mut self, deadline: Duration) -> Self {
        self.response_deadline = Some(deadline);
        self
    }

    pub fn registry(&self) -> &Arc<ResponseRegistry> {
        &self.registry
    }

    pub fn emitter(&self) -> &RecordEmitter {
        &self.emitter
    }

    pub fn response_deadline(&self) -> Option<Duration> {
        self.response_deadline
    }

    /// Register a waiter for the record's id, then emit the record.
    ///
    /// If emission fails the returned handle never materializes and its
    /// registry entry is cleaned up on drop.
    pub async fn submit(&self, record: RequestRecord) -> Result<PendingResponse, SubmitError> {
        let pending = self.registry.register(record.request_id);
        self.emitter
            .emit_request(&record)
            .await
            .map_err(SubmitError::Emit)?;
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{Envelope, RequestId};
    use std::collections::HashMap;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn record(id: RequestId) -> RequestRecord {
        RequestRecord {
            method: "PUT".to_string(),
            header: HashMap::new(),
            remote_addr: "192.0.2.1:4242".to_string(),
            uri: "/submit".to_string(),
            body: b"payload".to_vec(),
            request_id: id,
        }
    }

    #[tokio::test]
    async fn submit_registers_then_emits() {
        let (outbound_rx, outbound_tx) = tokio::io::duplex(4096);
        let registry = ResponseRegistry::new();
        let service = BridgeService::new(Arc::clone(&registry), RecordEmitter::new(outbound_tx));

        let id = RequestId::new();
        let pending = service.submit(record(id)).await.unwrap();

        assert_eq!(pending.id(), id);
        assert_eq!(registry.pending(), 1);

        let mut line = String::new();
        BufReader::new(outbound_rx).read_line(&mut line).await.unwrap();
        let envelope: Envelope = serde_json::from_str(&line).unwrap();
        assert_eq!(envelope.app, "http.request");
        assert_eq!(envelope.content["request_id"], id.to_string());
        assert_eq!(envelope.content["body"], "cGF5bG9hZA==");
    }

    #[tokio::test]
    async fn failed_emission_leaves_no_waiter_behind() {
        let (outbound_rx, outbound_tx) = tokio::io::duplex(64);
        let registry = ResponseRegistry::new();
        let service = BridgeService::new(Arc::clone(&registry), RecordEmitter::new(outbound_tx));
        drop(outbound_rx);

        let result = service.submit(record(RequestId::new())).await;
        assert!(matches!(result, Err(SubmitError::Emit(_))));
        assert_eq!(registry.pending(), 0);
    }

    #[tokio::test]
    async fn deadline_defaults_off() {
        let (_outbound_rx, outbound_tx) = tokio::io::duplex(64);
        let service = BridgeService::new(ResponseRegistry::new(), RecordEmitter::new(outbound_tx));
        assert!(service.response_deadline().is_none());

        let service = service.with_response_deadline(Duration::from_secs(5));
        assert_eq!(service.response_deadline(), Some(Duration::from_secs(5)));
    }
}
