//! Inbound stream consumer.
//!
//! One long-lived task reads response records from the collaborator and
//! feeds each to the correlation registry. Bad lines are reported on the
//! diagnostic channel and skipped; orphaned responses are reported and
//! discarded. Only a transport-level read error stops the loop - the caller
//! treats that as fatal. End of input ends the loop quietly: the bridge
//! keeps serving, and whatever is still pending never resolves.

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::bridge::codec::{DecodedLine, NdJsonCodec};
use crate::bridge::protocol::{ResponseLog, ResponseRecord};
use crate::emitter::RecordEmitter;
use crate::registry::{Delivery, ResponseRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("inbound stream read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Sequential consumer of the inbound response stream.
pub struct InboundConsumer<R> {
    reader: FramedRead<R, NdJsonCodec<ResponseRecord>>,
    registry: Arc<ResponseRegistry>,
    emitter: RecordEmitter,
}

impl<R: AsyncRead + Unpin> InboundConsumer<R> {
    pub fn new(reader: R, registry: Arc<ResponseRegistry>, emitter: RecordEmitter) -> Self {
        Self {
            reader: FramedRead::new(reader, NdJsonCodec::new()),
            registry,
            emitter,
        }
    }

    /// Run until end-of-input or a read error.
    pub async fn run(mut self) -> Result<(), ConsumerError> {
        while let Some(frame) = self.reader.next().await {
            match frame? {
                DecodedLine::Record(response) => {
                    let request_id = response.request_id;
                    match self.registry.deliver(request_id, response) {
                        Delivery::Delivered => {
                            tracing::debug!(%request_id, "response delivered");
                        }
                        Delivery::Orphaned(response) => {
                            tracing::warn!(%request_id, "response has no registered waiter");
                            self.report(ResponseLog::orphaned(response)).await;
                        }
                    }
                }
                DecodedLine::Malformed { error, raw } => {
                    tracing::warn!(%error, "skipping malformed inbound line");
                    self.report(ResponseLog::malformed(error, raw)).await;
                }
            }
        }
        tracing::debug!("inbound stream reached end of input");
        Ok(())
    }

    async fn report(&self, log: ResponseLog) {
        // Diagnostics are best-effort; a dead outbound stream must not stop
        // the read loop.
        if let Err(e) = self.emitter.emit_log(&log).await {
            tracing::error!(error = %e, "failed to emit diagnostic record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{Envelope, RequestId};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct Harness {
        registry: Arc<ResponseRegistry>,
        inbound: DuplexStream,
        outbound: BufReader<DuplexStream>,
        task: tokio::task::JoinHandle<Result<(), ConsumerError>>,
    }

    fn spawn_consumer() -> Harness {
        let (inbound_tx, inbound_rx) = tokio::io::duplex(4096);
        let (outbound_rx, outbound_tx) = tokio::io::duplex(4096);

        let registry = ResponseRegistry::new();
        let emitter = RecordEmitter::new(outbound_tx);
        let consumer = InboundConsumer::new(inbound_rx, Arc::clone(&registry), emitter);

        Harness {
            registry,
            inbound: inbound_tx,
            outbound: BufReader::new(outbound_rx),
            task: tokio::spawn(consumer.run()),
        }
    }

    async fn next_log(outbound: &mut BufReader<DuplexStream>) -> Envelope {
        let mut line = String::new();
        outbound.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    fn response_line(id: RequestId, body: &[u8]) -> String {
        let record = ResponseRecord {
            body: body.to_vec(),
            request_id: id,
        };
        let mut line = serde_json::to_string(&record).unwrap();
        line.push('\n');
        line
    }

    #[tokio::test]
    async fn well_formed_line_resolves_registered_waiter() {
        let mut harness = spawn_consumer();
        let id = RequestId::new();
        let pending = harness.registry.register(id);

        harness
            .inbound
            .write_all(response_line(id, b"answer").as_bytes())
            .await
            .unwrap();

        let delivered = pending.resolve(None).await.unwrap();
        assert_eq!(delivered.body, b"answer");

        drop(harness.inbound);
        harness.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn orphan_is_reported_and_discarded() {
        let mut harness = spawn_consumer();
        let id = RequestId::new();

        harness
            .inbound
            .write_all(response_line(id, b"nobody home").as_bytes())
            .await
            .unwrap();

        let envelope = next_log(&mut harness.outbound).await;
        assert_eq!(envelope.app, "http.response.log");
        assert_eq!(envelope.content["error"], "unknown request");
        assert_eq!(envelope.content["response"]["request_id"], id.to_string());

        drop(harness.inbound);
        harness.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn malformed_line_is_reported_and_loop_continues() {
        let mut harness = spawn_consumer();
        let id = RequestId::new();
        let pending = harness.registry.register(id);

        harness.inbound.write_all(b"{ not json\n").await.unwrap();
        harness
            .inbound
            .write_all(response_line(id, b"still works").as_bytes())
            .await
            .unwrap();

        let envelope = next_log(&mut harness.outbound).await;
        assert_eq!(envelope.app, "http.response.log");
        assert!(
            envelope.content["error"]
                .as_str()
                .unwrap()
                .starts_with("malformed:")
        );
        assert!(envelope.content["raw"].is_string());

        // The next well-formed line is still processed.
        let delivered = pending.resolve(None).await.unwrap();
        assert_eq!(delivered.body, b"still works");

        drop(harness.inbound);
        harness.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn exactly_one_diagnostic_per_bad_line() {
        let mut harness = spawn_consumer();

        harness.inbound.write_all(b"garbage\n").await.unwrap();
        drop(harness.inbound);
        harness.task.await.unwrap().unwrap();

        let envelope = next_log(&mut harness.outbound).await;
        assert!(
            envelope.content["error"]
                .as_str()
                .unwrap()
                .starts_with("malformed:")
        );

        // Stream is drained; nothing else was emitted.
        let mut rest = String::new();
        harness.outbound.read_line(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn end_of_input_ends_run_cleanly() {
        let harness = spawn_consumer();
        drop(harness.inbound);
        harness.task.await.unwrap().unwrap();
    }
}
