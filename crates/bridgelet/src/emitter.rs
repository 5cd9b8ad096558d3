//! Shared outbound record writer.
//!
//! Every record leaving the bridge - forwarded requests, orphan reports,
//! malformed-line diagnostics, completion telemetry - goes through a single
//! framed writer, so lines cannot interleave. The writer sits behind an
//! async mutex taken per record; the lock is never held across anything but
//! the write itself.

use std::io;
use std::sync::Arc;

use futures::SinkExt;
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;

use crate::bridge::codec::NdJsonCodec;
use crate::bridge::protocol::{
    APP_REQUEST, APP_RESPONSE_LOG, Envelope, RequestRecord, ResponseLog,
};

type OutboundSink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, NdJsonCodec<Envelope>>;

/// Clonable handle to the outbound stream.
#[derive(Clone)]
pub struct RecordEmitter {
    sink: Arc<Mutex<OutboundSink>>,
}

impl RecordEmitter {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        let sink = FramedWrite::new(
            Box::new(writer) as Box<dyn AsyncWrite + Send + Unpin>,
            NdJsonCodec::new(),
        );
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// Emitter over the process stdout, the bridge's outbound stream.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// Emit a request record under the `http.request` tag.
    pub async fn emit_request(&self, record: &RequestRecord) -> io::Result<()> {
        self.emit(APP_REQUEST, record).await
    }

    /// Emit a diagnostic/telemetry record under the `http.response.log` tag.
    pub async fn emit_log(&self, log: &ResponseLog) -> io::Result<()> {
        self.emit(APP_RESPONSE_LOG, log).await
    }

    async fn emit<T: Serialize>(&self, app: &'static str, content: &T) -> io::Result<()> {
        let envelope =
            Envelope::new(app, content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.sink.lock().await.send(envelope).await
    }
}
