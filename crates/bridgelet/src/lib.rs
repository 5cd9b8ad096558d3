//! bridgelet: HTTP bridge that forwards requests as stdio records.
//!
//! Incoming HTTP requests are serialized as one-line JSON records on
//! stdout; response records arriving on stdin are correlated back to the
//! waiting HTTP client by a per-request id. The process on the other side
//! of the streams is an untrusted collaborator - the bridge assumes nothing
//! about it beyond the wire format.

pub mod bridge;
pub mod consumer;
pub mod emitter;
pub mod registry;
pub mod service;
pub mod transport;

pub use bridge::protocol::{
    APP_REQUEST, APP_RESPONSE_LOG, Envelope, RequestId, RequestRecord, ResponseLog, ResponseRecord,
};
pub use consumer::{ConsumerError, InboundConsumer};
pub use emitter::RecordEmitter;
pub use registry::{Delivery, PendingResponse, ResponseRegistry, WaitError};
pub use service::{BridgeService, SubmitError};
