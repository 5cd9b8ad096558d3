//! Wire protocol for the stdio side of the bridge.
//!
//! Two independent streams connect the bridge to its collaborator process:
//! requests and diagnostics go out on stdout, responses come back on stdin.
//! Both carry one JSON object per line.
//!
//! - **protocol**: Record types (RequestRecord, ResponseRecord, ResponseLog)
//!   and the envelope wrapping every outbound line
//! - **codec**: Newline-delimited JSON framing with per-line decode recovery

pub mod codec;
pub mod protocol;
