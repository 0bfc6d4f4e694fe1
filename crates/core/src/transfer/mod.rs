//! Request orchestration between the HTTP surface and the storage gateway.
//!
//! ```text
//! upload:   payload ─► validate ─► resolve key ─► gateway.put ─► UploadResult
//! download: name    ─► validate ─► resolve key ─► gateway.get ─► ObjectStream
//! ```

mod service;

pub use service::{TransferService, TransferStage, UploadResult};
