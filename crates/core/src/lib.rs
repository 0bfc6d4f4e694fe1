//! Core logic for Stowage.
//!
//! This crate has no web dependencies. It owns object addressing, the storage
//! gateway abstraction with its backends, and the upload/download use cases.
//!
//! # Modules
//!
//! - `storage` - Key resolution, the gateway trait and S3/filesystem/memory backends
//! - `transfer` - Upload and download orchestration

pub mod storage;
pub mod transfer;
