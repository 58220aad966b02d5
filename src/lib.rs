//! OmniPage Server Library
//!
//! HTTP front end for the OmniPage recognition engine. The binary in
//! main.rs wires configuration, engine startup and shutdown around it.
//!
//! # Modules
//!
//! - `engine`: Engine contract, native binding and the handle pool
//! - `staging`: Temporary files for payloads and per-page output
//! - `ocr`: Page-by-page and template orchestration
//! - `routes`: `/ocr`, `/ocr-template` and `/health`

pub mod config;
pub mod engine;
pub mod error;
pub mod ocr;
pub mod routes;
pub mod staging;
pub mod state;
