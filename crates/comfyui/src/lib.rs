//! HTTP client for ComfyUI image-generation servers.
//!
//! Only the REST surface the batch pipeline needs: readiness probe
//! and workflow submission.

pub mod api;
