//! Batch orchestration for the ComfyUI pipeline.
//!
//! Ties the core pieces together: patch the workflow template per job,
//! submit it, poll the server's output directory for the results, and
//! log each attempt to the history file.

pub mod poll;
pub mod runner;
pub mod submit;
