//! Core library for the ComfyUI batch pipeline.
//!
//! Everything in this crate is synchronous and free of network I/O:
//! the workflow template engine, the output-directory archiver, and
//! the flat-file formats (job manifest, history log) that surround a
//! generation run.

pub mod archive;
pub mod config;
pub mod error;
pub mod history;
pub mod manifest;
pub mod naming;
pub mod style;
pub mod types;
pub mod workflow;
