#![doc = "figma-snapshot-core: extraction pipeline library for figma-snapshot."]

//! This crate holds the data model, the Figma API client and the team → project → file
//! traversal that produces one [`model::ExtractionRun`] per invocation.
//! Process-level concerns (env vars, config files, writing the snapshot) live in the CLI crate.
//!
//! # Usage
//! Build a [`client::FigmaClient`], hand it to [`walker::walk`] together with the team ids,
//! and serialize the returned run.

pub mod aggregate;
pub mod client;
pub mod config;
pub mod contract;
pub mod error;
pub mod model;
pub mod paginate;
pub mod retry;
pub mod walker;
