//! # kwcluster-core
//!
//! Core types, traits, and abstractions for the kwcluster keyword research pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other kwcluster crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod export;
pub mod input;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result, SerpError};
pub use events::EventBus;
pub use export::{export_csv, export_rows, write_csv, ExportRow};
pub use input::{parse_keyword_file, parse_keywords};
pub use models::*;
pub use traits::*;
