//! Remedy Adapter - field-rename adapters for drifted records
//!
//! The [`AdapterRegistry`] holds a single `old -> new` mapping shared by every
//! pipeline run. Applying it moves a value from `old` to `new` only when
//! `new` is absent, so it never destroys data and repeated application is a
//! no-op.
//!
//! # Example
//!
//! ```rust
//! use remedy_adapter::{AdapterRegistry, Mapping};
//! use serde_json::json;
//!
//! let registry = AdapterRegistry::in_memory();
//! registry
//!     .set(&Mapping::from([("level".to_string(), "Level".to_string())]))
//!     .unwrap();
//!
//! let drifted = json!({"LineId": 1, "level": "INFO"}).as_object().cloned().unwrap();
//! let fixed = registry.apply(&drifted);
//! assert_eq!(fixed["Level"], "INFO");
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod registry;

pub use error::{AdapterError, Result};
pub use registry::{apply_mapping, AdapterRegistry, Mapping, Record};
