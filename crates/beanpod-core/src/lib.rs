//! beanpod-core library.
//!
//! Integrity recovery and status cascading for file-backed work items
//! ("beans"). [`store::BeanStore`] is the entry point: it lists beans through
//! a [`backend::BeanBackend`], repairs or quarantines malformed records,
//! clears dangling parent links, and cascades status changes on update.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per boundary; [`error::StoreError`] at the
//!   facade, each with a stable [`error::ErrorCode`].
//! - **Logging**: `tracing` macros with structured fields. The subscriber is
//!   installed by the binary.

pub mod backend;
pub mod cascade;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod history;
pub mod ingest;
pub mod integrity;
pub mod model;
pub mod notify;
pub mod paths;
pub mod process;
pub mod quarantine;
pub mod recovery;
pub mod store;

pub use error::{ErrorCode, StoreError};
pub use store::{BeanStore, ListingReport, UpdatedBean};
