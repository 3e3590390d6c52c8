//! Minimal typed client for the Daytona sandbox API.
//!
//! Covers only the surface the execution core needs: sandbox
//! create/remove, the toolbox filesystem and process endpoints
//! (including long-lived exec sessions), and port preview links.

mod client;
mod error;
mod models;

pub use client::{DaytonaClient, DaytonaConfig};
pub use error::{DaytonaError, Result};
pub use models::*;
