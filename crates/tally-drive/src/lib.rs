//! Google Drive storage for tally
//!
//! - `client` - DriveClient, a RemoteFileStore over the Drive v3 REST API
//! - `config` - DriveConfig (endpoints, timeout, access token)
//! - `models` - API response models

pub mod client;
pub mod config;
pub mod models;

pub use client::{DriveClient, DriveError};
pub use config::{DriveConfig, ACCESS_TOKEN_ENV};
