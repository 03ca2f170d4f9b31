//! # dirsync-connector-feishu
//!
//! Reads the organization from the Feishu contact API.
//!
//! [`FeishuClient`] implements [`dirsync_core::RemoteDirectory`]:
//! departments come from the recursive children listing of the root
//! department, users from a per-department listing, de-duplicated by union
//! id. Requests carry a tenant access token cached by [`TokenCache`] until
//! shortly before it expires.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;

pub use auth::TokenCache;
pub use client::FeishuClient;
pub use config::{FeishuConfig, FeishuConfigError};
