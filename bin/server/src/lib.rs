//! ratline HTTP dispatch layer.
//!
//! Every request passes the hourly budget check before any handler runs;
//! access-layer rejections are rendered as JSONAPI error documents.

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
