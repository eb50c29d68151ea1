//! Resonate - purchase and secure-download backend for rendered
//! audio-visualization videos.
//!
//! This library provides the purchase lifecycle, the signed download-token
//! codec, the download access gate, and the thin HTTP surface around them.

pub mod access;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod lifecycle;
pub mod models;
pub mod notify;
pub mod storage;
pub mod token;
pub mod util;
