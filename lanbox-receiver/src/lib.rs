//! # lanbox-receiver
//!
//! Listens on the LAN and accepts text and files from one sender at a
//! time, writing received files into the download directory.

pub mod config;
pub mod service;
