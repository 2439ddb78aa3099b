//! # lanbox-sender
//!
//! Connects to a lanbox receiver, registers a username and pushes files
//! and text to it while a background task polls for replies.

pub mod config;
pub mod session;
