//! subdub - Video Translation Task Manager Client
//!
//! A Rust client for a video translation task server: create tasks, upload
//! source videos, edit the generated subtitles with validation and autosave,
//! request voice dubbing and download the results.

pub mod cli;
pub mod config;
pub mod error;
pub mod task;
pub mod subtitle;
pub mod api;
pub mod editor;
pub mod session;
pub mod poller;
pub mod download;
pub mod console;
