//! globe-core — country browsing and single-stream playback logic for the
//! Radio Globe app.
//!
//! The presentation layer (TUI, HTTP remote control) and the audio backend
//! live in `globe-tui`; this crate owns everything with state-machine
//! behavior: the country catalog, the station fetcher, the playback
//! controller, and the browse event loop that composes them.

pub mod browse;
pub mod catalog;
pub mod config;
pub mod directory;
pub mod error;
pub mod model;
pub mod platform;
pub mod playback;
pub mod state;
