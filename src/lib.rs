//! modwatch library.
//!
//! This library provides the core functionality for the modwatch Discord bot:
//! mirroring the mod portal catalog, detecting new releases and notifying the
//! guilds that track them.

pub mod bot;
pub mod catalog;
pub mod changelog;
pub mod changes;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod portal;
pub mod state;
pub mod subscriptions;
pub mod types;
pub mod updater;
pub mod utils;
pub mod version;
pub mod watermark;

pub use config::Config;
pub use error::{ModwatchError, Result};
