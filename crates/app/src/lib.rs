//! `weave-app`: configuration loading and the bootstrap entry point.

pub mod bootstrap;
pub mod config;
pub mod demo;

pub use bootstrap::{Bootstrapped, build_application};
pub use config::{AppSettings, Config, ConfigLoader, LoadedConfig};
