//! UI layer for the mint GUI.

pub mod app;

pub use app::{MintGuiApp, StartupConfig};
