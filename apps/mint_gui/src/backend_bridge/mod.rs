//! Bridge between the egui thread and the async controller.

pub mod commands;
pub mod runtime;
