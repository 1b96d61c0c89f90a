#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod build;
pub mod compiler;
pub mod config;
mod core;
mod engine;
mod error;
pub mod integrity;
pub mod language;
pub mod lint;
pub mod nls;
pub mod output;
pub mod package;
pub mod sync;
pub mod tasks;
mod utils;
mod workspace;

pub use crate::core::{BoxFuture, Environment, FailurePolicy, Mode, TaskResult};
pub use crate::engine::{Action, Diagnostics, Orchestrator, TaskContext, TaskDef, TaskExecution};
pub use crate::error::*;
#[cfg(feature = "logging")]
pub use crate::utils::init_logging;
pub use crate::workspace::Workspace;
