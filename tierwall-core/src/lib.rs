//! Tierwall Core
//!
//! Compiles per-environment network admission policies for a container
//! cluster stack into bound security-group rules and an ordered resource plan.

pub mod compiler;
pub mod config;
pub mod effect;
pub mod emitter;
pub mod environment;
pub mod error;
pub mod graph;
pub mod interpreter;
pub mod plan;
pub mod policy;
pub mod provider;
pub mod resource;
pub mod rule;
pub mod stack;
pub mod topology;
pub mod validation;

pub use error::CompileError;
