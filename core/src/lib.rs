// core/src/lib.rs

//! Furrow: ordered async step pipelines.
//!
//! A pipeline is a list of named steps run against one shared, lockable
//! context. Each step can carry `before`, `on` and `after` handlers, be
//! marked optional, or be skipped by a condition evaluated at run time.
//! Any handler may stop the pipeline early or fail it with its own error type.
//!
//! The FarmLink marketplace drives its multi-step flows (signup, signin,
//! listing creation, order placement...) through pipelines registered in a
//! [`Furrow`] registry keyed by the context type.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context::Handler;
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::definition::Pipeline;

pub use crate::error::{FurrowError, FurrowResult};

pub use crate::registry::Furrow;
