// Library exports for use in the training binary and tests

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod training;

// Re-export commonly used types
pub use config::{GatConfig, JumpingKnowledge, RunConfig, RunPaths};
pub use data::{CombustionDataModule, GraphBatch};
pub use error::PipelineError;
pub use model::Gat2Model;
pub use training::{EvalResult, GatTrainer, ModelSource};
