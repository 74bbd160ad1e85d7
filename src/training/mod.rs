pub mod early_stopping;
pub mod metrics;
pub mod run;
pub mod trainer;

pub use early_stopping::{EarlyStopping, Mode, DEFAULT_PATIENCE};
pub use metrics::{EpochRecord, MetricsLogger};
pub use run::{evaluate, execute, EvalResult, ModelSource};
pub use trainer::{GatTrainer, TrainOutput};
