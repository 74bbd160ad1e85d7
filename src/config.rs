use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// How the per-stage node representations are combined into the final one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JumpingKnowledge {
    /// Use only the output of the last stage.
    Last,
    /// Concatenate the outputs of all stages along the feature axis.
    Cat,
    /// Element-wise maximum over the outputs of all stages.
    Max,
}

impl fmt::Display for JumpingKnowledge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpingKnowledge::Last => write!(f, "last"),
            JumpingKnowledge::Cat => write!(f, "cat"),
            JumpingKnowledge::Max => write!(f, "max"),
        }
    }
}

/// Per-stage construction options.
///
/// `concat` is accepted for compatibility with callers that configure head
/// merging, but the stage builder discards it: stages always concatenate
/// head outputs so that `hidden_channels` is reconstructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOptions {
    pub heads: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concat: Option<bool>,
    #[serde(default = "default_dropout")]
    pub dropout: f64,
}

impl StageOptions {
    pub fn new(heads: usize, dropout: f64) -> Self {
        Self {
            heads,
            concat: None,
            dropout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatConfig {
    pub in_channels: usize,
    pub hidden_channels: usize,
    pub num_layers: usize,
    pub out_channels: Option<usize>,
    pub dropout: f64,
    pub heads: usize,
    pub jk: JumpingKnowledge,
    pub layer_norm: bool,
}

impl Default for GatConfig {
    fn default() -> Self {
        Self {
            in_channels: 1,
            hidden_channels: 32,
            num_layers: 8,
            out_channels: Some(1),
            dropout: 0.3,
            heads: 8,
            jk: JumpingKnowledge::Last,
            layer_norm: false,
        }
    }
}

impl GatConfig {
    /// Configuration for a scalar-field run: one input and one output channel.
    pub fn for_run(
        hidden_channels: usize,
        num_layers: usize,
        dropout: f64,
        heads: usize,
        jk: JumpingKnowledge,
    ) -> Self {
        Self {
            in_channels: 1,
            hidden_channels,
            num_layers,
            out_channels: Some(1),
            dropout,
            heads,
            jk,
            layer_norm: false,
        }
    }

    pub fn validate(&self) {
        assert!(self.in_channels > 0, "in_channels must be > 0");
        assert!(self.hidden_channels > 0, "hidden_channels must be > 0");
        assert!(self.num_layers > 0, "num_layers must be > 0");
        assert!(self.heads > 0, "heads must be > 0");
        assert!(
            self.hidden_channels % self.heads == 0,
            "hidden_channels must be divisible by heads"
        );
        assert!(
            (0.0..1.0).contains(&self.dropout),
            "dropout must be within [0, 1)"
        );
    }

    /// Output width of each attention head; concatenating all heads
    /// reconstructs `hidden_channels`.
    pub fn per_head_channels(&self) -> usize {
        self.hidden_channels / self.heads
    }

    pub fn stage_options(&self) -> StageOptions {
        StageOptions::new(self.heads, self.dropout)
    }
}

impl fmt::Display for GatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub batch_size: usize,
    pub max_epochs: usize,
    pub lr: f64,
    pub early_stopping: bool,
    pub accelerator: String,
    pub devices: Option<Vec<usize>>,
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_epochs: default_max_epochs(),
            lr: default_lr(),
            early_stopping: false,
            accelerator: "cpu".to_string(),
            devices: None,
            seed: default_seed(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) {
        assert!(self.batch_size > 0, "batch_size must be > 0");
        assert!(self.max_epochs > 0, "max_epochs must be > 0");
        assert!(self.lr > 0.0, "lr must be > 0");
    }
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Filesystem layout of a run. Every path is derived from the experiments
/// root and the run name; nothing here is process-global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPaths {
    root: PathBuf,
    name: String,
}

impl RunPaths {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn experiments_path(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(&self.name)
    }

    pub fn artifacts_path(&self) -> PathBuf {
        self.run_dir().join("artifacts")
    }

    pub fn logs_path(&self) -> PathBuf {
        self.run_dir().join("logs")
    }

    /// Artifact directory of a previously persisted run.
    pub fn load_artifacts_path(&self, run_name: &str) -> PathBuf {
        self.root.join(run_name).join("artifacts")
    }
}

fn default_batch_size() -> usize {
    32
}

fn default_max_epochs() -> usize {
    1
}

fn default_lr() -> f64 {
    1e-3
}

fn default_seed() -> u64 {
    42
}

fn default_dropout() -> f64 {
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_head_channels_reconstruct_hidden() {
        let config = GatConfig {
            hidden_channels: 32,
            heads: 8,
            ..Default::default()
        };
        config.validate();
        assert_eq!(config.per_head_channels(), 4);
        assert_eq!(config.per_head_channels() * config.heads, 32);
    }

    #[test]
    #[should_panic(expected = "divisible by heads")]
    fn indivisible_heads_rejected() {
        let config = GatConfig {
            hidden_channels: 30,
            heads: 8,
            ..Default::default()
        };
        config.validate();
    }

    #[test]
    fn for_run_pins_scalar_channels() {
        let config = GatConfig::for_run(64, 4, 0.1, 4, JumpingKnowledge::Cat);
        assert_eq!(config.in_channels, 1);
        assert_eq!(config.out_channels, Some(1));
        assert_eq!(config.hidden_channels, 64);
        assert_eq!(config.num_layers, 4);
    }

    #[test]
    fn run_paths_layout() {
        let paths = RunPaths::new("experiments", "flame-a");
        assert_eq!(paths.run_dir(), PathBuf::from("experiments/flame-a"));
        assert_eq!(
            paths.artifacts_path(),
            PathBuf::from("experiments/flame-a/artifacts")
        );
        assert_eq!(paths.logs_path(), PathBuf::from("experiments/flame-a/logs"));
        assert_eq!(
            paths.load_artifacts_path("flame-b"),
            PathBuf::from("experiments/flame-b/artifacts")
        );
    }

    #[test]
    fn jk_roundtrips_through_serde() {
        let json = serde_json::to_string(&JumpingKnowledge::Cat).unwrap();
        assert_eq!(json, "\"cat\"");
        let jk: JumpingKnowledge = serde_json::from_str("\"max\"").unwrap();
        assert_eq!(jk, JumpingKnowledge::Max);
    }
}
