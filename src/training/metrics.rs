use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const HPARAMS_FILENAME: &str = "hparams.json";
pub const METRICS_FILENAME: &str = "metrics.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
}

/// Writes run hyperparameters once and appends one JSON line per epoch
/// under the run's logs directory.
pub struct MetricsLogger {
    hparams_path: PathBuf,
    metrics_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(logs_dir: &Path) -> Result<Self> {
        fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;
        Ok(Self {
            hparams_path: logs_dir.join(HPARAMS_FILENAME),
            metrics_path: logs_dir.join(METRICS_FILENAME),
        })
    }

    pub fn log_hyperparams(&self, hparams: &serde_json::Value) -> Result<()> {
        let json = serde_json::to_string_pretty(hparams)
            .with_context(|| "Failed to serialize hyperparameters")?;
        fs::write(&self.hparams_path, json)
            .with_context(|| format!("Failed to write {:?}", self.hparams_path))?;
        Ok(())
    }

    pub fn log_epoch(&self, record: &EpochRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.metrics_path)
            .with_context(|| format!("Failed to open {:?}", self.metrics_path))?;
        let line =
            serde_json::to_string(record).with_context(|| "Failed to serialize epoch record")?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to append to {:?}", self.metrics_path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_hparams_and_epoch_lines() {
        let dir = TempDir::new().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();

        logger
            .log_hyperparams(&serde_json::json!({"hidden_channels": 32, "dropout": 0.3}))
            .unwrap();
        logger
            .log_epoch(&EpochRecord {
                epoch: 1,
                train_loss: 0.5,
                val_loss: 0.6,
            })
            .unwrap();
        logger
            .log_epoch(&EpochRecord {
                epoch: 2,
                train_loss: 0.4,
                val_loss: 0.55,
            })
            .unwrap();

        let hparams: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(HPARAMS_FILENAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(hparams["hidden_channels"], 32);

        let lines = std::fs::read_to_string(dir.path().join(METRICS_FILENAME)).unwrap();
        let records: Vec<EpochRecord> = lines
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].epoch, 2);
        assert!(records[1].train_loss < records[0].train_loss);
    }
}
