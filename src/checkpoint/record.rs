use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::Backend;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::GatConfig;
use crate::error::PipelineError;
use crate::model::Gat2Model;
use crate::training::EvalResult;

/// The recorder appends its own extension to this stem.
pub const MODEL_WEIGHTS_STEM: &str = "model";
pub const MODEL_CONFIG_FILENAME: &str = "model.json";
pub const RESULTS_FILENAME: &str = "results.json";

/// Persist the trained model under the artifact directory: the weight
/// record plus the architecture config the artifact is rebuilt from.
pub fn save_model<B: Backend>(model: &Gat2Model<B>, artifacts_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(artifacts_dir)
        .with_context(|| format!("Failed to create artifact directory: {:?}", artifacts_dir))?;

    let config_path = artifacts_dir.join(MODEL_CONFIG_FILENAME);
    let config_json = serde_json::to_string_pretty(model.config())
        .with_context(|| "Failed to serialize model config")?;
    fs::write(&config_path, config_json)
        .with_context(|| format!("Failed to write model config: {:?}", config_path))?;

    let weights_path = artifacts_dir.join(MODEL_WEIGHTS_STEM);
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    recorder
        .record(model.clone().into_record(), weights_path.clone())
        .with_context(|| "Failed to save model weights")?;

    info!("Model persisted to: {:?}", artifacts_dir);
    Ok(weights_path)
}

/// Load a persisted model. The architecture comes from the artifact's own
/// config file; caller-side layer flags play no part here.
pub fn load_model<B: Backend>(artifacts_dir: &Path, device: &B::Device) -> Result<Gat2Model<B>> {
    let config_path = artifacts_dir.join(MODEL_CONFIG_FILENAME);
    if !config_path.exists() {
        return Err(PipelineError::ArtifactMissing { path: config_path }.into());
    }

    let config_json = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read model config: {:?}", config_path))?;
    let config: GatConfig =
        serde_json::from_str(&config_json).with_context(|| "Failed to parse model config")?;

    let model = Gat2Model::<B>::new(config, device);

    let weights_path = artifacts_dir.join(MODEL_WEIGHTS_STEM);
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load(weights_path.clone(), device)
        .with_context(|| format!("Failed to load model weights from: {:?}", weights_path))?;

    info!("Model weights loaded from: {:?}", artifacts_dir);
    Ok(model.load_record(record))
}

/// Write the evaluation result map next to the model artifact.
pub fn write_results(artifacts_dir: &Path, results: &EvalResult) -> Result<PathBuf> {
    fs::create_dir_all(artifacts_dir)
        .with_context(|| format!("Failed to create artifact directory: {:?}", artifacts_dir))?;

    let results_path = artifacts_dir.join(RESULTS_FILENAME);
    let json = serde_json::to_string_pretty(results)
        .with_context(|| "Failed to serialize evaluation results")?;
    fs::write(&results_path, json)
        .with_context(|| format!("Failed to write results: {:?}", results_path))?;

    info!("Evaluation results written to: {:?}", results_path);
    Ok(results_path)
}

/// Names of runs under the experiments root that carry a loadable model.
pub fn list_runs(experiments_dir: &Path) -> Result<Vec<String>> {
    if !experiments_dir.exists() {
        warn!("Experiments directory does not exist: {:?}", experiments_dir);
        return Ok(Vec::new());
    }

    let mut runs = Vec::new();
    for entry in WalkDir::new(experiments_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let has_model = entry
            .path()
            .join("artifacts")
            .join(MODEL_CONFIG_FILENAME)
            .exists();
        if has_model {
            if let Some(name) = entry.file_name().to_str() {
                runs.push(name.to_string());
            }
        }
    }

    runs.sort();
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JumpingKnowledge;
    use burn::tensor::{Distribution, Int, Tensor};
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn test_config() -> GatConfig {
        GatConfig {
            in_channels: 1,
            hidden_channels: 8,
            num_layers: 2,
            out_channels: Some(1),
            dropout: 0.0,
            heads: 2,
            jk: JumpingKnowledge::Last,
            layer_norm: false,
        }
    }

    fn chain_edges(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 2, Int> {
        let src = Tensor::<TestBackend, 1, Int>::from_ints([0i64, 1, 1, 2].as_slice(), device);
        let dst = Tensor::<TestBackend, 1, Int>::from_ints([1i64, 0, 2, 1].as_slice(), device);
        Tensor::stack::<2>(vec![src, dst], 0)
    }

    #[test]
    fn save_then_load_preserves_config_and_outputs() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let model = Gat2Model::<TestBackend>::new(test_config(), &device);

        save_model(&model, dir.path()).unwrap();
        let loaded = load_model::<TestBackend>(dir.path(), &device).unwrap();
        assert_eq!(loaded.config(), &test_config());

        let x = Tensor::random([3, 1], Distribution::Uniform(-1.0, 1.0), &device);
        let before: Vec<f32> = model
            .forward(x.clone(), chain_edges(&device))
            .reshape([3])
            .into_data()
            .to_vec()
            .unwrap();
        let after: Vec<f32> = loaded
            .forward(x, chain_edges(&device))
            .reshape([3])
            .into_data()
            .to_vec()
            .unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn load_without_artifact_reports_missing() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();

        let err = load_model::<TestBackend>(dir.path(), &device).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ArtifactMissing { .. })
        ));
    }

    #[test]
    fn write_results_roundtrips() {
        let dir = TempDir::new().unwrap();
        let mut results = EvalResult::new();
        results.insert("test_loss".to_string(), 0.25);
        results.insert("test_mae".to_string(), 0.4);

        let path = write_results(dir.path(), &results).unwrap();
        let loaded: EvalResult =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded, results);
    }

    #[test]
    fn list_runs_finds_persisted_models() {
        let dir = TempDir::new().unwrap();
        assert!(list_runs(dir.path()).unwrap().is_empty());

        let device = Default::default();
        let model = Gat2Model::<TestBackend>::new(test_config(), &device);
        save_model(&model, &dir.path().join("flame-a").join("artifacts")).unwrap();
        fs::create_dir_all(dir.path().join("not-a-run")).unwrap();

        assert_eq!(list_runs(dir.path()).unwrap(), vec!["flame-a".to_string()]);
    }

    #[test]
    fn missing_experiments_dir_is_empty_not_fatal() {
        let runs = list_runs(Path::new("/definitely/not/here")).unwrap();
        assert!(runs.is_empty());
    }
}
