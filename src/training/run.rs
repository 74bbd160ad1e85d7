use anyhow::{bail, Result};
use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::ElementConversion;
use std::collections::BTreeMap;
use tracing::info;

use super::early_stopping::{EarlyStopping, Mode, DEFAULT_PATIENCE};
use super::metrics::{EpochRecord, MetricsLogger};
use super::trainer::GatTrainer;
use crate::checkpoint;
use crate::config::{GatConfig, RunConfig, RunPaths};
use crate::data::{CombustionDataModule, DataLoader};
use crate::model::Gat2Model;

/// Metric name to scalar value, produced once at the end of a run.
pub type EvalResult = BTreeMap<String, f64>;

/// Where the run's model comes from.
pub enum ModelSource {
    /// Build a fresh model from the given layer configuration.
    Fresh(GatConfig),
    /// Deserialize the artifact persisted by a previous run of this name.
    Load(String),
}

/// Runs the whole pipeline: resolve the model, fit, evaluate once, persist
/// the evaluation result and the trained model. Any failure aborts the run.
pub fn execute<B: AutodiffBackend>(
    source: ModelSource,
    run: &RunConfig,
    paths: &RunPaths,
    data: &CombustionDataModule,
    device: &B::Device,
) -> Result<EvalResult> {
    run.validate();
    B::seed(device, run.seed);

    let model: Gat2Model<B> = match source {
        ModelSource::Load(name) => {
            let artifacts = paths.load_artifacts_path(&name);
            info!("Loading model from {:?}", artifacts);
            checkpoint::load_model::<B>(&artifacts, device)?
        }
        ModelSource::Fresh(config) => {
            info!("Building model: {}", config);
            Gat2Model::new(config, device)
        }
    };

    let model = fit(model, run, paths, data, device)?;

    let mut test_loader = data.test_loader::<B::InnerBackend>(device);
    let results = evaluate(&model.valid(), &mut test_loader)?;
    for (metric, value) in &results {
        info!("{} = {:.6}", metric, value);
    }

    let artifacts = paths.artifacts_path();
    checkpoint::write_results(&artifacts, &results)?;
    checkpoint::save_model(&model, &artifacts)?;
    info!("Run '{}' complete", paths.name());

    Ok(results)
}

/// Epoch loop with per-epoch validation, metric logging, and optional
/// early stopping on the validation loss.
fn fit<B: AutodiffBackend>(
    model: Gat2Model<B>,
    run: &RunConfig,
    paths: &RunPaths,
    data: &CombustionDataModule,
    device: &B::Device,
) -> Result<Gat2Model<B>> {
    let logger = MetricsLogger::new(&paths.logs_path())?;
    let config = model.config().clone();
    logger.log_hyperparams(&serde_json::json!({
        "hidden_channels": config.hidden_channels,
        "num_layers": config.num_layers,
        "dropout": config.dropout,
        "heads": config.heads,
        "jk": config.jk,
        "batch_size": run.batch_size,
        "max_epochs": run.max_epochs,
        "lr": run.lr,
        "seed": run.seed,
    }))?;

    let mut trainer = GatTrainer::new(model, run.lr);
    let mut stopper = run
        .early_stopping
        .then(|| EarlyStopping::new(DEFAULT_PATIENCE, Mode::Min));

    let mut train_loader = data.train_loader::<B>(device);
    let mut val_loader = data.val_loader::<B::InnerBackend>(device);

    for epoch in 1..=run.max_epochs {
        train_loader.reset();
        val_loader.reset();

        let train_loss = trainer.train_epoch(&mut train_loader)?;
        let val_loss = trainer.validate(&mut val_loader)?;

        logger.log_epoch(&EpochRecord {
            epoch,
            train_loss,
            val_loss,
        })?;
        info!(
            "Epoch {}/{}: train_loss = {:.6}, val_loss = {:.6}",
            epoch, run.max_epochs, train_loss, val_loss
        );

        if let Some(stopper) = stopper.as_mut() {
            if stopper.update(val_loss) {
                info!(
                    "Early stopping at epoch {} after {} epochs without improvement",
                    epoch,
                    stopper.patience()
                );
                break;
            }
        }
    }

    Ok(trainer.into_model())
}

/// One evaluation pass over the loader.
pub fn evaluate<B: Backend>(
    model: &Gat2Model<B>,
    loader: &mut dyn DataLoader<B>,
) -> Result<EvalResult> {
    let mut sum_sq = 0.0;
    let mut sum_abs = 0.0;
    let mut count = 0usize;

    while let Some(batch) = loader.next_batch()? {
        let prediction = model.forward(batch.features, batch.edge_index);
        let diff = prediction - batch.targets;
        let [rows, cols] = diff.dims();
        sum_sq += diff
            .clone()
            .powf_scalar(2.0)
            .sum()
            .into_scalar()
            .elem::<f64>();
        sum_abs += diff.abs().sum().into_scalar().elem::<f64>();
        count += rows * cols;
    }

    if count == 0 {
        bail!("evaluation pass produced no batches");
    }

    let mse = sum_sq / count as f64;
    let mut results = EvalResult::new();
    results.insert("test_loss".to_string(), mse);
    results.insert("test_rmse".to_string(), mse.sqrt());
    results.insert("test_mae".to_string(), sum_abs / count as f64);
    Ok(results)
}
