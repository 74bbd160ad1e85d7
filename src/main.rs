use anyhow::Result;
use burn::backend::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use combustion_gat::checkpoint;
use combustion_gat::config::{GatConfig, JumpingKnowledge, RunConfig, RunPaths};
use combustion_gat::data::{CombustionDataModule, DataModuleConfig};
use combustion_gat::error::PipelineError;
use combustion_gat::training::{execute, ModelSource};

type Backend = Autodiff<NdArray<f32>>;

const DEFAULT_EXPERIMENT: &str = "gat2-combustion";
const DEFAULT_EXPERIMENTS_ROOT: &str = "experiments";

#[derive(Debug, Parser)]
#[command(author, version, about = "GATv2 training script for combustion grids")]
struct Cli {
    /// Name of the experiment
    #[arg(long, default_value = DEFAULT_EXPERIMENT)]
    name: String,

    /// Name of a previous run whose persisted model should be loaded
    #[arg(long)]
    load_model: Option<String>,

    /// Hidden channels for the GAT
    #[arg(long, default_value_t = 32)]
    hidden_channels: usize,

    /// Number of layers in the GAT
    #[arg(long, default_value_t = 8)]
    num_layers: usize,

    /// Training dropout ratio
    #[arg(long, default_value_t = 0.3)]
    dropout: f64,

    /// Number of attention heads
    #[arg(long, default_value_t = 8)]
    heads: usize,

    /// Jumping knowledge mode
    #[arg(long, value_enum, default_value_t = JumpingKnowledge::Last)]
    jk: JumpingKnowledge,

    /// Input batch size for training
    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Number of epochs to train
    #[arg(long, default_value_t = 1)]
    max_epochs: usize,

    /// Learning rate
    #[arg(long, default_value_t = 1e-3)]
    lr: f64,

    /// Stop when the validation loss stops improving
    #[arg(long)]
    early_stopping: bool,

    /// Type of hardware accelerator
    #[arg(long, default_value = "cpu")]
    accelerator: String,

    /// List of devices to use for acceleration
    #[arg(long, num_args = 1..)]
    devices: Option<Vec<usize>>,

    /// Seed for random number generators
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Root path from where every run path is derived
    #[arg(long, default_value = DEFAULT_EXPERIMENTS_ROOT)]
    experiments_root: String,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            batch_size: self.batch_size,
            max_epochs: self.max_epochs,
            lr: self.lr,
            early_stopping: self.early_stopping,
            accelerator: self.accelerator.clone(),
            devices: self.devices.clone(),
            seed: self.seed,
        }
    }

    fn model_source(&self) -> ModelSource {
        match &self.load_model {
            Some(name) => ModelSource::Load(name.clone()),
            None => ModelSource::Fresh(GatConfig::for_run(
                self.hidden_channels,
                self.num_layers,
                self.dropout,
                self.heads,
                self.jk,
            )),
        }
    }
}

fn select_device(run: &RunConfig) -> Result<NdArrayDevice> {
    match run.accelerator.as_str() {
        "cpu" => {
            if let Some(devices) = &run.devices {
                info!("Device list {:?} is forwarded as-is on cpu", devices);
            }
            Ok(NdArrayDevice::Cpu)
        }
        other => Err(PipelineError::UnsupportedAccelerator {
            requested: other.to_string(),
            supported: "cpu".to_string(),
        }
        .into()),
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let run = cli.run_config();
    run.validate();
    let paths = RunPaths::new(&cli.experiments_root, &cli.name);
    let data = CombustionDataModule::new(DataModuleConfig::default(), run.batch_size, run.seed);
    let device = select_device(&run)?;

    if let Some(load) = &cli.load_model {
        let runs = checkpoint::list_runs(paths.experiments_path())?;
        if !runs.iter().any(|name| name == load) {
            return Err(PipelineError::RunNotFound {
                name: load.clone(),
                experiments: paths.experiments_path().to_path_buf(),
            }
            .into());
        }
    }

    info!("Training model: {}", paths.name());
    let results = execute::<Backend>(cli.model_source(), &run, &paths, &data, &device)?;
    info!("Final metrics: {:?}", results);

    Ok(())
}
