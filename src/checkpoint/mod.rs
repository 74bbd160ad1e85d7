mod record;

pub use record::{
    list_runs, load_model, save_model, write_results, MODEL_CONFIG_FILENAME, MODEL_WEIGHTS_STEM,
    RESULTS_FILENAME,
};
