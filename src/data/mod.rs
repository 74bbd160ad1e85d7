pub mod grid;
mod loader;

pub use grid::{grid_edges, neighbor_lists, GridShape};
pub use loader::{
    CombustionDataModule, CombustionLoader, DataLoader, DataModuleConfig, GraphBatch,
};
