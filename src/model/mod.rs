pub mod conv;
pub mod gat;

pub use conv::Gatv2Conv;
pub use gat::{build_stages, Gat2Model};
