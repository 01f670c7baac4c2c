pub mod config;
pub mod error;
pub mod sector;
pub mod tables;
pub mod traits;
pub mod types;

pub use config::PipelineConfig;
pub use error::*;
pub use sector::SectorClassifier;
pub use tables::{ReferenceTables, ScoreBand, SectorPattern, SectorProfile};
pub use traits::*;
pub use types::*;
