pub mod analysis;
pub mod catalogue;
pub mod classifier;
pub mod config;
pub mod error;
pub mod feedback;
pub mod flexibility;
pub mod geometry;
pub mod knowledge;
pub mod metrics;
pub mod pose;
pub mod validation;

pub use analysis::{AnalysisReport, Analyzer};
pub use error::{AnalysisError, CatalogueError};
