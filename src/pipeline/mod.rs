// Columnar read, filter/derive and the incremental batch driver

pub mod driver;
pub mod schema;
pub mod transform;

pub use driver::{BatchReport, FileOutcome, Phase, PipelineDriver, RunReport};
pub use transform::{ParquetTransformer, TransformOutput, TransformStats};
