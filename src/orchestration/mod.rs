pub mod region_pipeline;

pub use region_pipeline::{PipelineComponents, RegionPipeline};
