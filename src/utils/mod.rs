pub mod image_ops;
pub mod metrics;

pub use image_ops::{crop_region_async, encode_png, load_image_from_memory_async};
pub use metrics::{Metrics, MetricsSnapshot};
