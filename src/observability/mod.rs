pub mod logging;
pub mod metrics;

pub use logging::{init_logging, mask_sensitive, LogConfig, LogFormat};
pub use metrics::init_metrics;
