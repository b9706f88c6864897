#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod decide;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod scorer;
#[path = "../shared/config.rs"]
pub mod shared_config;
#[path = "../shared/files.rs"]
pub mod shared_files;
pub mod types;
pub mod shared {
    pub use super::shared_config as config;
    pub use super::shared_files as files;
}

#[path = "../summarize/mod.rs"]
pub mod summarize;

#[path = "../stats/mod.rs"]
pub mod stats;
