#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod builder;
pub mod cache_maps;
pub mod config;
pub mod error;
pub mod models;
pub mod partition;
pub mod scanning;
pub mod tools;
pub mod versioning;

pub use builder::{BuildContext, BuildReport, OfflineBuilder, write_emitted_files};
pub use config::{OfflineConfig, Options};
pub use error::{OfflineError, OfflineResult, Warnings};
pub use models::{BuildAsset, CacheKey, CacheSections, CacheSpec, EmittedFile, Section};
pub use partition::{Partition, Partitioner};
