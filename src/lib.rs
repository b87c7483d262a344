// THEORY:
// This file is the main entry point for the `coloc_vision` library crate. It defines
// the public API exposed to external consumers such as batch runners, result writers
// and image viewers.
//
// The primary goal is to export `TransductionPipeline` and its associated data
// structures (`TransductionConfig`, `TransductionResult`, the report rows) as the
// high-level interface to the engine, with `BatchProcessor` for running many images
// at once. The individual stages in `core_modules` stay public so that callers can
// reuse a single stage (a threshold, the watershed, the cell extractor) on its own.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod report;

pub use config::{CellDiameterRange, PreprocessingParameters, TransductionConfig};
pub use core_modules::cell::{Cell, Point};
pub use core_modules::cell_analysis::ChannelCellAnalysis;
pub use core_modules::channel_image::{ChannelStack, MultiChannelImage};
pub use core_modules::colocalizer::OverlapRule;
pub use core_modules::threshold::{ThresholdAlgorithm, ThresholdLocality};
pub use error::{ColocError, Result};
pub use parallel_pipeline::{BatchItem, BatchProcessor, BatchReport};
pub use pipeline::{TransductionPipeline, TransductionResult};
