// THEORY:
// The `pipeline` module is the top-level API of the engine. It wires the stages
// together for one multi-channel image: preprocess and segment the morphology
// channel into cells, preprocess the transduction channel into a mask, decide which
// cells are transduced, and package the answer.
//
// Key architectural principles:
// 1.  **Validate, then Read**: Both channel indices are checked before a single
//     sample is touched. A bad channel aborts the image with `ChannelNotFound` and
//     nothing else happens.
// 2.  **Stateless per Image**: `TransductionPipeline` holds configuration only. Every
//     intermediate buffer is created for one image and dropped afterwards, so a single
//     pipeline can be shared across threads (`Send + Sync`).
// 3.  **Assembly Without Computation**: `ResultAssembler` only packages what the
//     matcher produced. The result is immutable once built.

use crate::config::TransductionConfig;
use crate::core_modules::cell::Cell;
use crate::core_modules::cell_analysis::ChannelCellAnalysis;
use crate::core_modules::cell_extractor::cell_extractor;
use crate::core_modules::channel_image::{MultiChannelImage, extract_gray8, validate_channel};
use crate::core_modules::colocalizer::{ColocalizationMatcher, ColocalizationOutcome, transduction_efficiency};
use crate::core_modules::preprocessor::ImagePreprocessor;
use crate::core_modules::watershed::Segmenter;
use crate::error::Result;
use tracing::{debug, info};

/// The complete answer for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct TransductionResult {
    file_name: String,
    target_cell_count: usize,
    overlapping_cells: Vec<Cell>,
    /// `overlapping_analyses[i]` measures `overlapping_cells[i]` in the transduction channel.
    overlapping_analyses: Vec<ChannelCellAnalysis>,
}

impl TransductionResult {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Number of cells found in the morphology channel.
    pub fn target_cell_count(&self) -> usize {
        self.target_cell_count
    }

    pub fn overlapping_cells(&self) -> &[Cell] {
        &self.overlapping_cells
    }

    pub fn overlapping_analyses(&self) -> &[ChannelCellAnalysis] {
        &self.overlapping_analyses
    }

    /// Overlapping cells as a percentage of target cells; 0 when nothing was found.
    pub fn transduction_efficiency(&self) -> f64 {
        transduction_efficiency(self.overlapping_cells.len(), self.target_cell_count)
    }
}

/// Packages matcher output into a `TransductionResult`.
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(file_name: impl Into<String>, outcome: ColocalizationOutcome) -> TransductionResult {
        TransductionResult {
            file_name: file_name.into(),
            target_cell_count: outcome.target_cell_count,
            overlapping_cells: outcome.overlapping_cells,
            overlapping_analyses: outcome.overlapping_analyses,
        }
    }
}

/// The main, top-level struct for the colocalization engine.
#[derive(Debug, Clone)]
pub struct TransductionPipeline {
    config: TransductionConfig,
    preprocessor: ImagePreprocessor,
    segmenter: Segmenter,
    matcher: ColocalizationMatcher,
}

impl TransductionPipeline {
    pub fn new(config: TransductionConfig) -> Result<Self> {
        config.validate()?;
        let preprocessor = ImagePreprocessor::new(config.resolved_preprocessing())?;
        let matcher = ColocalizationMatcher::new(config.overlap_rule);
        Ok(Self {
            config,
            preprocessor,
            segmenter: Segmenter::default(),
            matcher,
        })
    }

    pub fn config(&self) -> &TransductionConfig {
        &self.config
    }

    /// Segments the morphology channel of `image` into cells.
    pub fn segment_channel<I: MultiChannelImage + ?Sized>(&self, image: &I, channel: usize) -> Result<Vec<Cell>> {
        let mut mask = extract_gray8(image, channel)?;
        self.preprocessor.preprocess(&mut mask);
        let summary = self.segmenter.segment(&mut mask);
        debug!(channel, basins = summary.basins, "Segmented channel");
        Ok(cell_extractor::extract_cells(&mask))
    }

    pub fn process<I: MultiChannelImage + ?Sized>(&self, image: &I, file_name: &str) -> Result<TransductionResult> {
        let target_channel = self.config.target_channel;
        let transduced_channel = self.config.transduced_channel;

        // --- 1. Validate ---
        validate_channel(image, target_channel)?;
        validate_channel(image, transduced_channel)?;

        // --- 2. Morphology channel ---
        let target_cells = self.segment_channel(image, target_channel)?;

        // --- 3. Transduction channel ---
        let transduction_image = extract_gray8(image, transduced_channel)?;
        let mut transduction_mask = transduction_image.clone();
        self.preprocessor.preprocess(&mut transduction_mask);

        // --- 4. Match ---
        let outcome = self
            .matcher
            .match_cells(&target_cells, &transduction_mask, &transduction_image);
        let result = ResultAssembler::assemble(file_name, outcome);

        info!(
            file_name,
            target_cells = result.target_cell_count(),
            transduced_cells = result.overlapping_cells().len(),
            efficiency = result.transduction_efficiency(),
            "Processed image"
        );
        Ok(result)
    }
}
