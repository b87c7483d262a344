// THEORY:
// The `report` module defines the rows a results writer emits for each image. It
// does not format or write anything: every row is a plain `Serialize` struct whose
// field names are the column headers, so a CSV, JSON or table writer can render it
// without knowing anything about the engine.
//
// Key architectural principles:
// 1.  **Four Sheets**: Documentation (static), Summary (one row per image),
//     Transduced Cell Analysis (one row per transduced cell) and Parameters (one row
//     per image, echoing the configuration that produced it).
// 2.  **Integer Averages**: Summary averages are integer means over the transduced
//     cells, and 0 when an image has none.

use crate::config::TransductionConfig;
use crate::core_modules::cell_analysis::ChannelCellAnalysis;
use crate::pipeline::TransductionResult;
use serde::Serialize;

/// One line of the documentation sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentationRow {
    #[serde(rename = "Abbreviation")]
    pub abbreviation: &'static str,
    #[serde(rename = "Description")]
    pub description: &'static str,
}

pub const DOCUMENTATION_ROWS: [DocumentationRow; 3] = [
    DocumentationRow {
        abbreviation: "Summary",
        description: "Key overall measurements per image",
    },
    DocumentationRow {
        abbreviation: "Transduced Cell Analysis",
        description: "Cell-by-cell metrics of transduced cells",
    },
    DocumentationRow {
        abbreviation: "Parameters",
        description: "Parameters used for the analysis",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "File Name")]
    pub file_name: String,
    #[serde(rename = "Number of Cells")]
    pub number_of_cells: usize,
    #[serde(rename = "Number of Transduced Cells")]
    pub number_of_transduced_cells: usize,
    #[serde(rename = "Transduction Efficiency (%)")]
    pub transduction_efficiency: f64,
    #[serde(rename = "Average Morphology Area (pixel^2)")]
    pub average_morphology_area: u64,
    #[serde(rename = "Mean Fluorescence Intensity (a.u.)")]
    pub mean_fluorescence_intensity: u64,
    #[serde(rename = "Median Fluorescence Intensity (a.u.)")]
    pub median_fluorescence_intensity: u64,
    #[serde(rename = "Min Fluorescence Intensity (a.u.)")]
    pub min_fluorescence_intensity: u64,
    #[serde(rename = "Max Fluorescence Intensity (a.u.)")]
    pub max_fluorescence_intensity: u64,
    #[serde(rename = "RawIntDen")]
    pub raw_integrated_density: u64,
}

impl SummaryRow {
    pub fn from_result(result: &TransductionResult) -> Self {
        let analyses = result.overlapping_analyses();
        let average = |field: fn(&ChannelCellAnalysis) -> u64| -> u64 {
            if analyses.is_empty() {
                return 0;
            }
            analyses.iter().map(field).sum::<u64>() / analyses.len() as u64
        };

        Self {
            file_name: result.file_name().to_string(),
            number_of_cells: result.target_cell_count(),
            number_of_transduced_cells: result.overlapping_cells().len(),
            transduction_efficiency: result.transduction_efficiency(),
            average_morphology_area: average(|a| a.area as u64),
            mean_fluorescence_intensity: average(|a| a.mean as u64),
            median_fluorescence_intensity: average(|a| a.median as u64),
            min_fluorescence_intensity: average(|a| a.min as u64),
            max_fluorescence_intensity: average(|a| a.max as u64),
            raw_integrated_density: average(|a| a.raw_integrated_density),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellAnalysisRow {
    #[serde(rename = "File Name")]
    pub file_name: String,
    /// 1-based position of the cell among the transduced cells of its image.
    #[serde(rename = "Transduced Cell")]
    pub cell_number: usize,
    #[serde(rename = "Morphology Area (pixel^2)")]
    pub area: u32,
    #[serde(rename = "Mean Fluorescence Intensity (a.u.)")]
    pub mean: u32,
    #[serde(rename = "Median Fluorescence Intensity (a.u.)")]
    pub median: u32,
    #[serde(rename = "Min Fluorescence Intensity (a.u.)")]
    pub min: u32,
    #[serde(rename = "Max Fluorescence Intensity (a.u.)")]
    pub max: u32,
    #[serde(rename = "RawIntDen")]
    pub raw_integrated_density: u64,
}

impl CellAnalysisRow {
    pub fn rows_for(result: &TransductionResult) -> Vec<Self> {
        result
            .overlapping_analyses()
            .iter()
            .enumerate()
            .map(|(i, analysis)| Self {
                file_name: result.file_name().to_string(),
                cell_number: i + 1,
                area: analysis.area,
                mean: analysis.mean,
                median: analysis.median,
                min: analysis.min,
                max: analysis.max,
                raw_integrated_density: analysis.raw_integrated_density,
            })
            .collect()
    }
}

/// The configuration an image was analysed with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParametersRecord {
    #[serde(rename = "File Name")]
    pub file_name: String,
    #[serde(rename = "Plugin")]
    pub plugin_name: &'static str,
    #[serde(rename = "Plugin Version")]
    pub plugin_version: &'static str,
    #[serde(rename = "Morphology channel")]
    pub morphology_channel: usize,
    #[serde(rename = "Transduction channel")]
    pub transduction_channel: usize,
    #[serde(rename = "Cell diameter range (px)")]
    pub cell_diameter_range: String,
    #[serde(rename = "Local threshold radius")]
    pub local_threshold_radius: u32,
    #[serde(rename = "Gaussian blur sigma")]
    pub gaussian_blur_sigma: f64,
}

impl ParametersRecord {
    pub fn new(file_name: impl Into<String>, config: &TransductionConfig) -> Self {
        let preprocessing = config.resolved_preprocessing();
        Self {
            file_name: file_name.into(),
            plugin_name: env!("CARGO_PKG_NAME"),
            plugin_version: env!("CARGO_PKG_VERSION"),
            morphology_channel: config.target_channel,
            transduction_channel: config.transduced_channel,
            cell_diameter_range: config.cell_diameter_range.to_string(),
            local_threshold_radius: preprocessing.local_threshold_radius,
            gaussian_blur_sigma: preprocessing.gaussian_blur_sigma,
        }
    }
}
