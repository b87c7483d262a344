// This file is an example of how to use the `coloc_vision` library.
// The main library entry point is `src/lib.rs`.
//
// Usage: coloc_vision [--config cfg.json] [--overlay out_dir] <IMAGES>...
//
// Every image is analysed on the worker pool, and the report rows are printed to
// stdout as JSON lines tagged with the sheet they belong to.

use clap::Parser;
use coloc_vision::core_modules::channel_image::extract_gray8;
use coloc_vision::core_modules::utils::image_helper::image_helper;
use coloc_vision::report::{CellAnalysisRow, DOCUMENTATION_ROWS, ParametersRecord, SummaryRow};
use coloc_vision::{BatchItem, BatchProcessor, ChannelStack, ColocError, TransductionConfig};
use image::{DynamicImage, GrayImage, Rgba};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};

const OVERLAY_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

#[derive(Parser, Debug)]
#[command(name = "coloc_vision")]
#[command(about = "Count morphology cells and transduced cells in multi-channel microscopy images")]
#[command(version)]
struct Cli {
    /// JSON configuration file. Defaults apply to anything it leaves out.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for PNG overlays outlining the transduced cells.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Images to analyse.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

fn load_config(path: Option<&Path>) -> Result<TransductionConfig, ColocError> {
    let Some(path) = path else {
        return Ok(TransductionConfig::default());
    };
    let text = std::fs::read_to_string(path).map_err(|e| {
        ColocError::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        ColocError::InvalidConfiguration(format!("cannot parse {}: {e}", path.display()))
    })
}

fn emit<T: Serialize>(sheet: &str, row: &T) -> Result<(), ColocError> {
    let line = serde_json::json!({ "sheet": sheet, "row": serde_json::to_value(row)? });
    println!("{line}");
    Ok(())
}

/// Splits a decoded image into a batch item. With `overlay_channel` set, that
/// channel's 8-bit plane is returned alongside for drawing.
fn prepare_item(
    file_name: String,
    decoded: &DynamicImage,
    overlay_channel: Option<usize>,
) -> Result<(BatchItem, Option<GrayImage>), ColocError> {
    let image = ChannelStack::from_dynamic_image(decoded)?;
    let morphology = overlay_channel.and_then(|channel| extract_gray8(&image, channel).ok());
    Ok((BatchItem { file_name, image }, morphology))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[tokio::main]
async fn main() -> Result<(), ColocError> {
    init_logging();
    info!("Coloc Vision Engine - Example Runner");

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    config.validate()?;

    // --- 1. Load ---
    let mut items = Vec::with_capacity(cli.images.len());
    let mut morphology_planes: HashMap<String, GrayImage> = HashMap::new();
    let overlay_channel = cli.overlay.as_ref().map(|_| config.target_channel);
    for path in &cli.images {
        let decoded = match image::open(path) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!(path = %path.display(), %error, "Skipping unreadable image");
                continue;
            }
        };
        let (item, morphology) = match prepare_item(file_name_of(path), &decoded, overlay_channel) {
            Ok(prepared) => prepared,
            Err(error) => {
                warn!(path = %path.display(), %error, "Skipping malformed image");
                continue;
            }
        };
        if let Some(morphology) = morphology {
            morphology_planes.insert(item.file_name.clone(), morphology);
        }
        items.push(item);
    }

    // --- 2. Analyse ---
    let processor = BatchProcessor::new(config.clone())?;
    let report = processor.process_batch(items).await;

    // --- 3. Report ---
    for row in DOCUMENTATION_ROWS {
        emit("Documentation", &row)?;
    }
    for result in &report.results {
        emit("Summary", &SummaryRow::from_result(result))?;
        for row in CellAnalysisRow::rows_for(result) {
            emit("Transduced Cell Analysis", &row)?;
        }
        emit("Parameters", &ParametersRecord::new(result.file_name(), &config))?;
    }

    // --- 4. Overlays ---
    if let Some(dir) = &cli.overlay {
        std::fs::create_dir_all(dir).map_err(image::ImageError::IoError)?;
        for result in &report.results {
            let Some(morphology) = morphology_planes.get(result.file_name()) else {
                continue;
            };
            let canvas = image_helper::overlay_cells(morphology, result.overlapping_cells(), OVERLAY_COLOR);
            let stem = Path::new(result.file_name())
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| result.file_name().to_string());
            image_helper::save(dir.join(format!("{stem}_overlay.png")), &canvas)?;
        }
    }

    processor.shutdown().await;
    Ok(())
}
