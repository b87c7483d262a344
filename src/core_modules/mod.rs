pub mod background;
pub mod cell;
pub mod cell_analysis;
pub mod cell_extractor;
pub mod channel_image;
pub mod colocalizer;
pub mod preprocessor;
pub mod rank_window;
pub mod threshold;
pub mod utils;
pub mod watershed;
