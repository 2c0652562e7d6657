use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_VIEWER_CONFIG: &str = include_str!("data/viewer_config.json");

/// Presentation parameters for the bar chart and the bargaining graph.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub chart: ChartConfig,
    pub graph: GraphConfig,
}

impl ViewerConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_VIEWER_CONFIG)
                .expect("builtin viewer config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ViewerConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ViewerConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        let config = ViewerConfig::from_json_str(&contents)?;
        Ok(config)
    }
}

#[derive(Debug, Error)]
pub enum ViewerConfigError {
    #[error("failed to parse viewer config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read viewer config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Default for Margin {
    fn default() -> Self {
        Self {
            top: 30.0,
            right: 20.0,
            bottom: 30.0,
            left: 50.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    /// Outer SVG width including margins.
    pub width: f64,
    /// Outer SVG height including margins.
    pub height: f64,
    pub margin: Margin,
    pub bar_inset: f64,
    pub bar_gap: f64,
    pub transition_ms: u32,
    pub highlight_ms: u32,
    pub dimmed_opacity: f64,
    pub inactive_fill: String,
    pub legend_columns: usize,
    pub legend_column_width: f64,
    pub legend_row_height: f64,
    pub legend_top: f64,
    pub y_ticks: usize,
}

impl ChartConfig {
    pub fn inner_width(&self) -> f64 {
        (self.width - self.margin.left - self.margin.right).max(1.0)
    }

    pub fn inner_height(&self) -> f64 {
        (self.height - self.margin.top - self.margin.bottom).max(1.0)
    }
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 550.0,
            height: 300.0,
            margin: Margin::default(),
            bar_inset: 2.5,
            bar_gap: 4.0,
            transition_ms: 3000,
            highlight_ms: 50,
            dimmed_opacity: 0.2,
            inactive_fill: "#F1F1F2".to_string(),
            legend_columns: 3,
            legend_column_width: 85.0,
            legend_row_height: 20.0,
            legend_top: 30.0,
            y_ticks: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub width: f64,
    pub height: f64,
    /// Many-body strength; negative values repel.
    pub charge_strength: f64,
    pub link_strength: f64,
    pub link_distance: f64,
    /// Power at which the node hue saturates to red.
    pub power_reference: f64,
    pub bargain_radius: f64,
    /// Upper bound (exclusive) of the random radius added to actor nodes.
    pub radius_jitter: f64,
    pub velocity_decay: f64,
    pub alpha_min: f64,
    /// Number of ticks for alpha to decay from 1 to `alpha_min`.
    pub alpha_ticks: u32,
    pub label_font_size: f64,
    pub seed: u64,
}

impl GraphConfig {
    pub fn alpha_decay(&self) -> f64 {
        let ticks = self.alpha_ticks.max(1) as f64;
        1.0 - self.alpha_min.clamp(f64::MIN_POSITIVE, 1.0).powf(1.0 / ticks)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 600.0,
            charge_strength: -120.0,
            link_strength: 2.0,
            link_distance: 50.0,
            power_reference: 50.0,
            bargain_radius: 3.0,
            radius_jitter: 10.0,
            velocity_decay: 0.4,
            alpha_min: 0.001,
            alpha_ticks: 300,
            label_font_size: 15.0,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewerConfigMetadata {
    path: Option<PathBuf>,
}

impl ViewerConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_viewer_config_from_env() -> (Arc<ViewerConfig>, ViewerConfigMetadata) {
    let override_path = env::var("SMPV_CONFIG_PATH").ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/viewer_config.json");

    let candidates: Vec<PathBuf> = match override_path {
        Some(ref path) => vec![path.clone()],
        None => vec![default_path.clone()],
    };

    for path in candidates {
        match ViewerConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "smpv::config",
                    path = %path.display(),
                    "viewer_config.loaded=file"
                );
                return (Arc::new(config), ViewerConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "smpv::config",
                    path = %path.display(),
                    error = %err,
                    "viewer_config.load_failed"
                );
            }
        }
    }

    let config = ViewerConfig::builtin();
    tracing::info!(target: "smpv::config", "viewer_config.loaded=builtin");
    (config, ViewerConfigMetadata::new(None))
}
