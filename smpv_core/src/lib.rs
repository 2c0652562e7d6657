//! Core library for the SMP results viewer.
//!
//! Reads turn-by-turn bargaining results out of an SMP SQLite database and
//! turns them into two views: a stacked bar chart of effective power by
//! position bucket and a force-directed graph of actors and bargains.
//! [`AppState`] ties the two together for a single scenario/dimension.

pub mod binning;
pub mod chart;
pub mod config;
mod error;
pub mod graph;
pub mod layout;
pub mod sample;
pub mod snapshot;
pub mod stack;
mod state;
pub mod store;
pub mod svg;

pub use binning::{bucket_index, ActorPower, BinnedTurn, ChartKey, PowerHistory};
pub use chart::{BarChart, ChartMode, HoverTarget, LegendEntry};
pub use config::{
    load_viewer_config_from_env, ChartConfig, GraphConfig, Margin, ViewerConfig,
    ViewerConfigError, ViewerConfigMetadata,
};
pub use error::{Result, SmpvError};
pub use graph::{GraphLifecycle, GraphNode, GraphRenderer, PlacedLink, PlacedNode};
pub use layout::{ForceLayout, LayoutConfig};
pub use sample::{write_sample, SampleSpec, SampleStats};
pub use snapshot::{LinkParams, SimulationData, TurnSnapshot};
pub use stack::{stack, stack_totals};
pub use state::{AppState, ChartKind, TurnSummary};
pub use store::{SmpStore, ViewScope};
