//! Terminal rendering for Sigscope
//!
//! Draws the backend-agnostic [`ChartSpec`](sigscope_core::domain::chart::ChartSpec)
//! descriptions with ratatui and composes them into the live and comparison views.

pub mod chart;
pub mod views;

pub use chart::render_chart;
pub use views::{ComparisonView, LiveView};
