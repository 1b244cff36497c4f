//! Sigscope core: effect chain model, live analysis, chart construction,
//! and the processing backend contract.

pub mod domain;

pub use domain::*;
