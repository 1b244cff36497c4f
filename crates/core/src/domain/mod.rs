//! Domain entities and business rules

pub mod analysis;
pub mod backend;
pub mod chart;
pub mod config;
pub mod effects;
pub mod graph;
pub mod playback;
pub mod sampling;
pub mod session;
pub mod visualization;

// Re-export specific items to avoid ambiguous `Result` aliases
pub use analysis::{
    estimate_dominant_frequency, normalize_time_domain, AnalysisConfig, Analyser, Magnitude,
    SampleTap, SharedAnalyser,
};
pub use backend::{
    file_id_from_url, BackendClient, BackendError, ProgressEvent, ProgressSender, ProgressStream,
    ProgressTracker, SubmitOutcome, SubmitReply, SubmitRequest, Transport,
};
pub use chart::{ChartSpec, Rgb, Series, SeriesStyle};
pub use config::{AppConfig, BackendConfig, ConfigError, ConfigManager, SigscopeConfig};
pub use effects::{
    parse_time_input, EffectChain, EffectId, EffectSpec, EffectType, FieldValue, ValidationError,
    WireEffect,
};
pub use graph::{
    AudioContext, AudioGraphController, AudioGraphHandle, AudioHost, ContextState, GraphError,
    MediaElement, SourceNode,
};
pub use playback::LivePlayer;
pub use sampling::{LiveAudioSample, SamplingLoop};
pub use session::{Session, SessionError};
pub use visualization::{EffectResult, VisualizationFrame};
