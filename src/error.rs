use thiserror::Error;

use crate::graph::NodeId;

#[derive(Debug, Error)]
pub enum SirenError {
    /// The platform could not provide an audio context.
    #[error("audio context unavailable: {0}")]
    ContextUnavailable(String),

    /// A node operation that the node's lifecycle forbids (restart, double stop).
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("node {0:?} cannot connect to itself or to a node that has no input")]
    InvalidConnection(NodeId),

    #[error("graph contains a cycle that does not pass through a delay node")]
    CycleWithoutDelay,

    /// Exponential ramps are undefined for zero or non-finite endpoints.
    #[error("invalid exponential ramp endpoint {0}")]
    InvalidRampEndpoint(f64),

    #[error("missing control '{0}'")]
    MissingControl(String),

    #[error("unknown pad '{0}'")]
    UnknownPad(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
}
