use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("registration error: {0}")]
    Registration(String),

    #[error("no route from {from} to {to}")]
    NoRoute { from: String, to: String },

    #[error("router {0} did not answer the liveness probe")]
    LivenessTimeout(String),

    #[error("negative cycle detected, path computation aborted")]
    NegativeCycle,

    #[error("dijkstra requires positive weights, link {from}-{to} has weight {weight}")]
    NonPositiveWeight { from: String, to: String, weight: f64 },

    #[error("unknown router: {0}")]
    UnknownRouter(String),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),

    #[error("payload failed authentication")]
    Decrypt,

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
