use thiserror::Error;

pub type MusicResult<T> = Result<T, MusicError>;

/// Errors that cross the HTTP boundary or abort a search pass.
///
/// Every variant serializes at the API edge as
/// `{"result": "error", "message": ...}` with status 400.
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("{0}")]
    MalformedRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Undefined 'sampleType' property in the session definition. Valid values are: 'f32le', 's16le'")]
    InvalidSampleType,

    #[error("Sample payload of {length} bytes is not a multiple of the {width}-byte sample width")]
    MalformedSamples { length: usize, width: usize },

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Error! HTTP {method} method not implemented for {view}")]
    MethodNotAllowed { method: String, view: String },
}
