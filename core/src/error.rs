use miette::Diagnostic;
use ndarray::ShapeError;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Index {index} is out of range for an axis of {count} values")]
    #[diagnostic(code(stack_tbx::axis::out_of_range))]
    OutOfRange { index: usize, count: usize },

    #[error("Invalid settings: {0}")]
    #[diagnostic(code(stack_tbx::invalid_settings))]
    InvalidSettings(String),

    #[error("Profile '{key}' has zero length")]
    #[diagnostic(
        code(stack_tbx::profile::degenerate),
        help("A profile needs at least two distinct knobs")
    )]
    DegenerateProfile { key: String },

    #[error("Frame {index} does not share the guiding grid of frame 0")]
    #[diagnostic(
        code(stack_tbx::grid_mismatch),
        help("Align the frames onto a common grid or request a resize")
    )]
    GridMismatch { index: usize },

    #[error("No samples of ROI '{roi}' in frame {frame}")]
    #[diagnostic(code(stack_tbx::statistics::empty_sample))]
    EmptySample { roi: String, frame: usize },

    #[error("Unit of work {index} failed: {source}")]
    #[diagnostic(code(stack_tbx::runner::task_failure))]
    TaskFailure {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Got {frames} frames for a depth axis of {depth} values")]
    #[diagnostic(code(stack_tbx::stack::frame_count))]
    FrameCountMismatch { frames: usize, depth: usize },

    #[error("Batch was cancelled")]
    #[diagnostic(code(stack_tbx::runner::cancelled))]
    Cancelled,

    #[error("Unit of work panicked: {0}")]
    #[diagnostic(code(stack_tbx::runner::panicked))]
    Panicked(String),

    #[error("Reordering data resulted in shape error: {0}")]
    #[diagnostic(code(stack_tbx::shape))]
    Shape(#[from] ShapeError),
}

impl Error {
    pub fn invalid_settings(msg: impl Into<String>) -> Self {
        Self::InvalidSettings(msg.into())
    }

    /// Follows nested [`Error::TaskFailure`]s down to the error that started it.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::TaskFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
