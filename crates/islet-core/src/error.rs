/// Coarse classification of an [`Error`].
///
/// Every variant of `Error` belongs to exactly one kind. None of them are
/// retried: the kind only tells the caller whose contract was broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller or a kernel broke an API contract (bad index, wrong type,
    /// unsupported access mode, reshape request...).
    Usage,
    /// The island handed to the executor is malformed and no execution script
    /// can be built for it.
    Structural,
    /// The device runtime failed while executing or mapping memory.
    Device,
}

/// All errors that can occur within islet.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The executable was asked to reshape; its script is fixed at construction.
    #[error("{backend} executables cannot be reshaped")]
    ReshapeUnsupported { backend: &'static str },

    /// A mapping was requested with an access mode other than read or write.
    #[error("unsupported access mode {mode}: a mapping is either read or write")]
    UnsupportedAccess { mode: &'static str },

    /// The buffer already has a live mapping that conflicts with the request.
    #[error("buffer {buffer} is already mapped for {held}")]
    MappingConflict { buffer: u64, held: &'static str },

    /// A typed accessor found a value of a different type.
    #[error("{what} {index}: expected {expected}, found {found}")]
    TypeMismatch {
        what: &'static str,
        index: usize,
        expected: String,
        found: String,
    },

    /// A positional operand or output index is past the end.
    #[error("{what} index {index} out of range ({len} declared)")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// A kernel unit was invoked without a callback.
    #[error("kernel '{0}' has no callback set")]
    UnsetKernel(String),

    /// A buffer does not have the (rows, cols, channels) shape a descriptor needs.
    #[error("unsupported buffer shape {dims:?}: {reason}")]
    Dimensionality { dims: Vec<usize>, reason: String },

    /// An external input data node was not bound by the caller.
    #[error("external input '{0}' was not bound")]
    UnboundInput(String),

    /// A run argument refers to a node it cannot be bound to.
    #[error("cannot bind node {node}: {reason}")]
    BadBinding { node: usize, reason: String },

    /// A kernel produced an output that does not match the expected metadata.
    #[error("output '{name}' does not match its metadata: expected {expected}, got {got}")]
    MetaMismatch {
        name: String,
        expected: String,
        got: String,
    },

    /// The island's operations form a cycle.
    #[error("island is not acyclic: cycle through operation '{0}'")]
    Cycle(String),

    /// A node references another node outside the island node list.
    #[error("node '{node}' references node {target} outside the island")]
    DanglingNode { node: String, target: usize },

    /// Producer structure is invalid (two producers, missing producer...).
    #[error("data node '{node}': {reason}")]
    Producer { node: String, reason: String },

    /// Failure reported by the device runtime.
    #[error("device error: {0}")]
    Device(String),

    /// A step of the execution script failed.
    #[error("step {index} ('{op}') failed: {source}")]
    Step {
        index: usize,
        op: String,
        #[source]
        source: Box<Error>,
    },

    /// Generic message for usage errors not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create a usage error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Create a device error from any string message.
    pub fn device(s: impl Into<String>) -> Self {
        Error::Device(s.into())
    }

    /// Wrap this error with the script step that raised it.
    pub fn at_step(self, index: usize, op: impl Into<String>) -> Self {
        Error::Step {
            index,
            op: op.into(),
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Cycle(_) | Error::DanglingNode { .. } | Error::Producer { .. } => {
                ErrorKind::Structural
            }
            Error::Device(_) => ErrorKind::Device,
            Error::Step { source, .. } => source.kind(),
            _ => ErrorKind::Usage,
        }
    }

    /// The innermost error, looking through [`Error::Step`] wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Convenience Result type used throughout islet.
pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted usage error.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
