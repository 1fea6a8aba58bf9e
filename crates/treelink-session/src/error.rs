/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] treelink_transport::TransportError),

    /// A command could not be encoded or sent.
    #[error("command failed: {0}")]
    Command(#[from] treelink_frame::CommandError),

    /// An inbound message could not be decoded.
    #[error("frame error: {0}")]
    Frame(#[from] treelink_frame::FrameError),

    /// A tree lookup failed or a received tree was rejected.
    #[error("tree error: {0}")]
    Tree(#[from] treelink_tree::TreeError),

    /// The instrument's tree does not start with the bootstrap fields.
    #[error("tree is not bootstrap compatible: {0}")]
    BootstrapMismatch(String),

    /// No full tree arrived in time.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, SessionError>;
