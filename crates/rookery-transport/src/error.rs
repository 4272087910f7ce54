/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Opening an outbound connection failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The peer sent more than `max` bytes without a frame delimiter.
    #[error("frame exceeds {max} bytes ({len} buffered)")]
    FrameTooLong { len: usize, max: usize },

    /// A frame handed to the encoder cannot be put on the wire as-is.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
