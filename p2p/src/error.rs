use thiserror::Error;

/// Failures in one peer interaction.
///
/// Transport and framing errors are local to the interaction: they adjust
/// the peer's score and close the stream, never more.
#[derive(Debug, Error)]
pub enum Error {
    // Transport
    #[error("connection broke mid-interaction")]
    BrokenConnection,
    #[error("stream was not opened within the timeout")]
    StreamOpenTimeout,
    #[error("first response byte did not arrive within the timeout")]
    TimeToFirstByteExceeded,
    #[error("response was not read fully within the timeout")]
    ReadResponseTimeout,
    #[error("stream ended before a full message was read")]
    UnexpectedEof,
    /// Streams end normally between chunks. Readers that are between
    /// messages report EOF through this variant so callers can treat it as
    /// the end of a response rather than a fault.
    #[error("stream ended between messages")]
    PotentiallyExpectedEof,

    // Framing
    #[error("response code {code} is not recognized")]
    InvalidResponseCode { code: u8 },
    #[error("payload is not valid snappy data")]
    InvalidSnappyBytes,
    #[error("payload is not valid SSZ")]
    InvalidSszBytes,
    #[error("length prefix is zero")]
    ZeroSizePrefix,
    #[error("length prefix {length} exceeds the maximum chunk size {maximum}")]
    SizePrefixOverflow { length: u64, maximum: u64 },
    #[error("context bytes do not match any known fork digest")]
    InvalidContextBytes,

    // Application
    #[error("peer responded with error code {code:?}: {message}")]
    ReceivedErrorResponse {
        code: crate::codec::ResponseCode,
        message: String,
    },
    #[error("request is invalid")]
    InvalidInputs,
    #[error("requested resource is unavailable")]
    ResourceUnavailable,
}
