use crate::{
    frame::{Addressing, DecodeError, EncodeError, FrameType},
    tof::RangingError,
    util::TimeoutError,
};

/// An error that can occur during discovery or ranging
///
/// Apart from [`Error::Init`] and [`Error::InvalidConfiguration`], every error
/// ends the current attempt and sends the device back to discovery.
#[derive(Debug)]
pub enum Error<E> {
    /// Error reported by the transceiver driver
    Driver(E),

    /// The transceiver could not be initialized
    Init(E),

    /// The radio configuration was not valid. Some combinations of settings are
    /// not allowed.
    InvalidConfiguration,

    /// A transmission could not be issued
    ///
    /// For delayed transmissions, this typically means the scheduled time had
    /// already passed.
    TxFailure(E),

    /// No frame was received in time
    Timeout,

    /// Receiver CRC or PHY header error
    Frame,

    /// A frame was received, but could not be decoded
    Decode(DecodeError),

    /// A frame could not be encoded
    Encode(EncodeError),

    /// A well-formed frame that doesn't fit the current state
    UnexpectedFrame {
        /// The frame type the state machine was waiting for
        expected: FrameType,
        /// The frame type that arrived
        found: FrameType,
    },

    /// A frame of the expected type, but for another network or peer
    Misaddressed(Addressing),

    /// The time-of-flight computation failed
    Ranging(RangingError),
}

impl<E> Error<E> {
    /// Whether falling back to discovery and trying again makes sense
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Init(_) | Error::InvalidConfiguration)
    }
}

impl<E> From<DecodeError> for Error<E> {
    fn from(error: DecodeError) -> Self {
        Error::Decode(error)
    }
}

impl<E> From<EncodeError> for Error<E> {
    fn from(error: EncodeError) -> Self {
        Error::Encode(error)
    }
}

impl<E> From<RangingError> for Error<E> {
    fn from(error: RangingError) -> Self {
        Error::Ranging(error)
    }
}

impl<E> From<TimeoutError<Error<E>>> for Error<E> {
    fn from(error: TimeoutError<Error<E>>) -> Self {
        match error {
            TimeoutError::Timeout => Error::Timeout,
            TimeoutError::Other(error) => error,
        }
    }
}
