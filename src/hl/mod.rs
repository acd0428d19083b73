//! High-level interface to the transceiver
//!
//! The protocol core never touches registers. It talks to the radio through
//! [`Transceiver`], the narrow interface a DW1000-class driver provides, and
//! wraps it in [`Radio`], which adds frame encoding, sequence numbers and the
//! receive buffer.
//!
//! Transmission and reception are asynchronous on the hardware side. [`Radio`]
//! exposes them like the driver's state types do: start the operation, then
//! call `wait_transmit`/`wait_receive`, which return an `nb::Result` that can
//! be polled, or wrapped in [`block_timeout!`](crate::block_timeout).

use core::{fmt, num::Wrapping};

use crate::{configs::RadioConfig, frame::FRAME_LEN_MAX, time::Instant, Config};

pub use error::*;
pub use receiving::*;
pub use sending::*;

mod error;
mod receiving;
mod sending;

/// How a transmission or reception is started
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StartMode {
    /// As fast as possible
    Immediate,
    /// At the time programmed with [`Transceiver::set_delayed_tx_time`]
    Delayed,
}

/// Event flags of the transceiver's status register
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Status {
    /// A frame with a good CRC has been received
    pub frame_good: bool,
    /// The receiver timed out waiting for a frame
    pub rx_timeout: bool,
    /// A PHY header or CRC error occured
    pub rx_error: bool,
    /// A frame has been sent
    pub tx_done: bool,
}

impl Status {
    /// Only `frame_good`
    pub const FRAME_GOOD: Status = Status {
        frame_good: true,
        rx_timeout: false,
        rx_error: false,
        tx_done: false,
    };

    /// Only `tx_done`
    pub const TX_DONE: Status = Status {
        frame_good: false,
        rx_timeout: false,
        rx_error: false,
        tx_done: true,
    };

    /// All receiver events
    pub const RX_ALL: Status = Status {
        frame_good: true,
        rx_timeout: true,
        rx_error: true,
        tx_done: false,
    };

    /// Every event
    pub const ALL: Status = Status {
        frame_good: true,
        rx_timeout: true,
        rx_error: true,
        tx_done: true,
    };
}

/// The transceiver driver interface the protocol is built on
///
/// Timing values are given in UWB microseconds (UUS) where the hardware takes
/// them that way, and as 40-bit [`Instant`]s for timestamps.
pub trait Transceiver {
    /// Error reported by the driver
    type Error: fmt::Debug;

    /// Applies channel, PRF and preamble settings
    fn configure(&mut self, config: &RadioConfig) -> Result<(), Self::Error>;

    /// Programs the antenna delays the hardware adds to its timestamps
    fn set_antenna_delay(&mut self, tx: u16, rx: u16) -> Result<(), Self::Error>;

    /// Sets the LED mask
    fn set_leds(&mut self, mask: u8) -> Result<(), Self::Error>;

    /// Writes a frame into the TX buffer
    ///
    /// The hardware appends the FCS.
    fn write_tx(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Starts transmitting the frame in the TX buffer
    ///
    /// If `response_expected` is set, the receiver is turned on after the
    /// transmission, after the delay set with `set_rx_after_tx_delay`. Must
    /// fail if the transmission can't be issued, for example because a delayed
    /// time has already passed.
    fn start_tx(&mut self, mode: StartMode, response_expected: bool) -> Result<(), Self::Error>;

    /// Turns on the receiver
    fn enable_rx(&mut self, mode: StartMode) -> Result<(), Self::Error>;

    /// Sets how long the receiver waits for a frame
    fn set_rx_timeout(&mut self, uus: u16) -> Result<(), Self::Error>;

    /// Sets the delay between the end of a transmission and the receiver
    /// turning on, for transmissions that expect a response
    fn set_rx_after_tx_delay(&mut self, uus: u32) -> Result<(), Self::Error>;

    /// Sets the time of the next delayed transmission
    ///
    /// The hardware ignores the low 9 bits of `time`.
    fn set_delayed_tx_time(&mut self, time: Instant) -> Result<(), Self::Error>;

    /// Reads the event flags
    fn read_status(&mut self) -> Result<Status, Self::Error>;

    /// Clears the flags that are set in `status`
    fn clear_status(&mut self, status: Status) -> Result<(), Self::Error>;

    /// Copies the received frame into `buf` and returns its length
    ///
    /// Frames longer than `buf` are cut off.
    fn read_rx_data(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// The time the last frame was sent
    fn read_tx_timestamp(&mut self) -> Result<Instant, Self::Error>;

    /// The time the last frame was received
    fn read_rx_timestamp(&mut self) -> Result<Instant, Self::Error>;
}

/// Entry point to the radio, as used by the protocol state machines
pub struct Radio<T> {
    raw: T,
    seq: Wrapping<u8>,
    rx_buf: [u8; FRAME_LEN_MAX],
}

impl<T> Radio<T>
where
    T: Transceiver,
{
    /// Wraps a transceiver driver
    pub fn new(raw: T) -> Self {
        Radio::with_sequence(raw, 0)
    }

    /// Wraps a transceiver driver, starting at sequence number `seq`
    pub fn with_sequence(raw: T, seq: u8) -> Self {
        Radio {
            raw,
            seq: Wrapping(seq),
            rx_buf: [0; FRAME_LEN_MAX],
        }
    }

    /// Configures the transceiver
    ///
    /// Failing here means the hardware is unusable, and is the only error the
    /// caller should not recover from.
    ///
    /// The hardware antenna delay is set to zero, so timestamps stay raw. The
    /// antenna delay from `config` is applied to the time of flight instead.
    pub fn init(&mut self, config: &Config) -> Result<(), Error<T::Error>> {
        if !config.radio.is_valid() {
            return Err(Error::InvalidConfiguration);
        }

        self.raw.configure(&config.radio).map_err(Error::Init)?;
        self.raw.set_leds(config.leds).map_err(Error::Init)?;
        self.raw.set_antenna_delay(0, 0).map_err(Error::Init)?;
        self.raw
            .set_rx_after_tx_delay(config.tx_to_rx_delay_uus)
            .map_err(Error::Init)?;
        self.raw
            .set_rx_timeout(config.rx_timeout_uus)
            .map_err(Error::Init)?;

        log::info!("radio configured: {:?}", config.radio);

        Ok(())
    }

    /// The sequence number the next frame will carry
    pub fn seq(&self) -> u8 {
        self.seq.0
    }

    /// Provides direct access to the driver
    pub fn raw(&mut self) -> &mut T {
        &mut self.raw
    }

    /// Releases the driver
    pub fn free(self) -> T {
        self.raw
    }
}

// Can't be derived without putting requirements on `T`.
impl<T> fmt::Debug for Radio<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Radio {{ seq: {}, .. }}", self.seq.0)
    }
}
