//! Time-related types based on the transceiver's system time


use core::ops::Add;
use serde::{Serialize, Deserialize};


/// The maximum value of 40-bit system time stamps.
pub const TIME_MAX: u64 = 0xffffffffff;

/// Number of device time units in one UWB microsecond
///
/// 1 UUS = 512 / 499.2 µs, and 1 µs = 499.2 * 128 DTU.
pub const UUS_TO_DTU: u64 = 65536;

/// Duration of one device time unit, in seconds (about 15.65 ps)
pub const DTU_SECONDS: f64 = 1.0 / (499.2e6 * 128.0);

/// Bits of a delayed transmission time that the transceiver ignores
const DELAYED_TX_MASK: u64 = 0x1ff;


/// Represents an instant in time
///
/// Internally uses the same 40-bit timestamps that the transceiver uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates a new instance of `Instant`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if it
    /// isn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dw1000_twr::time::{
    ///     TIME_MAX,
    ///     Instant,
    /// };
    ///
    /// let valid_instant   = Instant::new(TIME_MAX);
    /// let invalid_instant = Instant::new(TIME_MAX + 1);
    ///
    /// assert!(valid_instant.is_some());
    /// assert!(invalid_instant.is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        }
        else {
            None
        }
    }

    /// Creates an `Instant` from a raw register value, dropping anything above
    /// bit 39
    pub fn from_register(value: u64) -> Self {
        Instant(value & TIME_MAX)
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the amount of time passed between the two `Instant`s
    ///
    /// Assumes that `&self` represents a later time than the argument
    /// `earlier`. Please make sure that this is the case, as this method has no
    /// way of knowing (timestamps can overflow, so comparing the numerical
    /// value of the timestamp doesn't tell anything about order).
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dw1000_twr::time::{
    ///     TIME_MAX,
    ///     Instant,
    /// };
    ///
    /// // `unwrap`ing here is okay, since we're passing constants that we know
    /// // are in the valid range.
    /// let instant_1 = Instant::new(TIME_MAX - 50).unwrap();
    /// let instant_2 = Instant::new(TIME_MAX).unwrap();
    /// let instant_3 = Instant::new(49).unwrap();
    ///
    /// // Works as expected, if the later timestamp is larger than the earlier
    /// // one.
    /// let duration = instant_2.duration_since(instant_1);
    /// assert_eq!(duration.value(), 50);
    ///
    /// // Still works as expected, if the later timestamp is the numerically
    /// // smaller value.
    /// let duration = instant_3.duration_since(instant_2);
    /// assert_eq!(duration.value(), 50);
    /// ```
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        if self.value() >= earlier.value() {
            Duration(self.value() - earlier.value())
        }
        else {
            Duration(TIME_MAX - earlier.value() + self.value() + 1)
        }
    }

    /// Returns the instant a delayed transmission scheduled for `self` will
    /// actually carry as its TX timestamp
    ///
    /// The transceiver ignores the low 9 bits of the delayed TX register, so
    /// any time written there is rounded down to a multiple of 512 DTU.
    ///
    /// ``` rust
    /// use dw1000_twr::time::Instant;
    ///
    /// let scheduled = Instant::new(0x12_3456_7fff).unwrap();
    /// assert_eq!(scheduled.delayed_tx_granular().value(), 0x12_3456_7e00);
    /// ```
    pub fn delayed_tx_granular(&self) -> Instant {
        Instant(self.0 & !DELAYED_TX_MASK)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Both values are 40-bit numbers, so the sum fits comfortably in a
        // `u64` before it is wrapped back into range.
        Instant((self.value() + rhs.value()) % (TIME_MAX + 1))
    }
}


/// A duration between two instants in transceiver system time
///
/// Internally uses the same 40-bit timestamps that the transceiver uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a new instance of `Duration`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if it
    /// isn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dw1000_twr::time::{
    ///     TIME_MAX,
    ///     Duration,
    /// };
    ///
    /// let valid_duration   = Duration::new(TIME_MAX);
    /// let invalid_duration = Duration::new(TIME_MAX + 1);
    ///
    /// assert!(valid_duration.is_some());
    /// assert!(invalid_duration.is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        }
        else {
            None
        }
    }

    /// Creates an instance of `Duration` from a number of UWB microseconds
    ///
    /// ``` rust
    /// use dw1000_twr::time::Duration;
    ///
    /// assert_eq!(Duration::from_uus(6000).value(), 393_216_000);
    /// ```
    pub fn from_uus(uus: u16) -> Self {
        // 16 bits times 2^16 stays below 2^32.
        Duration(uus as u64 * UUS_TO_DTU)
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the duration as a 32-bit value, as carried in ranging frames
    ///
    /// Returns `None`, if the duration is longer than 2^32 - 1 DTU (about 67
    /// ms).
    pub fn as_u32(&self) -> Option<u32> {
        if self.0 <= u32::MAX as u64 {
            Some(self.0 as u32)
        }
        else {
            None
        }
    }
}

impl From<u32> for Duration {
    fn from(value: u32) -> Self {
        Duration(value as u64)
    }
}
