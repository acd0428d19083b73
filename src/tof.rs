//! Time of flight and distance from a double-sided exchange
//!
//! This ranging technique is described in the DW1000 user manual, section
//! 12.3.2. With three messages, each side measures one round-trip time and one
//! reply time on its own clock:
//!
//! - `Tround1`: tag, Poll TX to Response RX
//! - `Treply1`: tag, Response RX to Final TX
//! - `Tround2`: anchor, Response TX to Final RX
//! - `Treply2`: anchor, Poll RX to Response TX
//!
//! ``` text
//! ToF = (Tround1 * Tround2 - Treply1 * Treply2)
//!     / (Tround1 + Tround2 + Treply1 + Treply2)
//! ```
//!
//! The clock offset between the two radios cancels out to first order, and the
//! reply times don't need to be equal.

use crate::{
    configs::{AntennaDelay, Config, SPEED_OF_LIGHT},
    time::{Duration, DTU_SECONDS},
    timestamps::Timestamps,
    DeviceId, ShortId,
};

/// Time of flight in device time units, as an exact fraction
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimeOfFlight {
    numerator: i128,
    denominator: i128,
}

impl TimeOfFlight {
    /// Computes the time of flight from the four intervals of an exchange
    ///
    /// All intervals are at most 40 bits wide, so the products can't overflow
    /// an `i128`.
    pub fn from_intervals(
        round1: Duration,
        reply1: Duration,
        round2: Duration,
        reply2: Duration,
    ) -> Result<Self, RangingError> {
        let round1 = round1.value() as i128;
        let reply1 = reply1.value() as i128;
        let round2 = round2.value() as i128;
        let reply2 = reply2.value() as i128;

        let denominator = round1 + round2 + reply1 + reply2;
        if denominator == 0 {
            return Err(RangingError::DegenerateTimes);
        }

        Ok(TimeOfFlight {
            numerator: round1 * round2 - reply1 * reply2,
            denominator,
        })
    }

    /// `Tround1 * Tround2 - Treply1 * Treply2`
    pub fn numerator(&self) -> i128 {
        self.numerator
    }

    /// `Tround1 + Tround2 + Treply1 + Treply2`
    pub fn denominator(&self) -> i128 {
        self.denominator
    }

    /// The time of flight in device time units
    pub fn as_dtu(&self) -> f64 {
        // The numerator is too wide for an exact `f64`, the quotient and
        // remainder aren't.
        let quotient = self.numerator / self.denominator;
        let remainder = self.numerator % self.denominator;

        quotient as f64 + remainder as f64 / self.denominator as f64
    }
}

/// Turns a time of flight into a distance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimator {
    /// Subtracted from the time of flight
    pub antenna_delay: AntennaDelay,
    /// Larger distances are rejected
    pub max_distance_m: f64,
}

impl Estimator {
    /// Creates an estimator from the antenna delay and range limit in `config`
    pub fn new(config: &Config) -> Self {
        Estimator {
            antenna_delay: config.antenna_delay,
            max_distance_m: config.max_distance_m,
        }
    }

    /// Converts a time of flight into meters
    ///
    /// Fails with [`RangingError::ImplausibleDistance`], if the corrected
    /// distance is negative or beyond the configured maximum. Negative
    /// distances indicate badly calibrated antenna delays, and are not clamped.
    pub fn distance_m(&self, tof: &TimeOfFlight) -> Result<f64, RangingError> {
        let tof_dtu = tof.as_dtu() - self.antenna_delay.total() as f64;
        let distance_m = tof_dtu * DTU_SECONDS * SPEED_OF_LIGHT;

        if distance_m < 0.0 || distance_m > self.max_distance_m {
            return Err(RangingError::ImplausibleDistance { distance_m });
        }

        Ok(distance_m)
    }

    /// Computes the result of an exchange from the anchor's timestamps and the
    /// intervals the tag reported
    pub fn estimate(
        &self,
        tag: DeviceId,
        short_id: ShortId,
        timestamps: Timestamps,
        dt1: Duration,
        dt2: Duration,
    ) -> Result<RangingResult, RangingError> {
        let round2 = timestamps
            .anchor_round()
            .ok_or(RangingError::MissingTimestamp)?;
        let reply2 = timestamps
            .anchor_reply()
            .ok_or(RangingError::MissingTimestamp)?;

        let tof = TimeOfFlight::from_intervals(dt1, dt2, round2, reply2)?;
        let distance_m = self.distance_m(&tof)?;

        Ok(RangingResult {
            tag,
            short_id,
            tof_dtu: tof,
            distance_m,
            timestamps,
        })
    }
}

/// A completed measurement, as seen by the anchor
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RangingResult {
    /// The tag that was ranged
    pub tag: DeviceId,
    /// Its short id
    pub short_id: ShortId,
    /// Time of flight in device time units, before antenna delay correction
    pub tof_dtu: TimeOfFlight,
    /// Corrected distance
    pub distance_m: f64,
    /// The anchor's timestamps of the exchange
    pub timestamps: Timestamps,
}

/// Returned when a time of flight can't be turned into a distance
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RangingError {
    /// The distance is negative or out of range after correction
    ImplausibleDistance {
        /// The rejected value
        distance_m: f64,
    },

    /// All four intervals are zero
    DegenerateTimes,

    /// An interval doesn't fit in the 32-bit field of the Final frame
    ReplyTooLong,

    /// A timestamp needed for the computation wasn't captured
    MissingTimestamp,
}
