use core::num::Wrapping;

use crate::{
    frame::{Body, Frame, FRAME_LEN_MAX},
    time::Instant,
    Error, Radio, Status, Transceiver,
};

use super::StartMode;

/// The time at which the transmission will start
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendTime {
    /// As fast as possible
    Now,
    /// At the given instant, rounded down to the transceiver's granularity
    Delayed(Instant),
}

impl<T> Radio<T>
where
    T: Transceiver,
{
    /// Sends a frame
    ///
    /// The frame is stamped with the current sequence number, which is then
    /// incremented. If `response_expected` is set, the receiver is turned on
    /// once the frame is out.
    ///
    /// For delayed transmissions, returns the TX timestamp the frame will
    /// carry, which is the requested time rounded down to the transceiver's
    /// granularity. Immediate transmissions return `None`; use
    /// [`Radio::wait_transmit`] to learn their timestamp.
    pub fn send(
        &mut self,
        body: Body,
        send_time: SendTime,
        response_expected: bool,
    ) -> Result<Option<Instant>, Error<T::Error>> {
        // Stale events from the previous operation would otherwise be mistaken
        // for the outcome of this one.
        self.raw.clear_status(Status::ALL).map_err(Error::Driver)?;

        let frame = Frame {
            seq: self.seq.0,
            body,
        };
        let mut buf = [0; FRAME_LEN_MAX];
        let len = frame.encode(&mut buf)?;
        self.raw.write_tx(&buf[..len]).map_err(Error::Driver)?;

        let (mode, tx_time) = match send_time {
            SendTime::Now => (StartMode::Immediate, None),
            SendTime::Delayed(time) => {
                self.raw.set_delayed_tx_time(time).map_err(Error::Driver)?;
                (StartMode::Delayed, Some(time.delayed_tx_granular()))
            }
        };

        self.raw
            .start_tx(mode, response_expected)
            .map_err(Error::TxFailure)?;
        self.seq += Wrapping(1);

        log::trace!("sent {:?} (seq {})", frame.frame_type(), frame.seq);

        Ok(tx_time)
    }

    /// Wait for the transmission to finish
    ///
    /// This method returns an `nb::Result` to indicate whether the transmission
    /// has finished, or whether it is still ongoing. Returns the TX timestamp
    /// once the frame is out.
    pub fn wait_transmit(&mut self) -> nb::Result<Instant, Error<T::Error>> {
        let status = self
            .raw
            .read_status()
            .map_err(|error| nb::Error::Other(Error::Driver(error)))?;

        // Has the frame been sent?
        if !status.tx_done {
            return Err(nb::Error::WouldBlock);
        }

        self.raw
            .clear_status(Status::TX_DONE)
            .map_err(|error| nb::Error::Other(Error::Driver(error)))?;

        Ok(self.read_tx_timestamp()?)
    }

    /// The TX timestamp of the last frame sent
    pub fn read_tx_timestamp(&mut self) -> Result<Instant, Error<T::Error>> {
        self.raw.read_tx_timestamp().map_err(Error::Driver)
    }
}
