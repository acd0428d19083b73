use crate::{frame::Frame, time::Instant, Error, Radio, Status, Transceiver};

use super::StartMode;

/// An incoming message
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Message {
    /// The time the message was received
    ///
    /// This time is based on the local system time of the receiving radio.
    pub rx_time: Instant,

    /// The decoded frame
    pub frame: Frame,
}

impl<T> Radio<T>
where
    T: Transceiver,
{
    /// Turns on the receiver
    ///
    /// Not needed after a transmission that expects a response; the receiver
    /// is turned on automatically in that case.
    pub fn receive(&mut self) -> Result<(), Error<T::Error>> {
        self.raw.clear_status(Status::RX_ALL).map_err(Error::Driver)?;
        self.raw
            .enable_rx(StartMode::Immediate)
            .map_err(Error::Driver)?;

        Ok(())
    }

    /// Wait for receive operation to finish
    ///
    /// This method returns an `nb::Result` to indicate whether a frame has
    /// arrived, or whether the receiver is still waiting. You can use this to
    /// busily wait, for example using `nb`'s `block!` macro, or use the
    /// transceiver's IRQ line to wait in a more energy-efficient manner.
    ///
    /// A receiver timeout or a frame with a CRC/PHY error clears the
    /// corresponding flag and is reported as an error; the receiver has to be
    /// turned on again afterwards.
    pub fn wait_receive(&mut self) -> nb::Result<Message, Error<T::Error>> {
        let status = self
            .raw
            .read_status()
            .map_err(|error| nb::Error::Other(Error::Driver(error)))?;

        // Is a frame ready?
        if !status.frame_good {
            // No frame ready. Check for errors.
            if status.rx_timeout {
                self.clear(Status {
                    rx_timeout: true,
                    ..Status::default()
                })?;
                return Err(nb::Error::Other(Error::Timeout));
            }
            if status.rx_error {
                self.clear(Status {
                    rx_error: true,
                    ..Status::default()
                })?;
                return Err(nb::Error::Other(Error::Frame));
            }

            return Err(nb::Error::WouldBlock);
        }

        self.clear(Status::FRAME_GOOD)?;

        let len = self
            .raw
            .read_rx_data(&mut self.rx_buf)
            .map_err(|error| nb::Error::Other(Error::Driver(error)))?;
        let rx_time = self
            .raw
            .read_rx_timestamp()
            .map_err(|error| nb::Error::Other(Error::Driver(error)))?;

        // Clear out the rest of the buffer, so the next frame doesn't see
        // leftovers from this one.
        let len = len.min(self.rx_buf.len());
        let frame = Frame::decode(&self.rx_buf[..len]);
        for byte in self.rx_buf.iter_mut() {
            *byte = 0;
        }
        let frame = frame.map_err(|error| nb::Error::Other(Error::Decode(error)))?;

        log::trace!("received {:?} at {}", frame.frame_type(), rx_time.value());

        Ok(Message { rx_time, frame })
    }

    fn clear(&mut self, status: Status) -> Result<(), Error<T::Error>> {
        self.raw.clear_status(status).map_err(Error::Driver)
    }
}
