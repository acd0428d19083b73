//! Supports double-sided two-way ranging
//!
//! This ranging technique is described in the DW1000 user manual, section 12.3.
//! This module uses three messages for a range measurement, as described in
//! section 12.3.2:
//! 1. The tag sends a Poll, one response delay after it received the
//!    RangingInit.
//! 2. The anchor answers with a Response, one response delay after receiving
//!    the Poll.
//! 3. The tag sends a Final, one response delay after receiving the Response.
//!    The Final carries the tag's round-trip time (`dt1`) and reply time
//!    (`dt2`).
//!
//! Once the anchor has received the Final, it has all four intervals and
//! computes the distance with the [`tof`](crate::tof) module.
//!
//! All replies are sent as delayed transmissions. Their TX timestamps are known
//! before they are sent, which is what allows the tag to put the reply time of
//! the Final into the Final itself.

use crate::{
    discovery::{Admission, Agreement},
    frame::{Addressing, Body, FinalPayload, FrameType},
    hl::{Error, Message, Radio, SendTime, Transceiver},
    mac,
    time::Duration,
    timestamps::{RangingSession, Timestamps},
    tof::{Estimator, RangingError, RangingResult},
    Config, ShortId,
};

/// State of a ranging machine
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangingState {
    /// Tag: the Poll hasn't been scheduled yet
    PollPending,
    /// Anchor: waiting for the Poll
    AwaitPoll,
    /// Tag: Poll scheduled, waiting for the Response. Anchor: Response
    /// scheduled, waiting for it to go out.
    ResponsePending,
    /// Tag: Final scheduled, waiting for it to go out. Anchor: Response sent,
    /// waiting for the Final.
    FinalPending,
    /// The exchange is finished
    Complete,
    /// The exchange failed
    Aborted,
}

/// What the tag knows at the end of an exchange
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TagReport {
    /// The anchor that was ranged with
    pub anchor: ShortId,
    /// The tag's short id
    pub short_id: ShortId,
    /// Poll TX to Response RX, as sent in the Final
    pub dt1: Duration,
    /// Response RX to Final TX, as sent in the Final
    pub dt2: Duration,
    /// The tag's timestamps of the exchange
    pub timestamps: Timestamps,
}

/// Tag side of the exchange
#[derive(Debug)]
pub struct TagRanging {
    state: RangingState,
    agreement: Agreement,
    session: RangingSession,
    sent: FinalPayload,
}

impl TagRanging {
    /// Prepares an exchange with the anchor from `agreement`
    pub fn new(agreement: Agreement) -> Self {
        TagRanging {
            state: RangingState::PollPending,
            agreement,
            session: RangingSession {
                tag: None,
                peer: agreement.anchor,
                short_id: agreement.short_id,
                response_delay: agreement.response_delay,
                timestamps: Timestamps::default(),
            },
            sent: FinalPayload { dt1: 0, dt2: 0 },
        }
    }

    /// The current state
    pub fn state(&self) -> RangingState {
        self.state
    }

    /// The exchange so far
    pub fn session(&self) -> &RangingSession {
        &self.session
    }

    /// Advances the exchange
    ///
    /// Returns `WouldBlock` until the Final is out. Any error aborts the
    /// exchange and forgets its timestamps. Polling a completed exchange
    /// returns its report again; polling an aborted one returns
    /// [`Error::Timeout`].
    pub fn poll<T>(&mut self, radio: &mut Radio<T>) -> nb::Result<TagReport, Error<T::Error>>
    where
        T: Transceiver,
    {
        let result = self.step(radio);
        if let Err(nb::Error::Other(error)) = &result {
            log::warn!("ranging with {:#06x} aborted: {:?}", self.session.peer.0, error);
            self.state = RangingState::Aborted;
            self.session.timestamps.clear();
        }

        result
    }

    fn step<T>(&mut self, radio: &mut Radio<T>) -> nb::Result<TagReport, Error<T::Error>>
    where
        T: Transceiver,
    {
        let delay = self.session.response_delay;

        match self.state {
            RangingState::PollPending => {
                let poll = Body::Poll(Addressing {
                    pan_id: self.agreement.pan_id,
                    destination: self.session.peer,
                    source: self.session.short_id,
                });
                let poll_tx = radio.send(
                    poll,
                    SendTime::Delayed(self.agreement.init_rx + delay),
                    true,
                )?;

                self.session.timestamps.poll_tx = poll_tx;
                self.state = RangingState::ResponsePending;

                Err(nb::Error::WouldBlock)
            }
            RangingState::ResponsePending => {
                let message = radio.wait_receive()?;
                let addressing = expect::<T::Error>(
                    &message,
                    FrameType::Response,
                    self.agreement.pan_id,
                    self.session.peer,
                    self.session.short_id,
                )?;

                // The Poll is out by now, so this is its actual timestamp.
                let poll_tx = radio.read_tx_timestamp()?;
                let resp_rx = message.rx_time;
                let final_tx = (resp_rx + delay).delayed_tx_granular();

                let dt1 = resp_rx.duration_since(poll_tx);
                let dt2 = final_tx.duration_since(resp_rx);
                let payload = FinalPayload {
                    dt1: dt1.as_u32().ok_or_else(|| ranging_error(RangingError::ReplyTooLong))?,
                    dt2: dt2.as_u32().ok_or_else(|| ranging_error(RangingError::ReplyTooLong))?,
                };

                let fin = Body::Final(
                    Addressing {
                        pan_id: addressing.pan_id,
                        destination: addressing.source,
                        source: addressing.destination,
                    },
                    payload,
                );
                let predicted = radio.send(fin, SendTime::Delayed(resp_rx + delay), false)?;

                let timestamps = &mut self.session.timestamps;
                timestamps.poll_tx = Some(poll_tx);
                timestamps.resp_rx = Some(resp_rx);
                timestamps.final_tx = predicted;
                self.sent = payload;
                self.state = RangingState::FinalPending;

                Err(nb::Error::WouldBlock)
            }
            RangingState::FinalPending => {
                let final_tx = radio.wait_transmit()?;
                self.session.timestamps.final_tx = Some(final_tx);
                self.state = RangingState::Complete;

                log::debug!("final sent to {:#06x}", self.session.peer.0);

                Ok(self.report())
            }
            RangingState::Complete => Ok(self.report()),
            RangingState::AwaitPoll | RangingState::Aborted => {
                Err(nb::Error::Other(Error::Timeout))
            }
        }
    }

    fn report(&self) -> TagReport {
        TagReport {
            anchor: self.session.peer,
            short_id: self.session.short_id,
            dt1: Duration::from(self.sent.dt1),
            dt2: Duration::from(self.sent.dt2),
            timestamps: self.session.timestamps,
        }
    }
}

/// Anchor side of the exchange
#[derive(Debug)]
pub struct AnchorRanging {
    state: RangingState,
    pan_id: mac::PanId,
    address: ShortId,
    estimator: Estimator,
    session: RangingSession,
    result: Option<RangingResult>,
}

impl AnchorRanging {
    /// Prepares an exchange with the tag from `admission`
    ///
    /// Expects the receiver to be on already, which it is after sending the
    /// RangingInit.
    pub fn new(admission: Admission, config: &Config) -> Self {
        AnchorRanging {
            state: RangingState::AwaitPoll,
            pan_id: config.pan_id,
            address: config.address,
            estimator: Estimator::new(config),
            session: RangingSession {
                tag: Some(admission.tag),
                peer: admission.short_id,
                short_id: admission.short_id,
                response_delay: admission.response_delay,
                timestamps: Timestamps::default(),
            },
            result: None,
        }
    }

    /// The current state
    pub fn state(&self) -> RangingState {
        self.state
    }

    /// The exchange so far
    pub fn session(&self) -> &RangingSession {
        &self.session
    }

    /// Advances the exchange
    ///
    /// Returns `WouldBlock` until the Final has arrived, then the result of the
    /// measurement. Any error, including an implausible distance, aborts the
    /// exchange and forgets its timestamps.
    pub fn poll<T>(&mut self, radio: &mut Radio<T>) -> nb::Result<RangingResult, Error<T::Error>>
    where
        T: Transceiver,
    {
        let result = self.step(radio);
        if let Err(nb::Error::Other(error)) = &result {
            log::warn!("ranging with {:#06x} aborted: {:?}", self.session.peer.0, error);
            self.state = RangingState::Aborted;
            self.session.timestamps.clear();
        }

        result
    }

    fn step<T>(&mut self, radio: &mut Radio<T>) -> nb::Result<RangingResult, Error<T::Error>>
    where
        T: Transceiver,
    {
        match self.state {
            RangingState::AwaitPoll => {
                let message = radio.wait_receive()?;
                let addressing = expect::<T::Error>(
                    &message,
                    FrameType::Poll,
                    self.pan_id,
                    self.session.peer,
                    self.address,
                )?;

                let poll_rx = message.rx_time;
                let response = Body::Response(Addressing {
                    pan_id: addressing.pan_id,
                    destination: addressing.source,
                    source: addressing.destination,
                });
                let resp_tx = radio.send(
                    response,
                    SendTime::Delayed(poll_rx + self.session.response_delay),
                    true,
                )?;

                self.session.timestamps.poll_rx = Some(poll_rx);
                self.session.timestamps.resp_tx = resp_tx;
                self.state = RangingState::ResponsePending;

                Err(nb::Error::WouldBlock)
            }
            RangingState::ResponsePending => {
                // The receiver turns on by itself once the Response is out.
                let resp_tx = radio.wait_transmit()?;
                self.session.timestamps.resp_tx = Some(resp_tx);
                self.state = RangingState::FinalPending;

                Err(nb::Error::WouldBlock)
            }
            RangingState::FinalPending => {
                let message = radio.wait_receive()?;
                expect::<T::Error>(
                    &message,
                    FrameType::Final,
                    self.pan_id,
                    self.session.peer,
                    self.address,
                )?;
                let payload = match message.frame.body {
                    Body::Final(_, payload) => payload,
                    _ => {
                        return Err(nb::Error::Other(Error::UnexpectedFrame {
                            expected: FrameType::Final,
                            found: message.frame.frame_type(),
                        }))
                    }
                };

                self.session.timestamps.final_rx = Some(message.rx_time);

                let tag = self
                    .session
                    .tag
                    .ok_or_else(|| ranging_error(RangingError::MissingTimestamp))?;
                let result = self
                    .estimator
                    .estimate(
                        tag,
                        self.session.short_id,
                        self.session.timestamps,
                        Duration::from(payload.dt1),
                        Duration::from(payload.dt2),
                    )
                    .map_err(ranging_error)?;

                log::info!(
                    "distance to {:016x}: {} m",
                    result.tag.0,
                    result.distance_m
                );

                self.state = RangingState::Complete;
                self.result = Some(result);

                Ok(result)
            }
            RangingState::Complete => self.result.ok_or(nb::Error::Other(Error::Timeout)),
            _ => Err(nb::Error::Other(Error::Timeout)),
        }
    }
}

fn ranging_error<E>(error: RangingError) -> nb::Error<Error<E>> {
    nb::Error::Other(Error::Ranging(error))
}

/// Checks that a message is of the expected type, and addressed from `peer` to
/// `us` on `pan_id`
fn expect<E>(
    message: &Message,
    expected: FrameType,
    pan_id: mac::PanId,
    peer: ShortId,
    us: ShortId,
) -> Result<Addressing, Error<E>> {
    let found = message.frame.frame_type();
    if found != expected {
        log::debug!("expected {:?}, got {:?}", expected, found);
        return Err(Error::UnexpectedFrame { expected, found });
    }

    match message.frame.addressing() {
        Some(addressing)
            if addressing.pan_id == pan_id
                && addressing.source == peer
                && addressing.destination == us =>
        {
            Ok(addressing)
        }
        Some(addressing) => Err(Error::Misaddressed(addressing)),
        None => Err(Error::UnexpectedFrame { expected, found }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frame::Frame, Instant};

    fn message(body: Body) -> Message {
        Message {
            rx_time: Instant::new(0).unwrap(),
            frame: Frame { seq: 0, body },
        }
    }

    fn addressing(source: u16, destination: u16) -> Addressing {
        Addressing {
            pan_id: mac::PanId(0x6380),
            destination: mac::ShortAddress(destination),
            source: mac::ShortAddress(source),
        }
    }

    fn check(message: &Message, expected: FrameType) -> Result<Addressing, Error<()>> {
        expect(
            message,
            expected,
            mac::PanId(0x6380),
            mac::ShortAddress(1),
            mac::ShortAddress(0xac),
        )
    }

    #[test]
    fn expect_accepts_matching_frame() {
        let poll = message(Body::Poll(addressing(1, 0xac)));
        assert_eq!(check(&poll, FrameType::Poll).unwrap(), addressing(1, 0xac));
    }

    #[test]
    fn expect_rejects_wrong_type() {
        let response = message(Body::Response(addressing(1, 0xac)));

        assert!(matches!(
            check(&response, FrameType::Poll),
            Err(Error::UnexpectedFrame {
                expected: FrameType::Poll,
                found: FrameType::Response,
            })
        ));
    }

    #[test]
    fn expect_rejects_other_peers() {
        let from_stranger = message(Body::Poll(addressing(2, 0xac)));
        assert!(matches!(
            check(&from_stranger, FrameType::Poll),
            Err(Error::Misaddressed(_))
        ));

        let to_other_anchor = message(Body::Poll(addressing(1, 0xad)));
        assert!(matches!(
            check(&to_other_anchor, FrameType::Poll),
            Err(Error::Misaddressed(_))
        ));

        let other_network = message(Body::Poll(Addressing {
            pan_id: mac::PanId(0x1234),
            ..addressing(1, 0xac)
        }));
        assert!(matches!(
            check(&other_network, FrameType::Poll),
            Err(Error::Misaddressed(_))
        ));
    }
}
