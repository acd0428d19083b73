//! Discovery: a tag finds an anchor and the two agree on timing
//!
//! The tag broadcasts a Blink carrying its 64-bit identity and waits for a
//! RangingInit. An anchor listening for blinks admits the tag to its
//! [`DeviceRegistry`], and replies with the short id of the tag's slot and the
//! response delay both sides will use during ranging.
//!
//! Both machines are advanced with `poll`, which returns `WouldBlock` while
//! waiting for the radio.

use crate::{
    frame::{Body, FrameType, InitPayload},
    hl::{Error, Radio, SendTime, Transceiver},
    mac,
    registry::{slot_to_short_id, DeviceRegistry, RegistryFull, SlotIndex},
    time::{Duration, Instant},
    Config, DeviceId, ShortId,
};

/// State of a discovery machine
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiscoveryState {
    /// Nothing started yet
    Idle,
    /// Tag: Blink sent, waiting for a RangingInit
    AwaitingInit,
    /// Anchor: receiver on, waiting for a Blink
    ListeningForBlink,
    /// Agreement reached, ranging can start
    Done,
    /// Tag: no usable RangingInit arrived
    TimedOut,
}

/// What a tag learns from a RangingInit
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Agreement {
    /// The network the anchor belongs to
    pub pan_id: mac::PanId,
    /// The anchor's short address
    pub anchor: ShortId,
    /// The short id the anchor assigned to this tag
    pub short_id: ShortId,
    /// Delay between receiving a frame and replying to it
    pub response_delay: Duration,
    /// When the RangingInit was received, in tag time
    pub init_rx: Instant,
}

/// What an anchor records when admitting a tag
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Admission {
    /// The tag's identity
    pub tag: DeviceId,
    /// The slot it occupies
    pub slot: SlotIndex,
    /// The short id derived from the slot
    pub short_id: ShortId,
    /// Delay between receiving a frame and replying to it
    pub response_delay: Duration,
}

/// Tag side of discovery
#[derive(Debug)]
pub struct TagDiscovery {
    device_id: DeviceId,
    state: DiscoveryState,
}

impl TagDiscovery {
    /// Creates the machine for a tag with the given identity
    pub fn new(device_id: DeviceId) -> Self {
        TagDiscovery {
            device_id,
            state: DiscoveryState::Idle,
        }
    }

    /// The current state
    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Goes back to `Idle`, so the next `poll` sends a new Blink
    pub fn reset(&mut self) {
        self.state = DiscoveryState::Idle;
    }

    /// Advances discovery
    ///
    /// The first call sends a Blink. Subsequent calls wait for the RangingInit
    /// and return the agreement once it has arrived. A receive error, a
    /// timeout or any other frame end the attempt in `TimedOut`; polling again
    /// after that starts over with a new Blink.
    pub fn poll<T>(&mut self, radio: &mut Radio<T>) -> nb::Result<Agreement, Error<T::Error>>
    where
        T: Transceiver,
    {
        let result = self.step(radio);
        if let Err(nb::Error::Other(error)) = &result {
            log::debug!("discovery failed: {:?}", error);
            self.state = DiscoveryState::TimedOut;
        }

        result
    }

    fn step<T>(&mut self, radio: &mut Radio<T>) -> nb::Result<Agreement, Error<T::Error>>
    where
        T: Transceiver,
    {
        if self.state != DiscoveryState::AwaitingInit {
            log::debug!("sending blink {} as {:016x}", radio.seq(), self.device_id.0);

            radio.send(
                Body::Blink {
                    device_id: self.device_id,
                },
                SendTime::Now,
                true,
            )?;
            self.state = DiscoveryState::AwaitingInit;

            return Err(nb::Error::WouldBlock);
        }

        let message = radio.wait_receive()?;

        // Discovery is broadcast; a RangingInit is taken to be for us.
        let (pan_id, anchor, payload) = match message.frame.body {
            Body::RangingInit {
                pan_id,
                source,
                payload,
                ..
            } => (pan_id, source, payload),
            _ => {
                log::warn!(
                    "expected ranging init, got {:?}",
                    message.frame.frame_type()
                );
                return Err(nb::Error::Other(Error::UnexpectedFrame {
                    expected: FrameType::RangingInit,
                    found: message.frame.frame_type(),
                }));
            }
        };

        self.state = DiscoveryState::Done;

        Ok(Agreement {
            pan_id,
            anchor,
            short_id: mac::ShortAddress(payload.short_id),
            response_delay: Duration::from_uus(payload.response_delay),
            init_rx: message.rx_time,
        })
    }
}

/// Anchor side of discovery
#[derive(Debug)]
pub struct AnchorDiscovery {
    pan_id: mac::PanId,
    address: ShortId,
    response_delay_uus: u16,
    state: DiscoveryState,
}

impl AnchorDiscovery {
    /// Creates the machine from the anchor's configuration
    pub fn new(config: &Config) -> Self {
        AnchorDiscovery {
            pan_id: config.pan_id,
            address: config.address,
            response_delay_uus: config.response_delay_uus,
            state: DiscoveryState::Idle,
        }
    }

    /// The current state
    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Turns on the receiver and waits for blinks
    ///
    /// Falls back to `Idle` if the receiver can't be turned on, so the next
    /// `poll` tries again.
    pub fn listen<T>(&mut self, radio: &mut Radio<T>) -> Result<(), Error<T::Error>>
    where
        T: Transceiver,
    {
        self.state = DiscoveryState::Idle;
        radio.receive()?;
        self.state = DiscoveryState::ListeningForBlink;

        Ok(())
    }

    /// Advances discovery
    ///
    /// Listens for blinks until one comes from a tag that fits in `registry`,
    /// answers it with a RangingInit and returns the admission. Blinks from
    /// tags that don't fit, other frames, receive errors and timeouts are
    /// dropped, and the anchor keeps listening.
    pub fn poll<T, const N: usize>(
        &mut self,
        radio: &mut Radio<T>,
        registry: &mut DeviceRegistry<N>,
    ) -> nb::Result<Admission, Error<T::Error>>
    where
        T: Transceiver,
    {
        if self.state != DiscoveryState::ListeningForBlink {
            self.listen(radio)?;
        }

        let message = match radio.wait_receive() {
            Ok(message) => message,
            Err(nb::Error::WouldBlock) => return Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(Error::Timeout))
            | Err(nb::Error::Other(Error::Frame))
            | Err(nb::Error::Other(Error::Decode(_))) => {
                radio.receive()?;
                return Err(nb::Error::WouldBlock);
            }
            Err(nb::Error::Other(error)) => return Err(nb::Error::Other(error)),
        };

        let device_id = match message.frame.body {
            Body::Blink { device_id } => device_id,
            _ => {
                log::debug!("ignoring {:?} while listening", message.frame.frame_type());
                radio.receive()?;
                return Err(nb::Error::WouldBlock);
            }
        };

        let slot = match registry.register(device_id) {
            Ok(slot) => slot,
            Err(RegistryFull) => {
                log::warn!("registry full, dropping blink from {:016x}", device_id.0);
                radio.receive()?;
                return Err(nb::Error::WouldBlock);
            }
        };
        let short_id = slot_to_short_id(slot);

        let init = Body::RangingInit {
            pan_id: self.pan_id,
            destination: device_id,
            source: self.address,
            payload: InitPayload {
                short_id: short_id.0,
                response_delay: self.response_delay_uus,
            },
        };
        if let Err(error) = radio.send(init, SendTime::Now, true) {
            log::warn!("failed to answer {:016x}: {:?}", device_id.0, error);

            // Back to listening; the tag will blink again.
            if let Err(listen_error) = self.listen(radio) {
                log::warn!("failed to listen again: {:?}", listen_error);
            }
            return Err(nb::Error::Other(error));
        }

        self.state = DiscoveryState::Done;
        log::info!(
            "admitted {:016x} in slot {} as {:#06x}",
            device_id.0,
            slot,
            short_id.0
        );

        Ok(Admission {
            tag: device_id,
            slot,
            short_id,
            response_delay: Duration::from_uus(self.response_delay_uus),
        })
    }
}
