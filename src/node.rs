//! Control loops for the two roles
//!
//! [`Tag`] and [`Anchor`] own the radio and run discovery, then ranging, for
//! one peer at a time. Call `poll` from your own loop, or `run` to block for
//! one attempt:
//!
//! ``` no_run
//! # fn example<T, TIMER, DELAY>(raw: T, timer: &mut TIMER, delay: &mut DELAY)
//! # where
//! #     T: dw1000_twr::Transceiver,
//! #     TIMER: dw1000_twr::embedded_hal::timer::CountDown,
//! #     TIMER::Time: From<u32>,
//! #     DELAY: dw1000_twr::embedded_hal::blocking::delay::DelayMs<u32>,
//! # {
//! use dw1000_twr::{Config, Radio, Tag};
//!
//! let mut tag = Tag::new(Radio::new(raw), Config::default());
//! if tag.init().is_err() {
//!     // The hardware is unusable
//!     return;
//! }
//!
//! loop {
//!     match tag.run(timer, delay) {
//!         Ok(_report) => { /* The anchor now knows the distance */ }
//!         Err(_) => { /* Already backed off, try again */ }
//!     }
//! }
//! # }
//! ```

use embedded_hal::{blocking::delay::DelayMs, timer::CountDown};

use crate::{
    block_timeout,
    configs::MAX_DEVICES,
    discovery::{AnchorDiscovery, DiscoveryState, TagDiscovery},
    hl::{Error, Radio, Transceiver},
    ranging::{AnchorRanging, RangingState, TagRanging, TagReport},
    registry::DeviceRegistry,
    timestamps::RangingSession,
    tof::RangingResult,
    Config,
};

/// A tag: the device whose distance is measured
#[derive(Debug)]
pub struct Tag<T> {
    radio: Radio<T>,
    config: Config,
    discovery: TagDiscovery,
    ranging: Option<TagRanging>,
}

impl<T> Tag<T>
where
    T: Transceiver,
{
    /// Creates a tag that announces itself as `config.device_id`
    pub fn new(radio: Radio<T>, config: Config) -> Self {
        Tag {
            radio,
            discovery: TagDiscovery::new(config.device_id),
            config,
            ranging: None,
        }
    }

    /// Configures the radio
    ///
    /// An error here is fatal.
    pub fn init(&mut self) -> Result<(), Error<T::Error>> {
        self.radio.init(&self.config)
    }

    /// Advances discovery or ranging by one step
    ///
    /// Returns the report once the Final has been sent. After that, and after
    /// any error, the next call starts over with a Blink.
    pub fn poll(&mut self) -> nb::Result<TagReport, Error<T::Error>> {
        let result = self.step();
        match &result {
            Ok(_) | Err(nb::Error::Other(_)) => self.abort(),
            Err(nb::Error::WouldBlock) => (),
        }

        result
    }

    fn step(&mut self) -> nb::Result<TagReport, Error<T::Error>> {
        if let Some(ranging) = self.ranging.as_mut() {
            return ranging.poll(&mut self.radio);
        }

        let agreement = self.discovery.poll(&mut self.radio)?;
        log::info!(
            "discovered anchor {:#06x}, assigned {:#06x}",
            agreement.anchor.0,
            agreement.short_id.0
        );

        // The Poll is due one response delay after the RangingInit arrived, so
        // schedule it right away.
        let mut ranging = TagRanging::new(agreement);
        let result = ranging.poll(&mut self.radio);
        self.ranging = Some(ranging);

        result
    }

    /// Blocks for one attempt
    ///
    /// Gives up after `config.attempt_timeout` timer ticks. On failure, sleeps
    /// for `config.retry_period_ms` before returning the error.
    pub fn run<TIMER, DELAY>(
        &mut self,
        timer: &mut TIMER,
        delay: &mut DELAY,
    ) -> Result<TagReport, Error<T::Error>>
    where
        TIMER: CountDown,
        TIMER::Time: From<u32>,
        DELAY: DelayMs<u32>,
    {
        timer.start(self.config.attempt_timeout);
        let result = block_timeout!(timer, self.poll()).map_err(Error::from);

        if let Err(error) = &result {
            log::debug!("attempt failed: {:?}", error);
            self.abort();
            delay.delay_ms(self.config.retry_period_ms);
        }

        result
    }

    /// Drops the current exchange and goes back to discovery
    pub fn abort(&mut self) {
        self.discovery.reset();
        self.ranging = None;
    }

    /// The state of discovery
    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// The state of ranging, if an exchange is in progress
    pub fn ranging_state(&self) -> Option<RangingState> {
        self.ranging.as_ref().map(|ranging| ranging.state())
    }

    /// The exchange in progress
    pub fn session(&self) -> Option<&RangingSession> {
        self.ranging.as_ref().map(|ranging| ranging.session())
    }

    /// The configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Provides access to the radio
    pub fn radio(&mut self) -> &mut Radio<T> {
        &mut self.radio
    }

    /// Releases the radio
    pub fn free(self) -> Radio<T> {
        self.radio
    }
}

/// An anchor: a device at a known position that measures distances to tags
#[derive(Debug)]
pub struct Anchor<T, const N: usize = MAX_DEVICES> {
    radio: Radio<T>,
    config: Config,
    registry: DeviceRegistry<N>,
    discovery: AnchorDiscovery,
    ranging: Option<AnchorRanging>,
}

impl<T, const N: usize> Anchor<T, N>
where
    T: Transceiver,
{
    /// Creates an anchor with an empty registry
    pub fn new(radio: Radio<T>, config: Config) -> Self {
        Anchor {
            radio,
            discovery: AnchorDiscovery::new(&config),
            config,
            registry: DeviceRegistry::new(),
            ranging: None,
        }
    }

    /// Configures the radio and starts listening for blinks
    ///
    /// An error here is fatal.
    pub fn init(&mut self) -> Result<(), Error<T::Error>> {
        self.radio.init(&self.config)?;
        self.discovery.listen(&mut self.radio)
    }

    /// Advances discovery or ranging by one step
    ///
    /// Returns the result once a Final has arrived. After that, and after any
    /// error, the anchor listens for blinks again.
    pub fn poll(&mut self) -> nb::Result<RangingResult, Error<T::Error>> {
        let result = self.step();
        match &result {
            Ok(_) | Err(nb::Error::Other(_)) => self.abort(),
            Err(nb::Error::WouldBlock) => (),
        }

        result
    }

    fn step(&mut self) -> nb::Result<RangingResult, Error<T::Error>> {
        if let Some(ranging) = self.ranging.as_mut() {
            return ranging.poll(&mut self.radio);
        }

        let admission = self.discovery.poll(&mut self.radio, &mut self.registry)?;
        self.ranging = Some(AnchorRanging::new(admission, &self.config));

        Err(nb::Error::WouldBlock)
    }

    /// Blocks for one attempt
    ///
    /// Gives up after `config.attempt_timeout` timer ticks. Unlike the tag, the
    /// anchor doesn't back off after a failure, so it doesn't miss blinks.
    pub fn run<TIMER>(&mut self, timer: &mut TIMER) -> Result<RangingResult, Error<T::Error>>
    where
        TIMER: CountDown,
        TIMER::Time: From<u32>,
    {
        timer.start(self.config.attempt_timeout);
        let result = block_timeout!(timer, self.poll()).map_err(Error::from);

        if let Err(error) = &result {
            log::debug!("attempt failed: {:?}", error);
            self.abort();
        }

        result
    }

    /// Drops the current exchange and listens for blinks again
    pub fn abort(&mut self) {
        self.ranging = None;
        if let Err(error) = self.discovery.listen(&mut self.radio) {
            // Discovery is back in `Idle` and retries on the next poll.
            log::warn!("failed to enable receiver: {:?}", error);
        }
    }

    /// The state of discovery
    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// The state of ranging, if an exchange is in progress
    pub fn ranging_state(&self) -> Option<RangingState> {
        self.ranging.as_ref().map(|ranging| ranging.state())
    }

    /// The exchange in progress
    pub fn session(&self) -> Option<&RangingSession> {
        self.ranging.as_ref().map(|ranging| ranging.session())
    }

    /// The tags admitted so far
    pub fn registry(&self) -> &DeviceRegistry<N> {
        &self.registry
    }

    /// The configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Provides access to the radio
    pub fn radio(&mut self) -> &mut Radio<T> {
        &mut self.radio
    }

    /// Releases the radio
    pub fn free(self) -> Radio<T> {
        self.radio
    }
}
