//! A simulated air interface for driving tags and anchors in tests
//!
//! All radios share one [`Air`], which keeps the true time in device time units
//! of an ideal clock. Each radio has its own clock with an offset and a drift,
//! wrapping at 40 bits like the real counter. Time moves forward whenever a
//! radio's status is read.

#![allow(dead_code)]

use std::{cell::RefCell, rc::Rc};

use dw1000_twr::{
    embedded_hal::{blocking::delay::DelayMs, timer::CountDown},
    hl::StartMode,
    time::UUS_TO_DTU,
    Config, Frame, Instant, RadioConfig, Status, Transceiver,
};
use void::Void;

const WRAP: f64 = 1_099_511_627_776.0;

/// Sender id of frames put on the air with [`Air::inject`]
pub const INJECTED: usize = usize::MAX;

/// Antenna delay the simulated hardware has on each side, in DTU
///
/// Matches the default configuration, so the estimator removes it exactly.
pub const ANTENNA_DELAY: f64 = 16436.0;

/// A frame on the air
#[derive(Clone, Debug)]
pub struct Transmission {
    pub from: usize,
    /// True time the frame leaves the antenna
    pub departs: f64,
    pub bytes: Vec<u8>,
}

/// The shared medium
#[derive(Debug)]
pub struct Air {
    /// True time
    pub now: f64,
    /// How far time moves on every status read
    pub step: f64,
    /// Propagation delay between any two radios
    pub tof: f64,
    pub transmissions: Vec<Transmission>,
    radios: usize,
}

impl Air {
    /// Creates the medium, with `tof` true DTU between any two radios
    pub fn new(tof: f64) -> Rc<RefCell<Air>> {
        Rc::new(RefCell::new(Air {
            now: 0.0,
            step: 100.0 * UUS_TO_DTU as f64,
            tof,
            transmissions: Vec::new(),
            radios: 0,
        }))
    }

    /// Puts raw bytes on the air, as if sent by a radio outside the test
    pub fn inject(&mut self, bytes: &[u8]) {
        let departs = self.now;
        self.transmissions.push(Transmission {
            from: INJECTED,
            departs,
            bytes: bytes.to_vec(),
        });
    }

    /// Every frame a radio has sent, decoded
    pub fn frames_sent_by(&self, id: usize) -> Vec<Frame> {
        self.transmissions
            .iter()
            .filter(|transmission| transmission.from == id)
            .map(|transmission| Frame::decode(&transmission.bytes).unwrap())
            .collect()
    }

    /// Every frame a radio has sent, as raw bytes
    pub fn bytes_sent_by(&self, id: usize) -> Vec<Vec<u8>> {
        self.transmissions
            .iter()
            .filter(|transmission| transmission.from == id)
            .map(|transmission| transmission.bytes.clone())
            .collect()
    }
}

/// A radio's local oscillator
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    /// Local time at true time zero, in DTU
    pub offset: f64,
    /// Relative frequency error, `10e-6` is 10 ppm fast
    pub drift: f64,
}

impl Clock {
    pub fn ideal() -> Self {
        Clock {
            offset: 0.0,
            drift: 0.0,
        }
    }

    fn exact(&self, t: f64) -> f64 {
        (self.offset + t * (1.0 + self.drift)).rem_euclid(WRAP)
    }

    fn local(&self, t: f64) -> u64 {
        self.exact(t).floor() as u64 & dw1000_twr::TIME_MAX
    }
}

#[derive(Clone, Copy, Debug)]
struct Receiver {
    armed_at: f64,
    deadline: Option<f64>,
}

#[derive(Debug)]
pub enum SimError {
    /// A delayed transmission was scheduled in the past
    DelayedTxLate,
    /// No frame has been sent or received yet
    NoTimestamp,
    /// Refused by `fail_tx` or `fail_rx`
    Busy,
}

/// One simulated transceiver
#[derive(Debug)]
pub struct SimRadio {
    id: usize,
    air: Rc<RefCell<Air>>,
    clock: Clock,

    status: Status,
    tx_buf: Vec<u8>,
    delayed_tx_time: Option<Instant>,
    tx_done_at: Option<f64>,
    tx_timestamp: Option<u64>,

    receiver: Option<Receiver>,
    cursor: usize,
    rx_data: Vec<u8>,
    rx_timestamp: Option<u64>,

    rx_timeout_uus: u16,
    rx_after_tx_uus: u32,
    pub configured: Option<RadioConfig>,
    pub antenna_delay: Option<(u16, u16)>,
    pub leds: Option<u8>,
    /// Refuse to start transmissions
    pub fail_tx: bool,
    /// Refuse to turn on the receiver
    pub fail_rx: bool,
}

impl SimRadio {
    pub fn new(air: &Rc<RefCell<Air>>, clock: Clock) -> Self {
        let id = {
            let mut air = air.borrow_mut();
            air.radios += 1;
            air.radios - 1
        };

        SimRadio {
            id,
            air: air.clone(),
            clock,
            status: Status::default(),
            tx_buf: Vec::new(),
            delayed_tx_time: None,
            tx_done_at: None,
            tx_timestamp: None,
            receiver: None,
            cursor: 0,
            rx_data: Vec::new(),
            rx_timestamp: None,
            rx_timeout_uus: 0,
            rx_after_tx_uus: 0,
            configured: None,
            antenna_delay: None,
            leds: None,
            fail_tx: false,
            fail_rx: false,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The radio's local time right now
    pub fn local_now(&self) -> u64 {
        self.clock.local(self.air.borrow().now)
    }

    /// Reports a CRC error on the next status read
    pub fn inject_rx_error(&mut self) {
        self.status.rx_error = true;
        self.receiver = None;
    }

    fn arm(&mut self, armed_at: f64) {
        let deadline = match self.rx_timeout_uus {
            0 => None,
            uus => Some(armed_at + uus as f64 * UUS_TO_DTU as f64),
        };
        self.receiver = Some(Receiver { armed_at, deadline });
    }

    fn update(&mut self, now: f64) {
        if let Some(done) = self.tx_done_at {
            if now >= done {
                self.status.tx_done = true;
                self.tx_done_at = None;
            }
        }

        let receiver = match self.receiver {
            Some(receiver) => receiver,
            None => return,
        };

        let air = self.air.borrow();
        let tof = air.tof;
        let caught = air
            .transmissions
            .iter()
            .enumerate()
            .skip(self.cursor)
            .filter(|(_, transmission)| transmission.from != self.id)
            .map(|(i, transmission)| {
                let arrival = transmission.departs + tof + ANTENNA_DELAY;
                (i, arrival, transmission.bytes.clone())
            })
            .find(|(_, arrival, _)| {
                *arrival >= receiver.armed_at
                    && *arrival <= now
                    && receiver.deadline.map_or(true, |deadline| *arrival <= deadline)
            });
        drop(air);

        match caught {
            Some((i, arrival, bytes)) => {
                self.cursor = i + 1;
                self.rx_data = bytes;
                self.rx_timestamp = Some(self.clock.local(arrival));
                self.status.frame_good = true;
                self.receiver = None;
            }
            None => {
                if let Some(deadline) = receiver.deadline {
                    if now >= deadline {
                        self.status.rx_timeout = true;
                        self.receiver = None;
                    }
                }
            }
        }
    }
}

impl Transceiver for SimRadio {
    type Error = SimError;

    fn configure(&mut self, config: &RadioConfig) -> Result<(), Self::Error> {
        self.configured = Some(*config);
        Ok(())
    }

    fn set_antenna_delay(&mut self, tx: u16, rx: u16) -> Result<(), Self::Error> {
        self.antenna_delay = Some((tx, rx));
        Ok(())
    }

    fn set_leds(&mut self, mask: u8) -> Result<(), Self::Error> {
        self.leds = Some(mask);
        Ok(())
    }

    fn write_tx(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.tx_buf = data.to_vec();
        Ok(())
    }

    fn start_tx(&mut self, mode: StartMode, response_expected: bool) -> Result<(), Self::Error> {
        if self.fail_tx {
            return Err(SimError::Busy);
        }
        let now = self.air.borrow().now;

        let (tx_true, timestamp) = match mode {
            StartMode::Immediate => (now, self.clock.local(now)),
            StartMode::Delayed => {
                let target = self
                    .delayed_tx_time
                    .ok_or(SimError::DelayedTxLate)?
                    .delayed_tx_granular();
                let delta = (target.value() as f64 - self.clock.exact(now)).rem_euclid(WRAP);
                if delta > WRAP / 2.0 {
                    return Err(SimError::DelayedTxLate);
                }
                (now + delta / (1.0 + self.clock.drift), target.value())
            }
        };

        self.air.borrow_mut().transmissions.push(Transmission {
            from: self.id,
            departs: tx_true + ANTENNA_DELAY,
            bytes: self.tx_buf.clone(),
        });
        self.tx_done_at = Some(tx_true);
        self.tx_timestamp = Some(timestamp);

        self.receiver = None;
        if response_expected {
            let delay = self.rx_after_tx_uus as f64 * UUS_TO_DTU as f64;
            self.arm(tx_true + delay);
        }

        Ok(())
    }

    fn enable_rx(&mut self, _mode: StartMode) -> Result<(), Self::Error> {
        if self.fail_rx {
            return Err(SimError::Busy);
        }
        let now = self.air.borrow().now;
        self.arm(now);
        Ok(())
    }

    fn set_rx_timeout(&mut self, uus: u16) -> Result<(), Self::Error> {
        self.rx_timeout_uus = uus;
        Ok(())
    }

    fn set_rx_after_tx_delay(&mut self, uus: u32) -> Result<(), Self::Error> {
        self.rx_after_tx_uus = uus;
        Ok(())
    }

    fn set_delayed_tx_time(&mut self, time: Instant) -> Result<(), Self::Error> {
        self.delayed_tx_time = Some(time);
        Ok(())
    }

    fn read_status(&mut self) -> Result<Status, Self::Error> {
        let now = {
            let mut air = self.air.borrow_mut();
            air.now += air.step;
            air.now
        };
        self.update(now);

        Ok(self.status)
    }

    fn clear_status(&mut self, status: Status) -> Result<(), Self::Error> {
        self.status.frame_good &= !status.frame_good;
        self.status.rx_timeout &= !status.rx_timeout;
        self.status.rx_error &= !status.rx_error;
        self.status.tx_done &= !status.tx_done;
        Ok(())
    }

    fn read_rx_data(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        // The hardware hands out the FCS along with the frame.
        let mut data = self.rx_data.clone();
        data.extend_from_slice(&[0xde, 0xad]);

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn read_tx_timestamp(&mut self) -> Result<Instant, Self::Error> {
        self.tx_timestamp
            .map(Instant::from_register)
            .ok_or(SimError::NoTimestamp)
    }

    fn read_rx_timestamp(&mut self) -> Result<Instant, Self::Error> {
        self.rx_timestamp
            .map(Instant::from_register)
            .ok_or(SimError::NoTimestamp)
    }
}

/// A timer that expires after a fixed number of `wait` calls
#[derive(Debug, Default)]
pub struct MockTimer {
    pub started_with: Option<u32>,
    pub waits_left: u32,
    pub budget: u32,
}

impl MockTimer {
    pub fn new(budget: u32) -> Self {
        MockTimer {
            started_with: None,
            waits_left: budget,
            budget,
        }
    }
}

impl CountDown for MockTimer {
    type Time = u32;

    fn start<T>(&mut self, count: T)
    where
        T: Into<Self::Time>,
    {
        self.started_with = Some(count.into());
        self.waits_left = self.budget;
    }

    fn wait(&mut self) -> nb::Result<(), Void> {
        if self.waits_left == 0 {
            return Ok(());
        }
        self.waits_left -= 1;
        Err(nb::Error::WouldBlock)
    }
}

/// Records how long it was asked to sleep
#[derive(Debug, Default)]
pub struct MockDelay {
    pub total_ms: u32,
    pub calls: u32,
}

impl DelayMs<u32> for MockDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.total_ms += ms;
        self.calls += 1;
    }
}

pub const TAG_ID: u64 = 0x0102_0304_0506_0708;

pub fn tag_config() -> Config {
    Config {
        device_id: dw1000_twr::mac::ExtendedAddress(TAG_ID),
        ..Config::default()
    }
}

pub fn anchor_config() -> Config {
    Config::default()
}
