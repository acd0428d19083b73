//! Configuration structs for the radio and the ranging protocol
//!
//! Everything here is static configuration. The defaults carry the values the
//! anchor and tag firmware were deployed with; override individual fields with
//! struct update syntax.

use crate::mac;

/// Capacity of an anchor's device registry
pub const MAX_DEVICES: usize = 4;

/// Speed of light in air, in meters per second
pub const SPEED_OF_LIGHT: f64 = 299_702_547.0;

/// Radio configuration, passed to the transceiver driver on init
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RadioConfig {
    /// The channel used for sending and receiving
    pub channel: UwbChannel,
    /// The pulse repetition frequency
    pub pulse_repetition_frequency: PulseRepetitionFrequency,
    /// The length of the transmitted preamble
    pub preamble_length: PreambleLength,
    /// Preamble acquisition chunk size, used in RX only
    pub pac_size: PacSize,
    /// The preamble code used when transmitting
    pub tx_preamble_code: u8,
    /// The preamble code expected when receiving
    pub rx_preamble_code: u8,
    /// The SFD sequence
    pub sfd_sequence: SfdSequence,
    /// The data rate
    pub bitrate: BitRate,
    /// The PHY header mode
    pub phr_mode: PhrMode,
    /// SFD timeout (preamble length + 1 + SFD length - PAC size), in symbols
    pub sfd_timeout: u16,
}

impl Default for RadioConfig {
    fn default() -> Self {
        RadioConfig {
            channel: UwbChannel::Channel5,
            pulse_repetition_frequency: PulseRepetitionFrequency::Mhz64,
            preamble_length: PreambleLength::Symbols128,
            pac_size: PacSize::Symbols8,
            tx_preamble_code: 9,
            rx_preamble_code: 9,
            sfd_sequence: SfdSequence::Decawave,
            bitrate: BitRate::Kbps6800,
            phr_mode: PhrMode::Standard,
            sfd_timeout: 129,
        }
    }
}

impl RadioConfig {
    /// Checks the combination of settings
    ///
    /// Preamble codes are only valid for some channel/PRF combinations (user
    /// manual, table 61), and a zero SFD timeout would disable reception
    /// altogether.
    pub fn is_valid(&self) -> bool {
        let codes = self
            .channel
            .preamble_codes(self.pulse_repetition_frequency);

        self.sfd_timeout != 0
            && codes.contains(&self.tx_preamble_code)
            && codes.contains(&self.rx_preamble_code)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
/// The bitrate at which a message is transmitted
pub enum BitRate {
    /// 110 kilobits per second.
    /// This is an unofficial extension from decawave.
    Kbps110 = 0b00,
    /// 850 kilobits per second.
    Kbps850 = 0b01,
    /// 6.8 megabits per second.
    Kbps6800 = 0b10,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
/// The PRF value
pub enum PulseRepetitionFrequency {
    /// 16 megahertz
    Mhz16 = 0b01,
    /// 64 megahertz
    Mhz64 = 0b10,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
/// An enum that specifies the length of the preamble.
///
/// Longer preambles improve the reception quality and thus range.
/// This comes at the cost of longer transmission times and thus power consumption and bandwidth use.
pub enum PreambleLength {
    /// 64 symbols of preamble.
    Symbols64 = 0b0001,
    /// 128 symbols of preamble.
    Symbols128 = 0b0101,
    /// 256 symbols of preamble.
    Symbols256 = 0b1001,
    /// 512 symbols of preamble.
    Symbols512 = 0b1101,
    /// 1024 symbols of preamble.
    Symbols1024 = 0b0010,
    /// 1536 symbols of preamble.
    Symbols1536 = 0b0110,
    /// 2048 symbols of preamble.
    Symbols2048 = 0b1010,
    /// 4096 symbols of preamble.
    Symbols4096 = 0b0011,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
/// Preamble acquisition chunk size
pub enum PacSize {
    /// 8 symbols
    Symbols8,
    /// 16 symbols
    Symbols16,
    /// 32 symbols
    Symbols32,
    /// 64 symbols
    Symbols64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
/// The SFD sequence that is used to transmit a frame.
pub enum SfdSequence {
    /// The standard sequence defined by the IEEE standard.
    /// Most likely the best choice for 6.8 Mbps connections.
    IEEE,
    /// A sequence defined by Decawave that is supposed to be more robust.
    /// This is an unofficial addition.
    /// Most likely the best choice for 110 Kbps connections.
    Decawave,
    /// A sequence defined by Decawave that is supposed to be more robust.
    /// This is an unofficial addition.
    /// Most likely the best choice for 850 Kbps connections.
    DecawaveAlt,
    /// Uses the sequence that is programmed in by the user.
    /// This is an unofficial addition.
    User,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
/// PHY header mode
pub enum PhrMode {
    /// Standard frames, up to 127 bytes
    Standard,
    /// Proprietary long frames, up to 1023 bytes
    Extended,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
/// All the available UWB channels.
///
/// Note that while a channel may have more bandwidth than ~900 Mhz, the DW1000 can only send up to ~900 Mhz
pub enum UwbChannel {
    /// Channel 1
    /// - Center frequency: 3494.4 Mhz
    /// - Bandwidth: 499.2 Mhz
    /// - Preamble Codes (16 MHz PRF) : 1, 2
    /// - Preamble Codes (64 MHz PRF) : 9, 10, 11, 12
    Channel1 = 1,
    /// Channel 2
    /// - Center frequency: 3993.6 Mhz
    /// - Bandwidth: 499.2 Mhz
    /// - Preamble Codes (16 MHz PRF) : 3, 4
    /// - Preamble Codes (64 MHz PRF) : 9, 10, 11, 12
    Channel2 = 2,
    /// Channel 3
    /// - Center frequency: 4492.8 Mhz
    /// - Bandwidth: 499.2 Mhz
    /// - Preamble Codes (16 MHz PRF) : 5, 6
    /// - Preamble Codes (64 MHz PRF) : 9, 10, 11, 12
    Channel3 = 3,
    /// Channel 4
    /// - Center frequency: 3993.6 Mhz
    /// - Bandwidth: 1331.2 Mhz
    /// - Preamble Codes (16 MHz PRF) : 7, 8
    /// - Preamble Codes (64 MHz PRF) : 17, 18, 19, 20
    Channel4 = 4,
    /// Channel 5
    /// - Center frequency: 6489.6 Mhz
    /// - Bandwidth: 499.2 Mhz
    /// - Preamble Codes (16 MHz PRF) : 3, 4
    /// - Preamble Codes (64 MHz PRF) : 9, 10, 11, 12
    Channel5 = 5,
    /// Channel 7
    /// - Center frequency: 6489.6 Mhz
    /// - Bandwidth: 1081.6 Mhz
    /// - Preamble Codes (16 MHz PRF) : 7, 8
    /// - Preamble Codes (64 MHz PRF) : 17, 18, 19, 20
    Channel7 = 7,
}

impl UwbChannel {
    /// Gets the preamble codes that may be used with this channel and PRF
    pub fn preamble_codes(&self, prf: PulseRepetitionFrequency) -> &'static [u8] {
        use PulseRepetitionFrequency::*;
        use UwbChannel::*;

        match (self, prf) {
            (Channel1, Mhz16) => &[1, 2],
            (Channel2, Mhz16) | (Channel5, Mhz16) => &[3, 4],
            (Channel3, Mhz16) => &[5, 6],
            (Channel4, Mhz16) | (Channel7, Mhz16) => &[7, 8],
            (Channel4, Mhz64) | (Channel7, Mhz64) => &[17, 18, 19, 20],
            (_, Mhz64) => &[9, 10, 11, 12],
        }
    }
}

/// Antenna delays, in device time units
///
/// The radio itself is programmed with zero delay, so that timestamps stay
/// raw. These values are subtracted from the time of flight instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AntennaDelay {
    /// Delay between the TX timestamp and the signal leaving the antenna
    pub tx: u16,
    /// Delay between the signal reaching the antenna and the RX timestamp
    pub rx: u16,
}

impl AntennaDelay {
    /// The total correction for one leg of an exchange
    pub fn total(&self) -> u32 {
        self.tx as u32 + self.rx as u32
    }
}

impl Default for AntennaDelay {
    fn default() -> Self {
        AntennaDelay {
            tx: 16436,
            rx: 16436,
        }
    }
}

/// Protocol configuration for an anchor or a tag
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Config {
    /// The network all participating devices share
    pub pan_id: mac::PanId,

    /// The anchor's own short address
    ///
    /// Sent as the source of RangingInit frames. Ignored by tags, which use
    /// the short id assigned during discovery.
    pub address: mac::ShortAddress,

    /// The tag's 64-bit identity, announced in Blink frames
    pub device_id: mac::ExtendedAddress,

    /// Channel, PRF and preamble settings
    pub radio: RadioConfig,

    /// Antenna delay correction
    pub antenna_delay: AntennaDelay,

    /// LED mask written at init
    pub leds: u8,

    /// Delay between a frame being received and the reply being sent, in UWB
    /// microseconds
    ///
    /// The anchor announces this value in RangingInit frames, and both sides
    /// use it to schedule their delayed transmissions.
    pub response_delay_uus: u16,

    /// Delay between the end of a transmission and the receiver turning on
    pub tx_to_rx_delay_uus: u32,

    /// How long the receiver waits for a frame before reporting a timeout
    pub rx_timeout_uus: u16,

    /// Sleep period between two failed attempts, in milliseconds
    pub retry_period_ms: u32,

    /// Upper bound for one blocking attempt, in timer ticks (microseconds on
    /// the usual 1 MHz timers)
    pub attempt_timeout: u32,

    /// Distances above this are reported as implausible
    pub max_distance_m: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pan_id: mac::PanId(0x6380),
            address: mac::ShortAddress(0x00ac),
            device_id: mac::ExtendedAddress(0x0001),
            radio: RadioConfig::default(),
            antenna_delay: AntennaDelay::default(),
            leds: 3,
            response_delay_uus: 6000,
            tx_to_rx_delay_uus: 60,
            rx_timeout_uus: 10_000,
            retry_period_ms: 500,
            attempt_timeout: 100_000,
            max_distance_m: 300.0,
        }
    }
}
