//! Double-sided two-way ranging between a UWB anchor and a tag
//!
//! This crate implements the protocol side of distance measurement with a
//! DW1000-class transceiver: discovery of a tag by an anchor, the
//! Poll/Response/Final exchange, and the time-of-flight computation. Talking to
//! the radio itself is left to a driver, which plugs in by implementing
//! [`Transceiver`].
//!
//! A measurement runs in two phases:
//! 1. Discovery. The tag broadcasts a [`Body::Blink`]. An anchor that has room
//!    in its [`DeviceRegistry`] answers with a RangingInit, assigning the tag a
//!    short id and announcing the response delay both sides will use.
//! 2. Ranging. The tag sends a Poll, the anchor a Response, and the tag a Final
//!    carrying its own round-trip and reply times. The anchor combines those
//!    with its local timestamps, cancelling out the clock offset between the
//!    two radios.
//!
//! [`Tag`] and [`Anchor`] tie the phases together. Both can be advanced one
//! step at a time with `poll`, or run to completion with `run`.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]


pub use embedded_hal;
pub use ieee802154::mac;
pub use nb;

pub mod configs;
pub mod discovery;
pub mod frame;
pub mod hl;
pub mod node;
pub mod ranging;
pub mod registry;
pub mod time;
pub mod timestamps;
pub mod tof;
pub mod util;


pub use crate::{
    configs::{Config, RadioConfig, MAX_DEVICES},
    frame::{Body, DecodeError, Frame, FrameType},
    hl::{Error, Message, Radio, SendTime, Status, Transceiver},
    node::{Anchor, Tag},
    registry::{DeviceRegistry, RegistryFull},
    time::{Duration, Instant, TIME_MAX},
    tof::{RangingError, RangingResult},
};

/// 64-bit identity of a tag
pub type DeviceId = mac::ExtendedAddress;

/// 16-bit id an anchor assigns to a tag for the length of a session
pub type ShortId = mac::ShortAddress;
