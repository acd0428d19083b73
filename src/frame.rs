//! Wire format of the ranging frames
//!
//! Five frame types take part in an exchange. Discovery uses an IEEE 802.15.4e
//! blink and a RangingInit reply; ranging uses Poll, Response and Final data
//! frames with 16-bit addressing. All multi-byte fields are little-endian.
//!
//! | Frame       | Layout                                                      |
//! |-------------|-------------------------------------------------------------|
//! | Blink       | `C5 seq id[8]`                                              |
//! | RangingInit | `41 8C seq pan[2] dest[8] src[2] 20 short_id[2] delay[2]`   |
//! | Poll        | `41 88 seq pan[2] dest[2] src[2] 61`                        |
//! | Response    | `41 88 seq pan[2] dest[2] src[2] 50`                        |
//! | Final       | `41 88 seq pan[2] dest[2] src[2] 69 dt1[4] dt2[4]`          |
//!
//! The two-byte FCS the transceiver appends is not part of these layouts.
//! Received buffers that still contain it, or are otherwise longer than the
//! frame, are cut to the frame's fixed length.

use byte::{BytesExt as _, TryRead, TryWrite, LE};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::{mac, DeviceId, ShortId};

/// Largest frame the receive buffer has to hold
pub const FRAME_LEN_MAX: usize = 127;

const BLINK: u8 = 0xc5;
const DATA: u8 = 0x41;
/// Frame control byte 1: extended destination, short source
const CONTROL_INIT: u8 = 0x8c;
/// Frame control byte 1: short destination, short source
const CONTROL_SHORT: u8 = 0x88;

/// Offset of the function code in RangingInit frames
const FUNCTION_CODE_INIT: usize = 15;
/// Offset of the function code in short-addressed frames
const FUNCTION_CODE_SHORT: usize = 9;

/// Identifies the frame carried by a data frame
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
enum FunctionCode {
    RangingInit = 0x20,
    Response = 0x50,
    Poll = 0x61,
    Final = 0x69,
}

/// The five kinds of frames
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FrameType {
    /// Discovery broadcast from a tag
    Blink,
    /// Anchor's reply to a blink
    RangingInit,
    /// First ranging message, tag to anchor
    Poll,
    /// Second ranging message, anchor to tag
    Response,
    /// Third ranging message, tag to anchor
    Final,
}

impl FrameType {
    /// The fixed length of frames of this type, without FCS
    pub fn len(&self) -> usize {
        match self {
            FrameType::Blink => 10,
            FrameType::RangingInit => 20,
            FrameType::Poll | FrameType::Response => 10,
            FrameType::Final => 18,
        }
    }

    /// Determines the frame type from the header bytes and function code
    fn identify(bytes: &[u8]) -> Result<Self, DecodeError> {
        let hdr0 = *bytes.first().ok_or(DecodeError::Truncated)?;
        if hdr0 == BLINK {
            return Ok(FrameType::Blink);
        }
        if hdr0 != DATA {
            return Err(DecodeError::UnknownType);
        }

        let offset = match *bytes.get(1).ok_or(DecodeError::Truncated)? {
            CONTROL_INIT => FUNCTION_CODE_INIT,
            CONTROL_SHORT => FUNCTION_CODE_SHORT,
            _ => return Err(DecodeError::UnknownType),
        };
        let code = *bytes.get(offset).ok_or(DecodeError::Truncated)?;
        let code =
            FunctionCode::try_from_primitive(code).map_err(|_| DecodeError::UnknownType)?;

        match (offset, code) {
            (FUNCTION_CODE_INIT, FunctionCode::RangingInit) => Ok(FrameType::RangingInit),
            (FUNCTION_CODE_SHORT, FunctionCode::Poll) => Ok(FrameType::Poll),
            (FUNCTION_CODE_SHORT, FunctionCode::Response) => Ok(FrameType::Response),
            (FUNCTION_CODE_SHORT, FunctionCode::Final) => Ok(FrameType::Final),
            _ => Err(DecodeError::UnknownType),
        }
    }
}

/// PAN and short addresses of a ranging data frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Addressing {
    /// The network both peers belong to
    pub pan_id: mac::PanId,
    /// The receiver
    pub destination: ShortId,
    /// The sender
    pub source: ShortId,
}

/// Payload of a RangingInit frame
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct InitPayload {
    /// The short id the anchor assigned to the tag
    pub short_id: u16,
    /// The response delay both peers use, in UWB microseconds
    pub response_delay: u16,
}

/// Payload of a Final frame
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct FinalPayload {
    /// Poll TX to Response RX, in tag time
    pub dt1: u32,
    /// Response RX to Final TX, in tag time
    pub dt2: u32,
}

/// The content of a frame, one variant per frame type
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Body {
    /// A tag announcing itself
    Blink {
        /// The tag's identity
        device_id: DeviceId,
    },
    /// An anchor admitting a tag
    RangingInit {
        /// The network the anchor belongs to
        pan_id: mac::PanId,
        /// The tag that sent the blink
        destination: DeviceId,
        /// The anchor's short address
        source: ShortId,
        /// Short id and response delay
        payload: InitPayload,
    },
    /// Opens a ranging exchange
    Poll(Addressing),
    /// Answers a poll
    Response(Addressing),
    /// Closes the exchange with the tag's measurements
    Final(Addressing, FinalPayload),
}

/// A ranging frame
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Frame {
    /// The sender's sequence number
    pub seq: u8,
    /// Type-specific content
    pub body: Body,
}

impl Frame {
    /// The type of this frame
    pub fn frame_type(&self) -> FrameType {
        match self.body {
            Body::Blink { .. } => FrameType::Blink,
            Body::RangingInit { .. } => FrameType::RangingInit,
            Body::Poll(_) => FrameType::Poll,
            Body::Response(_) => FrameType::Response,
            Body::Final(..) => FrameType::Final,
        }
    }

    /// The encoded length of this frame, without FCS
    pub fn len(&self) -> usize {
        self.frame_type().len()
    }

    /// The addresses of Poll, Response and Final frames
    pub fn addressing(&self) -> Option<Addressing> {
        match self.body {
            Body::Poll(addressing) | Body::Response(addressing) | Body::Final(addressing, _) => {
                Some(addressing)
            }
            _ => None,
        }
    }

    /// Writes the frame into `buf` and returns the number of bytes written
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, EncodeError> {
        let required_len = self.len();
        if buf.len() < required_len {
            return Err(EncodeError::BufferTooSmall { required_len });
        }

        let mut len = 0;
        buf.write_with(&mut len, *self, ())
            .map_err(|_| EncodeError::BufferTooSmall { required_len })?;

        Ok(len)
    }

    /// Reads a frame from `bytes`
    ///
    /// Anything beyond the frame's fixed length is ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let frame_type = FrameType::identify(bytes)?;
        let bytes = bytes
            .get(..frame_type.len())
            .ok_or(DecodeError::Truncated)?;

        Ok(bytes.read_with(&mut 0, frame_type)?)
    }
}

impl TryWrite for Frame {
    fn try_write(self, bytes: &mut [u8], _ctx: ()) -> byte::Result<usize> {
        let offset = &mut 0;

        match self.body {
            Body::Blink { device_id } => {
                bytes.write_with(offset, BLINK, LE)?;
                bytes.write_with(offset, self.seq, LE)?;
                bytes.write_with(offset, device_id.0, LE)?;
            }
            Body::RangingInit {
                pan_id,
                destination,
                source,
                payload,
            } => {
                bytes.write_with(offset, DATA, LE)?;
                bytes.write_with(offset, CONTROL_INIT, LE)?;
                bytes.write_with(offset, self.seq, LE)?;
                bytes.write_with(offset, pan_id.0, LE)?;
                bytes.write_with(offset, destination.0, LE)?;
                bytes.write_with(offset, source.0, LE)?;
                bytes.write_with(offset, u8::from(FunctionCode::RangingInit), LE)?;
                *offset += serialize(&mut bytes[*offset..], &payload)?;
            }
            Body::Poll(addressing) => {
                write_short_header(bytes, offset, self.seq, addressing, FunctionCode::Poll)?;
            }
            Body::Response(addressing) => {
                write_short_header(bytes, offset, self.seq, addressing, FunctionCode::Response)?;
            }
            Body::Final(addressing, payload) => {
                write_short_header(bytes, offset, self.seq, addressing, FunctionCode::Final)?;
                *offset += serialize(&mut bytes[*offset..], &payload)?;
            }
        }

        Ok(*offset)
    }
}

impl<'a> TryRead<'a, FrameType> for Frame {
    fn try_read(bytes: &'a [u8], frame_type: FrameType) -> byte::Result<(Self, usize)> {
        let offset = &mut 0;

        if frame_type == FrameType::Blink {
            let _: u8 = bytes.read_with(offset, LE)?;
            let seq = bytes.read_with(offset, LE)?;
            let device_id = mac::ExtendedAddress(bytes.read_with(offset, LE)?);

            return Ok((
                Frame {
                    seq,
                    body: Body::Blink { device_id },
                },
                *offset,
            ));
        }

        // Both frame control bytes were checked when identifying the frame.
        *offset += 2;
        let seq = bytes.read_with(offset, LE)?;
        let pan_id = mac::PanId(bytes.read_with(offset, LE)?);

        let body = if frame_type == FrameType::RangingInit {
            let destination = mac::ExtendedAddress(bytes.read_with(offset, LE)?);
            let source = mac::ShortAddress(bytes.read_with(offset, LE)?);
            *offset += 1;
            let payload = deserialize(bytes, offset)?;

            Body::RangingInit {
                pan_id,
                destination,
                source,
                payload,
            }
        } else {
            let addressing = Addressing {
                pan_id,
                destination: mac::ShortAddress(bytes.read_with(offset, LE)?),
                source: mac::ShortAddress(bytes.read_with(offset, LE)?),
            };
            *offset += 1;

            match frame_type {
                FrameType::Poll => Body::Poll(addressing),
                FrameType::Response => Body::Response(addressing),
                _ => Body::Final(addressing, deserialize(bytes, offset)?),
            }
        };

        Ok((Frame { seq, body }, *offset))
    }
}

fn write_short_header(
    bytes: &mut [u8],
    offset: &mut usize,
    seq: u8,
    addressing: Addressing,
    code: FunctionCode,
) -> byte::Result<()> {
    bytes.write_with(offset, DATA, LE)?;
    bytes.write_with(offset, CONTROL_SHORT, LE)?;
    bytes.write_with(offset, seq, LE)?;
    bytes.write_with(offset, addressing.pan_id.0, LE)?;
    bytes.write_with(offset, addressing.destination.0, LE)?;
    bytes.write_with(offset, addressing.source.0, LE)?;
    bytes.write_with(offset, u8::from(code), LE)?;

    Ok(())
}

fn serialize<T: Serialize>(bytes: &mut [u8], payload: &T) -> byte::Result<usize> {
    ssmarshal::serialize(bytes, payload).map_err(|_| byte::Error::Incomplete)
}

fn deserialize<T>(bytes: &[u8], offset: &mut usize) -> byte::Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let (payload, len) = ssmarshal::deserialize::<T>(&bytes[*offset..]).map_err(|error| {
        match error {
            ssmarshal::Error::EndOfStream => byte::Error::Incomplete,
            _ => byte::Error::BadInput {
                err: "invalid payload",
            },
        }
    })?;
    *offset += len;

    Ok(payload)
}

/// Returned from [`Frame::decode`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// The header and function code don't match any known frame
    UnknownType,

    /// The buffer is shorter than the frame's fixed length
    Truncated,

    /// The payload could not be deserialized
    InvalidPayload,
}

impl From<byte::Error> for DecodeError {
    fn from(error: byte::Error) -> Self {
        match error {
            byte::Error::BadInput { .. } => DecodeError::InvalidPayload,
            _ => DecodeError::Truncated,
        }
    }
}

/// Returned from [`Frame::encode`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EncodeError {
    /// The buffer can't hold the frame
    BufferTooSmall {
        /// Indicates how large a buffer would have been required
        required_len: usize,
    },
}
