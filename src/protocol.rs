use crate::{
    crc::{crc, ChecksumFn},
    error::{MowerError, Result},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// First byte of every frame
pub const START_MARKER: u8 = 0x02;

/// Link-type byte following the start marker
pub const LINK_TYPE: u8 = 0xFD;

/// Last byte of every frame
pub const END_MARKER: u8 = 0x03;

/// Fixed marker preceding the opcode in command frames
pub const COMMAND_MARKER: u8 = 0xAF;

/// Link flag carried by command frames
pub const LINKED: u8 = 0x01;

/// Bytes preceding the payload in a request frame
pub const REQUEST_HEADER_SIZE: usize = 18;

/// Bytes preceding the payload in a response frame
pub const RESPONSE_HEADER_SIZE: usize = 19;

/// Trailing checksum plus end marker
pub const TRAILER_SIZE: usize = 2;

/// Bytes of a frame not counted by the length field (start, link type, trailer)
pub const UNCOUNTED_BYTES: usize = 4;

/// Largest payload a request frame can carry.
///
/// Bounded by the one-byte length field: `len = total - 4 = 16 + payload`.
pub const MAX_REQUEST_PAYLOAD: usize = u8::MAX as usize - (REQUEST_HEADER_SIZE + TRAILER_SIZE - UNCOUNTED_BYTES);

/// Header checksum covers bytes `1..=8`
const HEADER_CRC_START: usize = 1;
const HEADER_CRC_END: usize = 8;
const HEADER_CRC_OFFSET: usize = 9;

/// Packet type carried at byte 10 of command frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Client to device
    Request = 0,
    /// Device answer to a request
    Response = 1,
    /// Unsolicited device event
    Event = 2,
}

impl PacketType {
    /// Convert from u8
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Request),
            1 => Some(Self::Response),
            2 => Some(Self::Event),
            _ => None,
        }
    }
}

/// Result code reported by the device at byte 16 of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// Command executed
    Ok,
    /// Unspecified failure
    UnknownError,
    /// A parameter value was rejected
    InvalidValue,
    /// A parameter was outside its allowed range
    OutOfRange,
    /// Function not available on this model
    NotAvailable,
    /// Function not allowed in the current state
    NotAllowed,
    /// Invalid command group
    InvalidGroup,
    /// Invalid command id
    InvalidId,
    /// Device is busy
    DeviceBusy,
    /// PIN was rejected
    InvalidPin,
    /// Mower is blocked
    MowerBlocked,
    /// Code not known to this library
    Unknown(u8),
}

impl From<u8> for ResultCode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::UnknownError,
            2 => Self::InvalidValue,
            3 => Self::OutOfRange,
            4 => Self::NotAvailable,
            5 => Self::NotAllowed,
            6 => Self::InvalidGroup,
            7 => Self::InvalidId,
            8 => Self::DeviceBusy,
            9 => Self::InvalidPin,
            10 => Self::MowerBlocked,
            other => Self::Unknown(other),
        }
    }
}

impl From<ResultCode> for u8 {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::Ok => 0,
            ResultCode::UnknownError => 1,
            ResultCode::InvalidValue => 2,
            ResultCode::OutOfRange => 3,
            ResultCode::NotAvailable => 4,
            ResultCode::NotAllowed => 5,
            ResultCode::InvalidGroup => 6,
            ResultCode::InvalidId => 7,
            ResultCode::DeviceBusy => 8,
            ResultCode::InvalidPin => 9,
            ResultCode::MowerBlocked => 10,
            ResultCode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::UnknownError => write!(f, "UNKNOWN_ERROR"),
            Self::InvalidValue => write!(f, "INVALID_VALUE"),
            Self::OutOfRange => write!(f, "OUT_OF_RANGE"),
            Self::NotAvailable => write!(f, "NOT_AVAILABLE"),
            Self::NotAllowed => write!(f, "NOT_ALLOWED"),
            Self::InvalidGroup => write!(f, "INVALID_GROUP"),
            Self::InvalidId => write!(f, "INVALID_ID"),
            Self::DeviceBusy => write!(f, "DEVICE_BUSY"),
            Self::InvalidPin => write!(f, "INVALID_PIN"),
            Self::MowerBlocked => write!(f, "MOWER_BLOCKED"),
            Self::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Decoded fixed header of a response frame
///
/// Layout discovered from captured traffic:
/// - Byte 0: start marker `0x02`, byte 1: link type `0xFD`
/// - Byte 2: length (total frame bytes minus 4), byte 3: reserved `0x00`
/// - Bytes 4-7: channel id (u32 little-endian)
/// - Byte 8: link flag, byte 9: header checksum over bytes 1-8
/// - Byte 10: packet type, byte 11: command marker `0xAF`
/// - Bytes 12-13: opcode major (u16 little-endian), byte 14: opcode minor
/// - Byte 15: reserved, byte 16: result code
/// - Bytes 17-18: payload length (u16 little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Declared length byte
    pub length: u8,
    /// Channel id the frame is bound to
    pub channel_id: u32,
    /// Link flag
    pub link_flag: u8,
    /// Header checksum as received
    pub header_crc: u8,
    /// Raw packet type byte
    pub packet_type: u8,
    /// Opcode major
    pub major: u16,
    /// Opcode minor
    pub minor: u8,
    /// Result code
    pub result: ResultCode,
    /// Declared payload length
    pub payload_len: u16,
}

impl ResponseHeader {
    /// Parse the header fields without validating them
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::MalformedFrame`] if fewer than
    /// [`RESPONSE_HEADER_SIZE`] bytes are available.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < RESPONSE_HEADER_SIZE {
            return Err(MowerError::MalformedFrame(format!(
                "Response too short: {} bytes, expected at least {}",
                data.len(),
                RESPONSE_HEADER_SIZE
            )));
        }

        let mut buf = &data[2..RESPONSE_HEADER_SIZE];
        let length = buf.get_u8();
        buf.advance(1);
        let channel_id = buf.get_u32_le();
        let link_flag = buf.get_u8();
        let header_crc = buf.get_u8();
        let packet_type = buf.get_u8();
        buf.advance(1);
        let major = buf.get_u16_le();
        let minor = buf.get_u8();
        buf.advance(1);
        let result = ResultCode::from(buf.get_u8());
        let payload_len = buf.get_u16_le();

        Ok(Self {
            length,
            channel_id,
            link_flag,
            header_crc,
            packet_type,
            major,
            minor,
            result,
            payload_len,
        })
    }
}

/// Total frame size announced by the length byte, once byte 2 has arrived
#[must_use]
pub fn frame_len(data: &[u8]) -> Option<usize> {
    data.get(2).map(|&len| usize::from(len) + UNCOUNTED_BYTES)
}

/// Result code of a response frame
#[must_use]
pub fn result_code(data: &[u8]) -> Option<ResultCode> {
    data.get(16).copied().map(ResultCode::from)
}

/// Declared-length payload region following the response header
///
/// Independent of validation, clamped to the bytes actually present.
#[must_use]
pub fn payload_slice(data: &[u8]) -> &[u8] {
    if data.len() <= RESPONSE_HEADER_SIZE {
        return &[];
    }
    let declared = usize::from(u16::from_le_bytes([data[17], data[18]]));
    let end = (RESPONSE_HEADER_SIZE + declared).min(data.len());
    &data[RESPONSE_HEADER_SIZE..end]
}

/// Builds and checks frames for one checksum algorithm
#[derive(Clone, Copy)]
pub struct FrameCodec {
    checksum: ChecksumFn,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self { checksum: crc }
    }
}

impl fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCodec").finish_non_exhaustive()
    }
}

impl FrameCodec {
    /// Codec using a custom checksum function
    #[must_use]
    pub const fn with_checksum(checksum: ChecksumFn) -> Self {
        Self { checksum }
    }

    /// Build a request frame
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::Encoding`] if the payload exceeds
    /// [`MAX_REQUEST_PAYLOAD`] bytes.
    pub fn encode_request(
        &self,
        channel_id: u32,
        major: u16,
        minor: u8,
        payload: &[u8],
    ) -> Result<Bytes> {
        if payload.len() > MAX_REQUEST_PAYLOAD {
            return Err(MowerError::Encoding(format!(
                "Payload of {} bytes exceeds maximum of {MAX_REQUEST_PAYLOAD}",
                payload.len()
            )));
        }
        let payload_len = u8::try_from(payload.len())
            .map_err(|e| MowerError::Encoding(format!("Payload length: {e}")))?;

        let mut buf = BytesMut::with_capacity(REQUEST_HEADER_SIZE + payload.len() + TRAILER_SIZE);
        Self::put_preamble(&mut buf, channel_id, LINKED);
        buf.put_u8(PacketType::Request as u8);
        buf.put_u8(COMMAND_MARKER);
        buf.put_u16_le(major);
        buf.put_u8(minor);
        buf.put_u8(0x00);
        buf.put_u8(payload_len);
        buf.put_u8(0x00);
        buf.extend_from_slice(payload);

        Ok(self.seal(buf))
    }

    /// Build a response frame as the device would send it
    ///
    /// Used by device simulators and tests.
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::Encoding`] if the frame does not fit the length byte.
    pub fn encode_response(
        &self,
        channel_id: u32,
        major: u16,
        minor: u8,
        result: ResultCode,
        payload: &[u8],
    ) -> Result<Bytes> {
        let counted = RESPONSE_HEADER_SIZE + payload.len() + TRAILER_SIZE - UNCOUNTED_BYTES;
        if counted > usize::from(u8::MAX) {
            return Err(MowerError::Encoding(format!(
                "Response payload of {} bytes does not fit the length field",
                payload.len()
            )));
        }
        let payload_len = u16::try_from(payload.len())
            .map_err(|e| MowerError::Encoding(format!("Payload length: {e}")))?;

        let mut buf = BytesMut::with_capacity(RESPONSE_HEADER_SIZE + payload.len() + TRAILER_SIZE);
        Self::put_preamble(&mut buf, channel_id, LINKED);
        buf.put_u8(PacketType::Response as u8);
        buf.put_u8(COMMAND_MARKER);
        buf.put_u16_le(major);
        buf.put_u8(minor);
        buf.put_u8(0x00);
        buf.put_u8(result.into());
        buf.put_u16_le(payload_len);
        buf.extend_from_slice(payload);

        Ok(self.seal(buf))
    }

    /// First frame of the connect sequence, announcing a new channel id
    #[must_use]
    pub fn setup_channel_frame(&self, channel_id: u32) -> Bytes {
        let mut buf = BytesMut::with_capacity(26);
        Self::put_preamble(&mut buf, 0, 0x00);
        buf.put_u8(0x14);
        buf.put_u32_le(channel_id);
        buf.put_u32_le(0);
        buf.extend_from_slice(b"Main\0");
        self.seal(buf)
    }

    /// Handshake frame, sent once the channel id has been accepted
    #[must_use]
    pub fn handshake_frame(&self, channel_id: u32) -> Bytes {
        let mut buf = BytesMut::with_capacity(14);
        Self::put_preamble(&mut buf, channel_id, 0x00);
        buf.put_u8(0x08);
        buf.put_u8(0x01);
        self.seal(buf)
    }

    /// Whether a response passes strict validation
    ///
    /// Never fails: real devices send frames that fail these checks yet still
    /// carry a usable payload, so the caller decides what to do with `false`.
    #[must_use]
    pub fn validate_response(
        &self,
        data: &[u8],
        channel_id: u32,
        major: u16,
        minor: u8,
    ) -> bool {
        self.check_response(data, channel_id, major, minor).is_ok()
    }

    /// Strict response validation reporting the first failed check
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::MalformedFrame`] describing the mismatch, or
    /// [`MowerError::DeviceResult`] for a non-OK result code.
    pub fn check_response(&self, data: &[u8], channel_id: u32, major: u16, minor: u8) -> Result<()> {
        let header = ResponseHeader::parse(data)?;

        if data[0] != START_MARKER || data[1] != LINK_TYPE || data[3] != 0x00 {
            return Err(MowerError::MalformedFrame("Bad start markers".to_string()));
        }
        if header.channel_id != channel_id {
            return Err(MowerError::MalformedFrame(format!(
                "Channel id {:#010x} does not match session channel {channel_id:#010x}",
                header.channel_id
            )));
        }
        if header.link_flag != LINKED {
            return Err(MowerError::MalformedFrame(format!(
                "Unsupported link flag {:#04x}",
                header.link_flag
            )));
        }
        let expected_crc = (self.checksum)(data, HEADER_CRC_START, HEADER_CRC_END);
        if header.header_crc != expected_crc {
            return Err(MowerError::MalformedFrame(format!(
                "Header checksum {:#04x}, expected {expected_crc:#04x}",
                header.header_crc
            )));
        }
        if PacketType::from_u8(header.packet_type) != Some(PacketType::Response) {
            return Err(MowerError::MalformedFrame(format!(
                "Packet type {} is not a response",
                header.packet_type
            )));
        }
        if data[11] != COMMAND_MARKER || data[15] != 0x00 {
            return Err(MowerError::MalformedFrame("Bad command marker".to_string()));
        }
        if header.major != major || header.minor != minor {
            return Err(MowerError::MalformedFrame(format!(
                "Opcode ({}, {}) does not match request ({major}, {minor})",
                header.major, header.minor
            )));
        }
        if header.result != ResultCode::Ok {
            return Err(MowerError::DeviceResult {
                code: header.result,
            });
        }
        if RESPONSE_HEADER_SIZE + usize::from(header.payload_len) + TRAILER_SIZE != data.len() {
            return Err(MowerError::MalformedFrame(format!(
                "Payload length {} inconsistent with frame of {} bytes",
                header.payload_len,
                data.len()
            )));
        }

        self.check_envelope(data)
    }

    /// Checks shared by every frame: markers, length byte and trailing checksum
    ///
    /// # Errors
    ///
    /// Returns [`MowerError::MalformedFrame`] describing the mismatch.
    pub fn check_envelope(&self, data: &[u8]) -> Result<()> {
        if data.len() < UNCOUNTED_BYTES + 1 {
            return Err(MowerError::MalformedFrame(format!(
                "Frame too short: {} bytes",
                data.len()
            )));
        }
        if data[0] != START_MARKER || data[1] != LINK_TYPE {
            return Err(MowerError::MalformedFrame("Bad start markers".to_string()));
        }
        if frame_len(data) != Some(data.len()) {
            return Err(MowerError::MalformedFrame(format!(
                "Length byte announces {} bytes, frame has {}",
                usize::from(data[2]) + UNCOUNTED_BYTES,
                data.len()
            )));
        }
        let last = data.len() - 1;
        if data[last] != END_MARKER {
            return Err(MowerError::MalformedFrame(format!(
                "End marker {:#04x}",
                data[last]
            )));
        }
        let expected_crc = (self.checksum)(data, 1, last - TRAILER_SIZE);
        if data[last - 1] != expected_crc {
            return Err(MowerError::MalformedFrame(format!(
                "Trailing checksum {:#04x}, expected {expected_crc:#04x}",
                data[last - 1]
            )));
        }
        Ok(())
    }

    /// Bytes 0-9: markers, length and checksum placeholders, channel id, link flag
    fn put_preamble(buf: &mut BytesMut, channel_id: u32, link_flag: u8) {
        buf.put_u8(START_MARKER);
        buf.put_u8(LINK_TYPE);
        buf.put_u8(0x00);
        buf.put_u8(0x00);
        buf.put_u32_le(channel_id);
        buf.put_u8(link_flag);
        buf.put_u8(0x00);
    }

    /// Fill in the length byte and header checksum, append trailer
    fn seal(&self, mut buf: BytesMut) -> Bytes {
        // Length counts everything but the start, link type and trailer bytes.
        buf[2] = u8::try_from(buf.len() - 2).unwrap_or(u8::MAX);
        buf[HEADER_CRC_OFFSET] = (self.checksum)(&buf, HEADER_CRC_START, HEADER_CRC_END);
        let trailing = (self.checksum)(&buf, 1, buf.len() - 1);
        buf.put_u8(trailing);
        buf.put_u8(END_MARKER);
        buf.freeze()
    }
}
