//! LIFX LAN wire format.
//!
//! Every packet starts with a 36-byte little-endian header made of three
//! parts (frame, frame address, protocol header) followed by a payload whose
//! layout depends on the message type.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::device::{MacAddr, Result, TransportError};

/// Size of the packet header in bytes.
pub const HEADER_SIZE: usize = 36;
/// Protocol number carried by every packet.
pub const PROTOCOL: u16 = 1024;
/// Service identifier for UDP in StateService replies.
pub const SERVICE_UDP: u8 = 1;
/// Power level LIFX reports for a fully on device.
pub const LEVEL_ON: u16 = u16::MAX;

const LABEL_SIZE: usize = 32;
const ADDRESSABLE: u16 = 1 << 12;
const TAGGED: u16 = 1 << 13;
const RES_REQUIRED: u8 = 1;
const ACK_REQUIRED: u8 = 1 << 1;

/// Message type numbers.
pub mod message_type {
    pub const GET_SERVICE: u16 = 2;
    pub const STATE_SERVICE: u16 = 3;
    pub const GET_POWER: u16 = 20;
    pub const SET_POWER: u16 = 21;
    pub const STATE_POWER: u16 = 22;
    pub const GET_LABEL: u16 = 23;
    pub const STATE_LABEL: u16 = 25;
    pub const ACKNOWLEDGEMENT: u16 = 45;
    pub const GET_LOCATION: u16 = 48;
    pub const STATE_LOCATION: u16 = 50;
    pub const GET_GROUP: u16 = 51;
    pub const STATE_GROUP: u16 = 53;
}

/// Decoded packet payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    GetService,
    StateService { service: u8, port: u32 },
    GetPower,
    SetPower { level: u16 },
    StatePower { level: u16 },
    GetLabel,
    StateLabel { label: String },
    Acknowledgement,
    GetLocation,
    StateLocation { label: String },
    GetGroup,
    StateGroup { label: String },
    Unknown(u16),
}

impl Message {
    pub fn message_type(&self) -> u16 {
        use message_type::*;
        match self {
            Message::GetService => GET_SERVICE,
            Message::StateService { .. } => STATE_SERVICE,
            Message::GetPower => GET_POWER,
            Message::SetPower { .. } => SET_POWER,
            Message::StatePower { .. } => STATE_POWER,
            Message::GetLabel => GET_LABEL,
            Message::StateLabel { .. } => STATE_LABEL,
            Message::Acknowledgement => ACKNOWLEDGEMENT,
            Message::GetLocation => GET_LOCATION,
            Message::StateLocation { .. } => STATE_LOCATION,
            Message::GetGroup => GET_GROUP,
            Message::StateGroup { .. } => STATE_GROUP,
            Message::Unknown(t) => *t,
        }
    }

    fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            Message::StateService { service, port } => {
                buf.put_u8(*service);
                buf.put_u32_le(*port);
            }
            Message::SetPower { level } | Message::StatePower { level } => {
                buf.put_u16_le(*level);
            }
            Message::StateLabel { label } => put_label(buf, label),
            Message::StateLocation { label } | Message::StateGroup { label } => {
                // 16-byte identifier, label, updated_at
                buf.put_bytes(0, 16);
                put_label(buf, label);
                buf.put_u64_le(0);
            }
            _ => {}
        }
    }

    fn decode_payload(message_type: u16, mut payload: &[u8]) -> Result<Self> {
        use message_type::*;
        let message = match message_type {
            GET_SERVICE => Message::GetService,
            STATE_SERVICE => {
                require(payload, 5, message_type)?;
                Message::StateService {
                    service: payload.get_u8(),
                    port: payload.get_u32_le(),
                }
            }
            GET_POWER => Message::GetPower,
            SET_POWER => {
                require(payload, 2, message_type)?;
                Message::SetPower {
                    level: payload.get_u16_le(),
                }
            }
            STATE_POWER => {
                require(payload, 2, message_type)?;
                Message::StatePower {
                    level: payload.get_u16_le(),
                }
            }
            GET_LABEL => Message::GetLabel,
            STATE_LABEL => {
                require(payload, LABEL_SIZE, message_type)?;
                Message::StateLabel {
                    label: read_label(&payload[..LABEL_SIZE]),
                }
            }
            ACKNOWLEDGEMENT => Message::Acknowledgement,
            GET_LOCATION => Message::GetLocation,
            STATE_LOCATION => {
                require(payload, 16 + LABEL_SIZE, message_type)?;
                Message::StateLocation {
                    label: read_label(&payload[16..16 + LABEL_SIZE]),
                }
            }
            GET_GROUP => Message::GetGroup,
            STATE_GROUP => {
                require(payload, 16 + LABEL_SIZE, message_type)?;
                Message::StateGroup {
                    label: read_label(&payload[16..16 + LABEL_SIZE]),
                }
            }
            other => Message::Unknown(other),
        };
        Ok(message)
    }
}

/// Header fields that vary between packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Set for broadcast packets addressed to all devices.
    pub tagged: bool,
    pub source: u32,
    /// Device MAC; all zero when `tagged`.
    pub target: MacAddr,
    pub ack_required: bool,
    pub res_required: bool,
    pub sequence: u8,
}

/// A complete LIFX packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub message: Message,
}

impl Packet {
    /// Broadcast discovery request.
    pub fn discovery(source: u32, sequence: u8) -> Self {
        Self {
            header: Header {
                tagged: true,
                source,
                target: MacAddr::default(),
                ack_required: false,
                res_required: true,
                sequence,
            },
            message: Message::GetService,
        }
    }

    /// Unicast request to one device.
    pub fn request(source: u32, sequence: u8, target: MacAddr, message: Message) -> Self {
        let ack_required = matches!(message, Message::SetPower { .. });
        Self {
            header: Header {
                tagged: false,
                source,
                target,
                ack_required,
                res_required: !ack_required,
                sequence,
            },
            message,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut payload = BytesMut::new();
        self.message.encode_payload(&mut payload);

        let size = HEADER_SIZE + payload.len();
        let mut buf = BytesMut::with_capacity(size);

        // Frame
        buf.put_u16_le(size as u16);
        let mut protocol = PROTOCOL | ADDRESSABLE;
        if self.header.tagged {
            protocol |= TAGGED;
        }
        buf.put_u16_le(protocol);
        buf.put_u32_le(self.header.source);

        // Frame address
        buf.put_slice(&self.header.target.0);
        buf.put_bytes(0, 2);
        buf.put_bytes(0, 6);
        let mut flags = 0u8;
        if self.header.res_required {
            flags |= RES_REQUIRED;
        }
        if self.header.ack_required {
            flags |= ACK_REQUIRED;
        }
        buf.put_u8(flags);
        buf.put_u8(self.header.sequence);

        // Protocol header
        buf.put_u64_le(0);
        buf.put_u16_le(self.message.message_type());
        buf.put_u16_le(0);

        buf.put_slice(&payload);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(TransportError::Malformed(format!(
                "packet of {} bytes is shorter than the header",
                data.len()
            )));
        }

        let mut buf = data;
        let size = buf.get_u16_le() as usize;
        if size < HEADER_SIZE || size > data.len() {
            return Err(TransportError::Malformed(format!(
                "declared size {} does not fit {} received bytes",
                size,
                data.len()
            )));
        }

        let protocol = buf.get_u16_le();
        if protocol & 0x0fff != PROTOCOL {
            return Err(TransportError::Malformed(format!(
                "unsupported protocol {}",
                protocol & 0x0fff
            )));
        }
        let tagged = protocol & TAGGED != 0;
        let source = buf.get_u32_le();

        let mut mac = [0u8; 6];
        buf.copy_to_slice(&mut mac);
        buf.advance(2 + 6);
        let flags = buf.get_u8();
        let sequence = buf.get_u8();

        buf.advance(8);
        let message_type = buf.get_u16_le();
        buf.advance(2);

        let payload = &data[HEADER_SIZE..size];
        Ok(Self {
            header: Header {
                tagged,
                source,
                target: MacAddr(mac),
                ack_required: flags & ACK_REQUIRED != 0,
                res_required: flags & RES_REQUIRED != 0,
                sequence,
            },
            message: Message::decode_payload(message_type, payload)?,
        })
    }
}

fn require(payload: &[u8], len: usize, message_type: u16) -> Result<()> {
    if payload.len() < len {
        return Err(TransportError::Malformed(format!(
            "message type {} needs {} payload bytes, got {}",
            message_type,
            len,
            payload.len()
        )));
    }
    Ok(())
}

fn put_label(buf: &mut BytesMut, label: &str) {
    let bytes = label.as_bytes();
    let len = bytes.len().min(LABEL_SIZE);
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, LABEL_SIZE - len);
}

fn read_label(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
