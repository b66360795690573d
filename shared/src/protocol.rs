//! Binary wire protocol between the game server and its clients
//!
//! Every message starts with a varint type tag followed by a fixed or
//! semi-fixed body. Multi-byte fields are little-endian. One transport frame
//! carries exactly one message.
//!
//! Decoding never panics: reading past the end of the buffer or meeting an
//! unknown tag yields a [`DecodeError`] and the caller drops the message.
//! Encoding is total for every value the types can hold.

use crate::{truncate_name, Vec2};
use thiserror::Error;

pub const TAG_JOIN: u32 = 1;
pub const TAG_INPUT: u32 = 2;
pub const TAG_RESPAWN: u32 = 3;
pub const TAG_PING: u32 = 4;
pub const TAG_WELCOME: u32 = 10;
pub const TAG_STATE: u32 = 11;
pub const TAG_PONG: u32 = 12;

/// Longest varint accepted for a `u32`.
const MAX_VARINT_BYTES: usize = 5;

/// Bytes per player record in a State message.
pub const PLAYER_RECORD_LEN: usize = 2 + 2 + 4 + 4 + 2 + 1;
/// Bytes per food record in a State message.
pub const FOOD_RECORD_LEN: usize = 4 + 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message truncated: needed {needed} more bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("unknown message tag {0}")]
    UnknownTag(u32),
    #[error("message tag {0} is not valid in this direction")]
    UnexpectedKind(u32),
    #[error("varint longer than 5 bytes or overflowing u32")]
    VarintOverflow,
}

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Join { name: String },
    Input { sequence: u16, angle: f32, boost: bool },
    Respawn,
    Ping { client_time: u32 },
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Welcome { player_id: u16, world_size: u16 },
    State(StateSnapshot),
    Pong { client_time: u32 },
}

/// Culled view of the world for a single observer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateSnapshot {
    pub tick: u32,
    pub players: Vec<PlayerState>,
    pub food: Vec<Vec2>,
}

impl StateSnapshot {
    pub fn player(&self, id: u16) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == id)
    }
}

/// Per-player record of a State message. Only the head is sent, never the body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub id: u16,
    pub len: u16,
    pub head: Vec2,
    pub color: u16,
    pub alive: bool,
}

pub fn write_varint(value: u32, out: &mut Vec<u8>) {
    let mut v = value;
    while v >= 0x80 {
        out.push((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

/// Cursor over a received buffer with bounds-checked little-endian reads.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    pub fn read_varint(&mut self) -> Result<u32, DecodeError> {
        let mut result: u64 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return u32::try_from(result).map_err(|_| DecodeError::VarintOverflow);
            }
        }
        Err(DecodeError::VarintOverflow)
    }

    /// Reads a varint byte length followed by that many bytes of UTF-8.
    /// Invalid sequences are replaced rather than rejected.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_varint()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    // A truncated name is far below u32::MAX bytes
    write_varint(bytes.len() as u32, out);
    out.extend_from_slice(bytes);
}

/// Reads the type tag at the start of a message without consuming the body.
pub fn peek_tag(buf: &[u8]) -> Result<u32, DecodeError> {
    Reader::new(buf).read_varint()
}

impl ClientMessage {
    pub fn tag(&self) -> u32 {
        match self {
            ClientMessage::Join { .. } => TAG_JOIN,
            ClientMessage::Input { .. } => TAG_INPUT,
            ClientMessage::Respawn => TAG_RESPAWN,
            ClientMessage::Ping { .. } => TAG_PING,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        write_varint(self.tag(), &mut out);
        match self {
            ClientMessage::Join { name } => write_string(&truncate_name(name), &mut out),
            ClientMessage::Input {
                sequence,
                angle,
                boost,
            } => {
                out.extend_from_slice(&sequence.to_le_bytes());
                out.extend_from_slice(&angle.to_le_bytes());
                out.push(u8::from(*boost));
            }
            ClientMessage::Respawn => {}
            ClientMessage::Ping { client_time } => {
                out.extend_from_slice(&client_time.to_le_bytes());
            }
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let tag = r.read_varint()?;
        match tag {
            TAG_JOIN => Ok(ClientMessage::Join {
                name: r.read_string()?,
            }),
            TAG_INPUT => {
                let sequence = r.read_u16()?;
                let angle = r.read_f32()?;
                let boost = r.read_u8()? == 1;
                Ok(ClientMessage::Input {
                    sequence,
                    angle,
                    boost,
                })
            }
            TAG_RESPAWN => Ok(ClientMessage::Respawn),
            TAG_PING => Ok(ClientMessage::Ping {
                client_time: r.read_u32()?,
            }),
            TAG_WELCOME | TAG_STATE | TAG_PONG => Err(DecodeError::UnexpectedKind(tag)),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

impl ServerMessage {
    pub fn tag(&self) -> u32 {
        match self {
            ServerMessage::Welcome { .. } => TAG_WELCOME,
            ServerMessage::State(_) => TAG_STATE,
            ServerMessage::Pong { .. } => TAG_PONG,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            ServerMessage::State(snapshot) => encode_state(snapshot),
            ServerMessage::Welcome {
                player_id,
                world_size,
            } => {
                let mut out = Vec::with_capacity(5);
                write_varint(TAG_WELCOME, &mut out);
                out.extend_from_slice(&player_id.to_le_bytes());
                out.extend_from_slice(&world_size.to_le_bytes());
                out
            }
            ServerMessage::Pong { client_time } => {
                let mut out = Vec::with_capacity(5);
                write_varint(TAG_PONG, &mut out);
                out.extend_from_slice(&client_time.to_le_bytes());
                out
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(buf);
        let tag = r.read_varint()?;
        match tag {
            TAG_WELCOME => {
                let player_id = r.read_u16()?;
                let world_size = r.read_u16()?;
                Ok(ServerMessage::Welcome {
                    player_id,
                    world_size,
                })
            }
            TAG_STATE => decode_state_body(&mut r).map(ServerMessage::State),
            TAG_PONG => Ok(ServerMessage::Pong {
                client_time: r.read_u32()?,
            }),
            TAG_JOIN | TAG_INPUT | TAG_RESPAWN | TAG_PING => Err(DecodeError::UnexpectedKind(tag)),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

fn encode_state(snapshot: &StateSnapshot) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        16 + snapshot.players.len() * PLAYER_RECORD_LEN + snapshot.food.len() * FOOD_RECORD_LEN,
    );
    write_varint(TAG_STATE, &mut out);
    out.extend_from_slice(&snapshot.tick.to_le_bytes());

    write_varint(snapshot.players.len() as u32, &mut out);
    for p in &snapshot.players {
        out.extend_from_slice(&p.id.to_le_bytes());
        out.extend_from_slice(&p.len.to_le_bytes());
        out.extend_from_slice(&p.head.x.to_le_bytes());
        out.extend_from_slice(&p.head.y.to_le_bytes());
        out.extend_from_slice(&p.color.to_le_bytes());
        out.push(u8::from(p.alive));
    }

    write_varint(snapshot.food.len() as u32, &mut out);
    for f in &snapshot.food {
        out.extend_from_slice(&f.x.to_le_bytes());
        out.extend_from_slice(&f.y.to_le_bytes());
    }
    out
}

fn decode_state_body(r: &mut Reader<'_>) -> Result<StateSnapshot, DecodeError> {
    let tick = r.read_u32()?;

    let player_count = r.read_varint()? as usize;
    // Reject impossible counts before allocating for them
    if r.remaining() < player_count.saturating_mul(PLAYER_RECORD_LEN) {
        return Err(DecodeError::Truncated {
            needed: player_count.saturating_mul(PLAYER_RECORD_LEN),
            remaining: r.remaining(),
        });
    }
    let mut players = Vec::with_capacity(player_count);
    for _ in 0..player_count {
        let id = r.read_u16()?;
        let len = r.read_u16()?;
        let x = r.read_f32()?;
        let y = r.read_f32()?;
        let color = r.read_u16()?;
        let alive = r.read_u8()? == 1;
        players.push(PlayerState {
            id,
            len,
            head: Vec2::new(x, y),
            color,
            alive,
        });
    }

    let food_count = r.read_varint()? as usize;
    if r.remaining() < food_count.saturating_mul(FOOD_RECORD_LEN) {
        return Err(DecodeError::Truncated {
            needed: food_count.saturating_mul(FOOD_RECORD_LEN),
            remaining: r.remaining(),
        });
    }
    let mut food = Vec::with_capacity(food_count);
    for _ in 0..food_count {
        let x = r.read_f32()?;
        let y = r.read_f32()?;
        food.push(Vec2::new(x, y));
    }

    Ok(StateSnapshot {
        tick,
        players,
        food,
    })
}
