//! Binary wire protocol shared with browser clients and bots
//!
//! Every record has a fixed size, starts with a one-byte [`Kind`] and stores
//! all multi-byte fields little-endian. One record travels per WebSocket frame,
//! so there is no length prefix or delimiter.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Player identifier, assigned monotonically and never reused
pub type PlayerId = u32;

/// Record discriminator, numbered in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    Hello = 0,
    PlayerJoined = 1,
    PlayerLeft = 2,
    PlayerMoving = 3,
    AmmaMoving = 4,
    Ping = 5,
    Pong = 6,
}

impl TryFrom<u8> for Kind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Kind::Hello),
            1 => Ok(Kind::PlayerJoined),
            2 => Ok(Kind::PlayerLeft),
            3 => Ok(Kind::PlayerMoving),
            4 => Ok(Kind::AmmaMoving),
            5 => Ok(Kind::Ping),
            6 => Ok(Kind::Pong),
            other => Err(other),
        }
    }
}

/// A single movement direction; the discriminant is also its bit position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    /// Bit for this direction inside a [`Moving`] mask
    pub const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Unit vector in screen coordinates (y grows downwards)
    pub const fn vector(self) -> (f32, f32) {
        match self {
            Direction::Left => (-1.0, 0.0),
            Direction::Right => (1.0, 0.0),
            Direction::Up => (0.0, -1.0),
            Direction::Down => (0.0, 1.0),
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Left),
            1 => Ok(Direction::Right),
            2 => Ok(Direction::Up),
            3 => Ok(Direction::Down),
            other => Err(ProtocolError::InvalidDirection(other)),
        }
    }
}

/// Movement bitmask: bit0 = left, bit1 = right, bit2 = up, bit3 = down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Moving(u8);

impl Moving {
    pub const NONE: Moving = Moving(0);
    pub const LEFT: u8 = Direction::Left.bit();
    pub const RIGHT: u8 = Direction::Right.bit();
    pub const UP: u8 = Direction::Up.bit();
    pub const DOWN: u8 = Direction::Down.bit();

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, direction: Direction) -> bool {
        self.0 & direction.bit() != 0
    }

    /// Returns the mask with `direction` switched on or off
    #[must_use]
    pub const fn with(self, direction: Direction, active: bool) -> Self {
        if active {
            Self(self.0 | direction.bit())
        } else {
            Self(self.0 & !direction.bit())
        }
    }

    /// Active directions, ignoring bits outside the four known ones
    pub fn directions(self) -> impl Iterator<Item = Direction> {
        Direction::ALL
            .into_iter()
            .filter(move |d| self.contains(*d))
    }
}

/// Decoding failures; all of them mean the frame is malformed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,

    #[error("{kind:?} is {expected} bytes, got {actual}")]
    WrongLength {
        kind: Kind,
        expected: usize,
        actual: usize,
    },

    #[error("no known message is {0} bytes long")]
    UnknownLength(usize),

    #[error("expected kind {expected:?}, got {actual}")]
    KindMismatch { expected: Kind, actual: u8 },

    #[error("kind {kind} does not match any {len}-byte message")]
    UnknownKind { kind: u8, len: usize },

    #[error("invalid direction {0}")]
    InvalidDirection(u8),
}

/// A fixed-layout record
pub trait Record: Sized {
    const KIND: Kind;
    /// Total size including the kind byte
    const SIZE: usize;

    /// Write every field after the kind byte
    fn put_fields(&self, buf: &mut BytesMut);

    /// Read every field after the kind byte; `buf` holds exactly `SIZE - 1` bytes
    fn get_fields(buf: &mut &[u8]) -> Result<Self, ProtocolError>;

    fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(Self::KIND as u8);
        self.put_fields(&mut buf);
        debug_assert_eq!(buf.len(), Self::SIZE);
        buf.freeze()
    }

    fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != Self::SIZE {
            return Err(ProtocolError::WrongLength {
                kind: Self::KIND,
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = bytes;
        let kind = buf.get_u8();
        if kind != Self::KIND as u8 {
            return Err(ProtocolError::KindMismatch {
                expected: Self::KIND,
                actual: kind,
            });
        }

        Self::get_fields(&mut buf)
    }
}

/// Sent once to a player right after it is admitted into a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hello {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub hue: u8,
}

impl Record for Hello {
    const KIND: Kind = Kind::Hello;
    const SIZE: usize = 14;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.id);
        buf.put_f32_le(self.x);
        buf.put_f32_le(self.y);
        buf.put_u8(self.hue);
    }

    fn get_fields(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: buf.get_u32_le(),
            x: buf.get_f32_le(),
            y: buf.get_f32_le(),
            hue: buf.get_u8(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerJoined {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub hue: u8,
    pub moving: Moving,
}

impl Record for PlayerJoined {
    const KIND: Kind = Kind::PlayerJoined;
    const SIZE: usize = 15;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.id);
        buf.put_f32_le(self.x);
        buf.put_f32_le(self.y);
        buf.put_u8(self.hue);
        buf.put_u8(self.moving.bits());
    }

    fn get_fields(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: buf.get_u32_le(),
            x: buf.get_f32_le(),
            y: buf.get_f32_le(),
            hue: buf.get_u8(),
            moving: Moving::from_bits(buf.get_u8()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerLeft {
    pub id: PlayerId,
}

impl Record for PlayerLeft {
    const KIND: Kind = Kind::PlayerLeft;
    const SIZE: usize = 5;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.id);
    }

    fn get_fields(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: buf.get_u32_le(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerMoving {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub moving: Moving,
}

impl Record for PlayerMoving {
    const KIND: Kind = Kind::PlayerMoving;
    const SIZE: usize = 14;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.id);
        buf.put_f32_le(self.x);
        buf.put_f32_le(self.y);
        buf.put_u8(self.moving.bits());
    }

    fn get_fields(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            id: buf.get_u32_le(),
            x: buf.get_f32_le(),
            y: buf.get_f32_le(),
            moving: Moving::from_bits(buf.get_u8()),
        })
    }
}

/// Client intent: start or stop moving in one direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmmaMoving {
    pub direction: Direction,
    pub start: bool,
}

impl Record for AmmaMoving {
    const KIND: Kind = Kind::AmmaMoving;
    const SIZE: usize = 3;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u8(self.direction as u8);
        buf.put_u8(u8::from(self.start));
    }

    fn get_fields(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        let direction = Direction::try_from(buf.get_u8())?;
        let start = buf.get_u8() != 0;
        Ok(Self { direction, start })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub timestamp: u32,
}

impl Record for Ping {
    const KIND: Kind = Kind::Ping;
    const SIZE: usize = 5;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.timestamp);
    }

    fn get_fields(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            timestamp: buf.get_u32_le(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pong {
    pub timestamp: u32,
}

impl Record for Pong {
    const KIND: Kind = Kind::Pong;
    const SIZE: usize = 5;

    fn put_fields(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.timestamp);
    }

    fn get_fields(buf: &mut &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            timestamp: buf.get_u32_le(),
        })
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMsg {
    AmmaMoving(AmmaMoving),
    Ping(Ping),
}

impl ClientMsg {
    /// Picks the record by frame length, then validates its kind byte
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        match bytes.len() {
            0 => Err(ProtocolError::Empty),
            AmmaMoving::SIZE => AmmaMoving::decode(bytes).map(ClientMsg::AmmaMoving),
            Ping::SIZE => Ping::decode(bytes).map(ClientMsg::Ping),
            len => Err(ProtocolError::UnknownLength(len)),
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            ClientMsg::AmmaMoving(msg) => msg.encode(),
            ClientMsg::Ping(msg) => msg.encode(),
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServerMsg {
    Hello(Hello),
    PlayerJoined(PlayerJoined),
    PlayerLeft(PlayerLeft),
    PlayerMoving(PlayerMoving),
    Pong(Pong),
}

impl ServerMsg {
    pub fn encode(&self) -> Bytes {
        match self {
            ServerMsg::Hello(msg) => msg.encode(),
            ServerMsg::PlayerJoined(msg) => msg.encode(),
            ServerMsg::PlayerLeft(msg) => msg.encode(),
            ServerMsg::PlayerMoving(msg) => msg.encode(),
            ServerMsg::Pong(msg) => msg.encode(),
        }
    }

    /// Several server records share a size, so both size and kind must match
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Some(&kind) = bytes.first() else {
            return Err(ProtocolError::Empty);
        };

        match (bytes.len(), Kind::try_from(kind)) {
            (Hello::SIZE, Ok(Kind::Hello)) => Hello::decode(bytes).map(ServerMsg::Hello),
            (PlayerJoined::SIZE, Ok(Kind::PlayerJoined)) => {
                PlayerJoined::decode(bytes).map(ServerMsg::PlayerJoined)
            }
            (PlayerLeft::SIZE, Ok(Kind::PlayerLeft)) => {
                PlayerLeft::decode(bytes).map(ServerMsg::PlayerLeft)
            }
            (PlayerMoving::SIZE, Ok(Kind::PlayerMoving)) => {
                PlayerMoving::decode(bytes).map(ServerMsg::PlayerMoving)
            }
            (Pong::SIZE, Ok(Kind::Pong)) => Pong::decode(bytes).map(ServerMsg::Pong),
            (len @ (Hello::SIZE | PlayerJoined::SIZE | PlayerLeft::SIZE), _) => {
                Err(ProtocolError::UnknownKind { kind, len })
            }
            (len, _) => Err(ProtocolError::UnknownLength(len)),
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            ServerMsg::Hello(_) => Kind::Hello,
            ServerMsg::PlayerJoined(_) => Kind::PlayerJoined,
            ServerMsg::PlayerLeft(_) => Kind::PlayerLeft,
            ServerMsg::PlayerMoving(_) => Kind::PlayerMoving,
            ServerMsg::Pong(_) => Kind::Pong,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn hello() -> Hello {
        Hello {
            id: 9,
            x: 1.0,
            y: 2.0,
            hue: 3,
        }
    }

    fn joined() -> PlayerJoined {
        PlayerJoined {
            id: 1,
            x: 2.0,
            y: 3.0,
            hue: 4,
            moving: Moving::NONE,
        }
    }

    fn moving_update() -> PlayerMoving {
        PlayerMoving {
            id: 9,
            x: 1.0,
            y: 2.0,
            moving: Moving::from_bits(Moving::UP),
        }
    }

    fn intent(direction: Direction, start: bool) -> AmmaMoving {
        AmmaMoving { direction, start }
    }

    fn record(kind: Kind, fields: &[&[u8]]) -> Vec<u8> {
        let mut bytes = vec![kind as u8];
        for field in fields {
            bytes.extend_from_slice(field);
        }
        bytes
    }

    fn assert_bytes_survive<R: Record>(bytes: &[u8]) {
        let decoded = assert_ok!(R::decode(bytes));
        assert_eq!(decoded.encode().as_ref(), bytes);
    }

    #[test]
    fn test_record_sizes_match_layout() {
        assert_eq!(hello().encode().len(), Hello::SIZE);
        assert_eq!(joined().encode().len(), PlayerJoined::SIZE);
        assert_eq!(PlayerLeft { id: 1 }.encode().len(), PlayerLeft::SIZE);
        assert_eq!(moving_update().encode().len(), PlayerMoving::SIZE);
        assert_eq!(intent(Direction::Up, true).encode().len(), AmmaMoving::SIZE);
        assert_eq!(Ping { timestamp: 7 }.encode().len(), Ping::SIZE);
        assert_eq!(Pong { timestamp: 7 }.encode().len(), Pong::SIZE);
    }

    #[test]
    fn test_hello_byte_layout_is_little_endian() {
        let bytes = Hello {
            id: 0x0403_0201,
            x: 1.0,
            y: -2.5,
            hue: 200,
        }
        .encode();

        assert_eq!(bytes[0], Kind::Hello as u8);
        assert_eq!(&bytes[1..5], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[5..9], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[9..13], &(-2.5f32).to_le_bytes());
        assert_eq!(bytes[13], 200);
    }

    #[test]
    fn test_player_joined_roundtrip() {
        let msg = PlayerJoined {
            id: 42,
            x: 123.5,
            y: 456.25,
            hue: 17,
            moving: Moving::from_bits(Moving::LEFT | Moving::DOWN),
        };
        let bytes = msg.encode();
        let decoded = assert_ok!(PlayerJoined::decode(&bytes));
        assert_eq!(decoded, msg);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_decode_then_encode_reproduces_bytes() {
        let id = 0xDEAD_BEEFu32.to_le_bytes();
        let x = 799.5f32.to_le_bytes();
        let y = 0.25f32.to_le_bytes();

        assert_bytes_survive::<Hello>(&record(Kind::Hello, &[&id, &x, &y, &[255]]));

        let joined = record(Kind::PlayerJoined, &[&id, &x, &y, &[40], &[0b1010]]);
        assert_bytes_survive::<PlayerJoined>(&joined);

        assert_bytes_survive::<PlayerLeft>(&record(Kind::PlayerLeft, &[&id]));

        let moving = record(Kind::PlayerMoving, &[&id, &x, &y, &[0b0101]]);
        assert_bytes_survive::<PlayerMoving>(&moving);

        for direction in 0..4 {
            for start in 0..2 {
                assert_bytes_survive::<AmmaMoving>(&[Kind::AmmaMoving as u8, direction, start]);
            }
        }

        assert_bytes_survive::<Ping>(&record(Kind::Ping, &[&id]));
        assert_bytes_survive::<Pong>(&record(Kind::Pong, &[&0u32.to_le_bytes()]));
    }

    #[test]
    fn test_server_msg_decode_selects_by_size_and_kind() {
        let moving = moving_update();
        let hello = hello();

        // Both are 14 bytes; only the kind byte tells them apart.
        assert_eq!(
            assert_ok!(ServerMsg::decode(&moving.encode())),
            ServerMsg::PlayerMoving(moving)
        );
        assert_eq!(
            assert_ok!(ServerMsg::decode(&hello.encode())),
            ServerMsg::Hello(hello)
        );

        let left = PlayerLeft { id: 5 };
        let pong = Pong { timestamp: 5 };
        assert_eq!(
            assert_ok!(ServerMsg::decode(&left.encode())),
            ServerMsg::PlayerLeft(left)
        );
        assert_eq!(
            assert_ok!(ServerMsg::decode(&pong.encode())),
            ServerMsg::Pong(pong)
        );
    }

    #[test]
    fn test_server_msg_rejects_kind_without_matching_size() {
        // A Ping is 5 bytes but is not a server message.
        let bytes = Ping { timestamp: 1 }.encode();
        assert_eq!(
            ServerMsg::decode(&bytes),
            Err(ProtocolError::UnknownKind {
                kind: Kind::Ping as u8,
                len: 5,
            })
        );

        // A PlayerLeft kind byte padded out to Hello size.
        let mut bytes = vec![Kind::PlayerLeft as u8];
        bytes.extend_from_slice(&[0; 13]);
        assert_err!(ServerMsg::decode(&bytes));

        assert_eq!(ServerMsg::decode(&[]), Err(ProtocolError::Empty));
        assert_eq!(
            ServerMsg::decode(&[0; 7]),
            Err(ProtocolError::UnknownLength(7))
        );
    }

    #[test]
    fn test_client_msg_roundtrip() {
        let intent = ClientMsg::AmmaMoving(intent(Direction::Down, false));
        let ping = ClientMsg::Ping(Ping {
            timestamp: u32::MAX,
        });

        assert_eq!(assert_ok!(ClientMsg::decode(&intent.encode())), intent);
        assert_eq!(assert_ok!(ClientMsg::decode(&ping.encode())), ping);
        assert_eq!(intent.encode().as_ref(), &[Kind::AmmaMoving as u8, 3, 0]);
    }

    #[test]
    fn test_client_msg_rejects_wrong_length() {
        assert_eq!(ClientMsg::decode(&[]), Err(ProtocolError::Empty));
        assert_eq!(
            ClientMsg::decode(&[4, 0]),
            Err(ProtocolError::UnknownLength(2))
        );
        assert_eq!(
            ClientMsg::decode(&[4, 0, 1, 0]),
            Err(ProtocolError::UnknownLength(4))
        );

        let hello = hello().encode();
        assert_eq!(
            ClientMsg::decode(&hello),
            Err(ProtocolError::UnknownLength(14))
        );
    }

    #[test]
    fn test_client_msg_rejects_mismatched_kind() {
        // PlayerLeft and Pong share the Ping size but are server-only.
        let left = PlayerLeft { id: 3 }.encode();
        assert_eq!(
            ClientMsg::decode(&left),
            Err(ProtocolError::KindMismatch {
                expected: Kind::Ping,
                actual: Kind::PlayerLeft as u8,
            })
        );

        assert_eq!(
            ClientMsg::decode(&[Kind::Ping as u8, 0, 1]),
            Err(ProtocolError::KindMismatch {
                expected: Kind::AmmaMoving,
                actual: Kind::Ping as u8,
            })
        );
        assert_eq!(
            ClientMsg::decode(&[0xFF, 0, 0, 0, 0]),
            Err(ProtocolError::KindMismatch {
                expected: Kind::Ping,
                actual: 0xFF,
            })
        );
    }

    #[test]
    fn test_amma_moving_rejects_unknown_direction() {
        assert_eq!(
            AmmaMoving::decode(&[Kind::AmmaMoving as u8, 4, 1]),
            Err(ProtocolError::InvalidDirection(4))
        );
    }

    #[test]
    fn test_record_decode_rejects_partial_buffer() {
        let bytes = joined().encode();
        assert_eq!(
            PlayerJoined::decode(&bytes[..PlayerJoined::SIZE - 1]),
            Err(ProtocolError::WrongLength {
                kind: Kind::PlayerJoined,
                expected: PlayerJoined::SIZE,
                actual: PlayerJoined::SIZE - 1,
            })
        );
    }

    #[test]
    fn test_decoding_untrusted_bytes_never_panics() {
        // Every length up to the largest record with every kind byte.
        for len in 0..=16usize {
            for kind in 0..=u8::MAX {
                let mut bytes = vec![0xAB; len];
                if let Some(first) = bytes.first_mut() {
                    *first = kind;
                }
                let _ = ClientMsg::decode(&bytes);
                let _ = ServerMsg::decode(&bytes);
            }
        }
    }

    #[test]
    fn test_moving_mask_operations() {
        let mask = Moving::NONE
            .with(Direction::Left, true)
            .with(Direction::Up, true)
            .with(Direction::Left, false)
            .with(Direction::Down, true);

        assert_eq!(mask.bits(), Moving::UP | Moving::DOWN);
        assert!(mask.contains(Direction::Up));
        assert!(!mask.contains(Direction::Left));
        assert_eq!(
            mask.directions().collect::<Vec<_>>(),
            vec![Direction::Up, Direction::Down]
        );
        assert!(Moving::NONE.is_empty());
    }

    #[test]
    fn test_kind_numbering_is_fixed() {
        for (byte, kind) in [
            (0, Kind::Hello),
            (1, Kind::PlayerJoined),
            (2, Kind::PlayerLeft),
            (3, Kind::PlayerMoving),
            (4, Kind::AmmaMoving),
            (5, Kind::Ping),
            (6, Kind::Pong),
        ] {
            assert_eq!(Kind::try_from(byte), Ok(kind));
            assert_eq!(kind as u8, byte);
        }
        assert_eq!(Kind::try_from(7), Err(7));
    }
}
