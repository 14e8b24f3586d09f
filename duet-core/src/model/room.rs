use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

const ROOM_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GENERATED_ROOM_ID_LEN: usize = 6;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("room id must be 3 to 50 characters, got {0}")]
pub struct InvalidRoomId(pub usize);

/// Identifier of a room (meeting) on the relay server.
#[derive(Debug, Serialize, Deserialize, Clone, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Short, human friendly id such as `K3ZQ8A`.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..GENERATED_ROOM_ID_LEN)
            .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Accepts any id of 3 to 50 characters once surrounding whitespace is trimmed.
    pub fn parse(raw: &str) -> Result<Self, InvalidRoomId> {
        let trimmed = raw.trim();
        let len = trimmed.chars().count();
        if !(3..=50).contains(&len) {
            return Err(InvalidRoomId(len));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recording attempt within a meeting.
///
/// The meeting service hands these out as numbers, the relay forwards them as
/// strings; both forms are accepted.
#[derive(Debug, Serialize, Clone, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct TakeId(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTakeId {
    Text(String),
    Number(u64),
}

impl<'de> Deserialize<'de> for TakeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawTakeId::deserialize(deserializer)? {
            RawTakeId::Text(s) => TakeId(s),
            RawTakeId::Number(n) => TakeId(n.to_string()),
        })
    }
}

impl From<&str> for TakeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for TakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
