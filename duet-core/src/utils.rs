/// Public STUN servers used when no ICE configuration is supplied.
pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_2: &str = "stun:stun1.l.google.com:19302";

/// A session never holds more than this many participants.
pub const MAX_ROOM_USERS: usize = 2;
