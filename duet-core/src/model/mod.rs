mod media;
mod peer;
mod room;
mod signaling;

pub use media::{MediaAnnouncement, MediaKind};
pub use peer::ParticipantId;
pub use room::{InvalidRoomId, RoomId, TakeId};
pub use signaling::{IceCandidate, IceServerConfig, SdpType, SessionDescription, SignalEvent};
