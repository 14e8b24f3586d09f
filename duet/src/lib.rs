pub use duet_core::model::{ParticipantId, RoomId, TakeId};

pub mod model {
    pub use duet_core::model::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use duet_client::*;
}
