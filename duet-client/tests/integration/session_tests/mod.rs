pub mod test_call_lifecycle;
pub mod test_media_state;
pub mod test_screen_share;

use duet_core::MediaKind;

use crate::integration::TestParticipant;

/// Id of the track the participant currently sends for `kind`.
pub async fn sender_id(participant: &TestParticipant, kind: MediaKind) -> String {
    participant
        .handle
        .snapshot()
        .await
        .expect("snapshot")
        .sender_track_ids
        .into_iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, id)| id)
        .expect("no sender for kind")
}
