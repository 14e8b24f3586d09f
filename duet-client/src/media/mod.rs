mod controller;
mod track;

pub use controller::{MediaController, RemoteMediaState};
pub use track::{LOCAL_STREAM_ID, LocalTrack, MediaStream, TrackSource, TrackState};
