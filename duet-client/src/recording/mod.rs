//! Chunked recording of the local stream and its upload.

mod chunk;
mod pipeline;
mod recorder;
mod upload_queue;

pub use chunk::{ChunkDestination, ChunkTask};
pub use pipeline::{RecordingOrigin, RecordingPipeline};
pub use recorder::ChunkRecorder;
pub use upload_queue::{UploadEvent, UploadQueue};
