mod channel;
mod signaling_output;

pub use channel::{ChannelEvent, ChannelState, SignalingChannel};
pub use signaling_output::SignalingOutput;
