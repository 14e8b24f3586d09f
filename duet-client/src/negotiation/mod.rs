mod link;
mod negotiator;

pub use link::{
    ConnectionState, NegotiationRole, PeerLink, PendingCandidateQueue, RemoteStream,
    RemoteTrackInfo,
};
pub use negotiator::{LinkUpdate, Negotiator, NegotiatorEvent, OfferOutcome};
