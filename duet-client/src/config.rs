use duet_core::IceServerConfig;
use duet_core::utils::{DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2};
use serde::Deserialize;
use std::time::Duration;

/// Durations are written as integer milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }

    pub mod option {
        use super::*;

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub signaling: SignalingConfig,
    pub transport: TransportConfig,
    pub negotiation: NegotiationConfig,
    pub recording: RecordingConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Relay endpoint; the participant id is appended as the last path segment.
    pub url: String,
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    pub reconnect_attempts: u32,
    #[serde(with = "millis")]
    pub reconnect_delay: Duration,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3001/ws".to_owned(),
            connect_timeout: Duration::from_secs(20),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

/// ICE configuration for the peer link.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: [DEFAULT_STUN_ADDR, DEFAULT_STUN_ADDR_2]
                .into_iter()
                .map(|url| IceServerConfig {
                    urls: vec![url.to_owned()],
                    username: None,
                    credential: None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Pause before the second participant sends its first offer.
    #[serde(with = "millis")]
    pub initiation_delay: Duration,
    /// Re-offer when an answer does not arrive in time. `None` waits forever.
    #[serde(with = "millis::option")]
    pub negotiation_timeout: Option<Duration>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            initiation_delay: Duration::from_millis(250),
            negotiation_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Interval at which each recorder emits a chunk.
    #[serde(with = "millis")]
    pub timeslice: Duration,
    pub max_upload_attempts: u32,
    /// Base delay between attempts, doubled after each failure up to
    /// [`MAX_RETRY_BACKOFF`]. Zero retries immediately.
    #[serde(with = "millis")]
    pub retry_backoff: Duration,
    /// Record into the remote participant's take when it starts recording.
    pub follow_remote_recording: bool,
}

pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5);

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            timeslice: Duration::from_secs(5),
            max_upload_attempts: 3,
            retry_backoff: Duration::ZERO,
            follow_remote_recording: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_owned(),
        }
    }
}
