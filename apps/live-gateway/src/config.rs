use std::time::Duration;

/// Live gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// HMAC secret used to verify WebSocket access tokens.
    pub ws_jwt_secret: String,
    /// Base URL of the classroom API that serves rosters.
    pub roster_url: String,
    /// Optional bearer token presented to the classroom API.
    pub roster_token: Option<String>,
    /// LiveKit API key, written into join tokens as the issuer.
    pub livekit_api_key: String,
    /// LiveKit API secret used to sign join tokens.
    pub livekit_api_secret: String,
    /// Optional CORS origin. When unset any origin is allowed.
    pub allowed_origin: Option<String>,
    /// Per-connection deadlines and limits.
    pub connection: ConnectionSettings,
}

/// Deadlines and limits applied to every gateway connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Time allowed for the client to send its `AuthRequest`.
    pub handshake_timeout: Duration,
    /// Time allowed between two inbound frames (pongs included).
    pub pong_wait: Duration,
    /// Interval between keepalive pings. Must be less than `pong_wait`.
    pub ping_period: Duration,
    /// Time allowed to write a single frame to the peer.
    pub write_wait: Duration,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            handshake_timeout: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            write_wait: Duration::from_secs(10),
            outbound_capacity: 256,
            max_message_size: 512,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            port: parsed_var("PORT").unwrap_or(4010),
            ws_jwt_secret: required_var("WS_JWT_SECRET"),
            roster_url: required_var("ROSTER_URL"),
            roster_token: optional_var("ROSTER_API_TOKEN"),
            livekit_api_key: required_var("LIVEKIT_API_KEY"),
            livekit_api_secret: required_var("LIVEKIT_API_SECRET"),
            allowed_origin: optional_var("ALLOWED_ORIGIN"),
            connection: ConnectionSettings::from_env(),
        }
    }
}

impl ConnectionSettings {
    /// Defaults, overridden by any of the `*_SECS` / size variables that are set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let pong_wait = secs_var("PONG_WAIT_SECS").unwrap_or(defaults.pong_wait);

        Self {
            handshake_timeout: secs_var("HANDSHAKE_TIMEOUT_SECS")
                .unwrap_or(defaults.handshake_timeout),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            write_wait: secs_var("WRITE_WAIT_SECS").unwrap_or(defaults.write_wait),
            outbound_capacity: parsed_var("OUTBOUND_QUEUE_CAPACITY")
                .filter(|cap| *cap > 0)
                .unwrap_or(defaults.outbound_capacity),
            max_message_size: parsed_var("MAX_MESSAGE_SIZE").unwrap_or(defaults.max_message_size),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// A whole number of seconds. Zero is treated as unset, since a zero ping
/// period or deadline cannot be honored.
fn secs_var(name: &str) -> Option<Duration> {
    parsed_var::<u64>(name)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
