//! Server configuration, validation, and error types.
//!
//! [`ServerConfig`] carries the start-time record the front end hands over:
//! storage and cache locations, two transport endpoints, a token, and the
//! streaming/reverse-call tuning knobs. The transport fields are opaque to
//! this crate; they are validated for shape and threaded through.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`ServerConfig::validate()`] or server start.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// A TCP port was supplied that is not a decimal `u16`.
    InvalidPort {
        /// Which endpoint (`"engine"` or `"view"`).
        endpoint: &'static str,
        /// The rejected value.
        value: String,
    },
    /// Stream input queue capacity is zero.
    InputQueueZero,
    /// Reaper interval is zero.
    ReaperIntervalZero,
    /// Reverse-call timeout is zero.
    ReverseTimeoutZero,
    /// A background thread could not be spawned.
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPort { endpoint, value } => {
                write!(f, "{endpoint} tcp port '{value}' is not a valid port number")
            }
            Self::InputQueueZero => write!(f, "input_queue_capacity must be at least 1"),
            Self::ReaperIntervalZero => write!(f, "reaper_interval must be non-zero"),
            Self::ReverseTimeoutZero => write!(f, "reverse_call_timeout must be non-zero"),
            Self::ThreadSpawnFailed { reason } => write!(f, "thread spawn failed: {reason}"),
        }
    }
}

impl Error for ConfigError {}

// ── Endpoint ───────────────────────────────────────────────────────

/// One transport address pair: a local socket and a TCP alternative.
///
/// Either, both, or neither may be set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Endpoint {
    /// Unix-domain socket path.
    pub socket_path: Option<PathBuf>,
    /// TCP port, as supplied (decimal string).
    pub tcp_port: Option<String>,
}

impl Endpoint {
    /// The TCP port parsed as a number, if set and valid.
    pub fn port(&self) -> Option<u16> {
        self.tcp_port.as_deref().and_then(|p| p.parse().ok())
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        match self.tcp_port.as_deref() {
            Some(p) if p.parse::<u16>().is_err() => Err(ConfigError::InvalidPort {
                endpoint: name,
                value: p.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

// ── ServerConfig ───────────────────────────────────────────────────

/// Start-time configuration for a [`Server`](crate::server::Server).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Application storage directory.
    pub storage_path: Option<PathBuf>,
    /// Cache directory. The cache is live only if this is non-empty and
    /// [`enable_cache`](Self::enable_cache) is set.
    pub cache_path: Option<PathBuf>,
    /// The "engine" role endpoint.
    pub engine: Endpoint,
    /// The "view" role endpoint.
    pub view: Endpoint,
    /// Authentication token for the backend connection.
    pub token: Option<String>,
    /// Whether the cache façade is enabled.
    pub enable_cache: bool,
    /// Idle timeout applied uniformly to every streaming session.
    /// `None` = sessions never expire. Default: `None`.
    pub stream_timeout: Option<Duration>,
    /// How long a reverse call waits for its response. Default: 10 s.
    pub reverse_call_timeout: Duration,
    /// How often the reaper scans for idle sessions. Default: 50 ms.
    pub reaper_interval: Duration,
    /// Per-session input queue capacity. Default: 100.
    pub input_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            cache_path: None,
            engine: Endpoint::default(),
            view: Endpoint::default(),
            token: None,
            enable_cache: false,
            stream_timeout: None,
            reverse_call_timeout: Duration::from_secs(10),
            reaper_interval: Duration::from_millis(50),
            input_queue_capacity: 100,
        }
    }
}

impl ServerConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate("engine")?;
        self.view.validate("view")?;
        if self.input_queue_capacity == 0 {
            return Err(ConfigError::InputQueueZero);
        }
        if self.reaper_interval.is_zero() {
            return Err(ConfigError::ReaperIntervalZero);
        }
        if self.reverse_call_timeout.is_zero() {
            return Err(ConfigError::ReverseTimeoutZero);
        }
        Ok(())
    }

    /// Whether the cache façade should be backed by a store.
    pub fn cache_active(&self) -> bool {
        self.enable_cache
            && self
                .cache_path
                .as_ref()
                .is_some_and(|p| !p.as_os_str().is_empty())
    }

    /// Set the stream idle timeout from a millisecond count; `<= 0` disables it.
    pub fn with_stream_timeout_ms(mut self, ms: i64) -> Self {
        self.stream_timeout = u64::try_from(ms)
            .ok()
            .filter(|&ms| ms > 0)
            .map(Duration::from_millis);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ServerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_non_numeric_port() {
        let cfg = ServerConfig {
            view: Endpoint {
                socket_path: None,
                tcp_port: Some("http".into()),
            },
            ..ServerConfig::default()
        };
        match cfg.validate() {
            Err(ConfigError::InvalidPort { endpoint, value }) => {
                assert_eq!(endpoint, "view");
                assert_eq!(value, "http");
            }
            other => panic!("expected InvalidPort, got {other:?}"),
        }
    }

    #[test]
    fn rejects_out_of_range_port() {
        let cfg = ServerConfig {
            engine: Endpoint {
                socket_path: None,
                tcp_port: Some("70000".into()),
            },
            ..ServerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidPort { endpoint: "engine", .. })
        ));
    }

    #[test]
    fn rejects_zero_knobs() {
        let base = ServerConfig::default;
        assert_eq!(
            ServerConfig {
                input_queue_capacity: 0,
                ..base()
            }
            .validate(),
            Err(ConfigError::InputQueueZero)
        );
        assert_eq!(
            ServerConfig {
                reaper_interval: Duration::ZERO,
                ..base()
            }
            .validate(),
            Err(ConfigError::ReaperIntervalZero)
        );
        assert_eq!(
            ServerConfig {
                reverse_call_timeout: Duration::ZERO,
                ..base()
            }
            .validate(),
            Err(ConfigError::ReverseTimeoutZero)
        );
    }

    #[test]
    fn cache_needs_flag_and_path() {
        let mut cfg = ServerConfig {
            enable_cache: true,
            ..ServerConfig::default()
        };
        assert!(!cfg.cache_active());
        cfg.cache_path = Some(PathBuf::new());
        assert!(!cfg.cache_active());
        cfg.cache_path = Some(PathBuf::from("/tmp/cache"));
        assert!(cfg.cache_active());
        cfg.enable_cache = false;
        assert!(!cfg.cache_active());
    }

    #[test]
    fn non_positive_stream_timeout_disables() {
        let cfg = ServerConfig::default().with_stream_timeout_ms(0);
        assert_eq!(cfg.stream_timeout, None);
        let cfg = ServerConfig::default().with_stream_timeout_ms(-5);
        assert_eq!(cfg.stream_timeout, None);
        let cfg = ServerConfig::default().with_stream_timeout_ms(1500);
        assert_eq!(cfg.stream_timeout, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn endpoint_port_parses() {
        let ep = Endpoint {
            socket_path: None,
            tcp_port: Some("8080".into()),
        };
        assert_eq!(ep.port(), Some(8080));
        assert_eq!(Endpoint::default().port(), None);
    }
}
