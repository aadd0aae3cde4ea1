//! Protocol configuration
//!
//! Every section carries `#[serde(default)]`, so a JSON document only
//! needs the fields it changes.

use serde::{Deserialize, Serialize};

use tstp_core::{Scale, Space, TstpError, TstpResult};
use tstp_time::TimekeeperConfig;

/// Router configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Relay frames for other nodes
    pub forwarder: bool,
    /// Do not relay frames whose destination window has closed
    pub drop_expired: bool,
    /// Nominal radio range in coordinate units
    pub radio_range: u32,
    /// Entries kept by the duplicate cache
    pub dedup_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            forwarder: true,
            drop_expired: true,
            radio_range: 1_500,
            dedup_capacity: 64,
        }
    }
}

/// Security configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Lifetime of handshake messages after their origin time
    pub handshake_deadline_us: u64,
    /// Pending keys and open DH requests expire after this many sync periods
    pub handshake_timeout_periods: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            handshake_deadline_us: 10_000_000,
            handshake_timeout_periods: 3,
        }
    }
}

/// Startup policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupConfig {
    /// Location confidence (percent) required before routing
    pub min_confidence: u8,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        StartupConfig {
            min_confidence: 80,
            max_attempts: 100,
            backoff_ms: 100,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete node configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Radio unit this instance is bound to
    pub unit: usize,
    /// Node serial, expanded into the 128-bit node id
    pub serial: u64,
    pub scale: Scale,
    /// Position reported by the static locator
    pub position: Space,
    pub is_sink: bool,
    pub timekeeper: TimekeeperConfig,
    pub router: RouterConfig,
    pub security: SecurityConfig,
    pub startup: StartupConfig,
    pub logging: LoggingConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            unit: 0,
            serial: 0,
            scale: Scale::default(),
            position: Space::SINK,
            is_sink: false,
            timekeeper: TimekeeperConfig::default(),
            router: RouterConfig::default(),
            security: SecurityConfig::default(),
            startup: StartupConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ProtocolConfig {
    /// The sink: origin of the coordinate frame and of network time
    pub fn sink() -> Self {
        ProtocolConfig {
            is_sink: true,
            position: Space::SINK,
            ..Self::default()
        }
    }

    /// Ordinary node at `position`
    pub fn node(position: Space) -> Self {
        ProtocolConfig {
            position,
            ..Self::default()
        }
    }

    /// Leaf node that never relays and resynchronizes rarely
    pub fn low_power() -> Self {
        ProtocolConfig {
            timekeeper: TimekeeperConfig::low_power(),
            router: RouterConfig {
                forwarder: false,
                ..RouterConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn with_serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }

    pub fn with_unit(mut self, unit: usize) -> Self {
        self.unit = unit;
        self
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> TstpResult<Self> {
        let config: ProtocolConfig =
            serde_json::from_str(json).map_err(|e| TstpError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> TstpResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TstpError::InvalidConfig(e.to_string()))
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> TstpResult<()> {
        let invalid = |msg: &str| Err(TstpError::InvalidConfig(msg.to_string()));

        if self.timekeeper.max_drift_us == 0 {
            return invalid("timekeeper.max_drift_us must be positive");
        }
        if self.timekeeper.keep_alive_retry_us == 0 {
            return invalid("timekeeper.keep_alive_retry_us must be positive");
        }
        if self.router.radio_range == 0 {
            return invalid("router.radio_range must be positive");
        }
        if self.router.dedup_capacity == 0 {
            return invalid("router.dedup_capacity must be positive");
        }
        if self.security.handshake_deadline_us == 0 {
            return invalid("security.handshake_deadline_us must be positive");
        }
        if self.security.handshake_timeout_periods == 0 {
            return invalid("security.handshake_timeout_periods must be positive");
        }
        if self.startup.min_confidence > 100 {
            return invalid("startup.min_confidence is a percentage");
        }
        if self.startup.max_attempts == 0 {
            return invalid("startup.max_attempts must be positive");
        }
        if self.is_sink && self.position != Space::SINK {
            return invalid("the sink sits at the origin of the coordinate frame");
        }
        self.position_fits_scale()
    }

    fn position_fits_scale(&self) -> TstpResult<()> {
        let Space { x, y, z } = self.position;
        for c in [x, y, z] {
            self.scale.check(c)?;
        }
        Ok(())
    }
}
