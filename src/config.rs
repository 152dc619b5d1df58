use std::path::PathBuf;

use crate::model::{HOUR_MS, MINUTE_MS, Ms, SlotPolicy};

pub const DEFAULT_INTERVAL_MS: Ms = 15 * MINUTE_MS;
pub const DEFAULT_HOLD_WINDOW_MS: Ms = 30 * MINUTE_MS;
pub const DEFAULT_LEAD_TIME_MS: Ms = 24 * HOUR_MS;
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

/// Everything the engine needs at construction. Nothing is read lazily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub interval_ms: Ms,
    pub hold_window_ms: Ms,
    pub lead_time_ms: Ms,
    pub data_dir: PathBuf,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            hold_window_ms: DEFAULT_HOLD_WINDOW_MS,
            lead_time_ms: DEFAULT_LEAD_TIME_MS,
            data_dir: PathBuf::from("./data"),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
    IntervalNotPositive(Ms),
    HoldShorterThanInterval { hold_window_ms: Ms, interval_ms: Ms },
    NegativeLeadTime(Ms),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value } => {
                write!(f, "invalid value for {key}: {value:?}")
            }
            ConfigError::IntervalNotPositive(ms) => {
                write!(f, "slot interval must be positive, got {ms}ms")
            }
            ConfigError::HoldShorterThanInterval {
                hold_window_ms,
                interval_ms,
            } => write!(
                f,
                "hold window {hold_window_ms}ms is shorter than slot interval {interval_ms}ms"
            ),
            ConfigError::NegativeLeadTime(ms) => {
                write!(f, "lead time must not be negative, got {ms}ms")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Read `SLOTBOOK_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(v) = lookup("SLOTBOOK_INTERVAL") {
            config.interval_ms = parse_duration_ms(&v).ok_or(ConfigError::InvalidValue {
                key: "SLOTBOOK_INTERVAL",
                value: v,
            })?;
        }
        if let Some(v) = lookup("SLOTBOOK_HOLD_WINDOW") {
            config.hold_window_ms = parse_duration_ms(&v).ok_or(ConfigError::InvalidValue {
                key: "SLOTBOOK_HOLD_WINDOW",
                value: v,
            })?;
        }
        if let Some(v) = lookup("SLOTBOOK_LEAD_TIME") {
            config.lead_time_ms = parse_duration_ms(&v).ok_or(ConfigError::InvalidValue {
                key: "SLOTBOOK_LEAD_TIME",
                value: v,
            })?;
        }
        if let Some(v) = lookup("SLOTBOOK_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SLOTBOOK_COMPACT_THRESHOLD") {
            config.compact_threshold = v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SLOTBOOK_COMPACT_THRESHOLD",
                value: v,
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms <= 0 {
            return Err(ConfigError::IntervalNotPositive(self.interval_ms));
        }
        if self.hold_window_ms < self.interval_ms {
            return Err(ConfigError::HoldShorterThanInterval {
                hold_window_ms: self.hold_window_ms,
                interval_ms: self.interval_ms,
            });
        }
        if self.lead_time_ms < 0 {
            return Err(ConfigError::NegativeLeadTime(self.lead_time_ms));
        }
        Ok(())
    }

    pub fn policy(&self) -> SlotPolicy {
        SlotPolicy {
            interval_ms: self.interval_ms,
            hold_window_ms: self.hold_window_ms,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("slotbook.wal")
    }
}

/// Parse `500ms`, `90s`, `15m`, `1h` or a compound like `1h30m`.
pub fn parse_duration_ms(s: &str) -> Option<Ms> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let mut total: Ms = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let value: Ms = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let factor = match &rest[..unit_len] {
            "ms" => 1,
            "s" => 1_000,
            "m" => MINUTE_MS,
            "h" => HOUR_MS,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(factor)?)?;
        rest = &rest[unit_len..];
    }
    Some(total)
}
