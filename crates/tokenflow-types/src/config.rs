//! Ledger configuration.
//!
//! Every field has a default, so a partial JSON document is a valid config.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result, constants};

/// Timing and capacity knobs shared by every party and the notary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// How long after construction a transaction remains acceptable to the
    /// notary.
    pub validity_horizon: Duration,
    /// Lifetime of a claim before it is swept back into the pool.
    pub claim_ttl: Duration,
    /// Deadline for each counterparty to countersign or reject.
    pub counterparty_timeout: Duration,
    /// Deadline for one notary request.
    pub notary_timeout: Duration,
    /// How long a responder waits for finality before abandoning.
    pub finality_timeout: Duration,
    /// Bounded capacity of the notary request queue.
    pub notary_queue_depth: usize,
    /// Number of finished responder outcomes a party keeps for inspection.
    pub responder_history: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            validity_horizon: Duration::from_millis(constants::DEFAULT_VALIDITY_HORIZON_MS),
            claim_ttl: Duration::from_millis(constants::DEFAULT_CLAIM_TTL_MS),
            counterparty_timeout: Duration::from_millis(constants::DEFAULT_COUNTERPARTY_TIMEOUT_MS),
            notary_timeout: Duration::from_millis(constants::DEFAULT_NOTARY_TIMEOUT_MS),
            finality_timeout: Duration::from_millis(constants::DEFAULT_FINALITY_TIMEOUT_MS),
            notary_queue_depth: constants::DEFAULT_NOTARY_QUEUE_DEPTH,
            responder_history: constants::DEFAULT_RESPONDER_HISTORY,
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a JSON document.
    ///
    /// # Errors
    /// Returns `Configuration` on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LedgerError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns `Configuration` if any duration is zero or longer than
    /// [`constants::MAX_DURATION_MS`], or if a capacity is zero.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("validity_horizon", self.validity_horizon),
            ("claim_ttl", self.claim_ttl),
            ("counterparty_timeout", self.counterparty_timeout),
            ("notary_timeout", self.notary_timeout),
            ("finality_timeout", self.finality_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(LedgerError::Configuration(format!("{name} must be non-zero")));
            }
            if value > Duration::from_millis(constants::MAX_DURATION_MS) {
                return Err(LedgerError::Configuration(format!(
                    "{name} must not exceed {}ms",
                    constants::MAX_DURATION_MS
                )));
            }
        }
        let capacities = [
            ("notary_queue_depth", self.notary_queue_depth),
            ("responder_history", self.responder_history),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(LedgerError::Configuration(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// `now + duration`.
///
/// # Errors
/// `Configuration` if the deadline is not a representable timestamp.
pub fn deadline_after(now: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| LedgerError::Configuration(format!("{duration:?} after {now} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.validity_horizon, Duration::from_secs(24 * 60 * 60));
        assert_eq!(cfg.claim_ttl, Duration::from_secs(300));
        assert_eq!(cfg.counterparty_timeout.as_millis(), 30_000);
        assert_eq!(cfg.notary_timeout.as_millis(), 10_000);
        assert_eq!(cfg.finality_timeout.as_millis(), 60_000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = LedgerConfig::from_json_str(r#"{"notary_queue_depth": 8}"#).unwrap();
        assert_eq!(cfg.notary_queue_depth, 8);
        assert_eq!(cfg.claim_ttl, LedgerConfig::default().claim_ttl);
    }

    #[test]
    fn zero_duration_rejected() {
        let json = r#"{"claim_ttl": {"secs": 0, "nanos": 0}}"#;
        let err = LedgerConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(ref m) if m.contains("claim_ttl")));
    }

    #[test]
    fn malformed_json_rejected() {
        assert!(matches!(
            LedgerConfig::from_json_str("{not json"),
            Err(LedgerError::Configuration(_))
        ));
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = LedgerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back = LedgerConfig::from_json_str(&json).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn deadlines() {
        let now = Utc::now();
        let cfg = LedgerConfig::default();
        assert_eq!(
            deadline_after(now, cfg.validity_horizon).unwrap(),
            now + chrono::Duration::days(1)
        );
        assert!(matches!(
            deadline_after(now, Duration::from_secs(u64::MAX)),
            Err(LedgerError::Configuration(_))
        ));
    }

    #[test]
    fn oversized_duration_rejected() {
        let cfg = LedgerConfig {
            claim_ttl: Duration::from_secs(u64::MAX),
            ..LedgerConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(ref m) if m.contains("claim_ttl")));
    }
}
