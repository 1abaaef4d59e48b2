//! Stages of a lifecycle operation and the callback context that carries them
//!
//! The invoker hands back, on every poll, the context map returned by the
//! previous poll. The map is decoded once at entry into [`CallbackContext`].

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

const STAGE_KEY: &str = "Stage";
const START_TIME_KEY: &str = "StartTime";
const NAME_KEY: &str = "Name";

/// Position of an operation in its state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Nothing has been submitted yet
    #[default]
    Init,
    /// The action was submitted to the engine
    Pending,
    /// The engine reports the action as running
    InProgress,
    /// The action finished successfully
    Complete,
    /// The action failed or timed out
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Pending => 1,
            Self::InProgress => 2,
            Self::Complete | Self::Failed => 3,
        }
    }

    /// Transitions never move backwards and never leave a terminal stage
    pub fn can_advance_to(&self, next: Stage) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Init" => Ok(Self::Init),
            "Pending" => Ok(Self::Pending),
            "InProgress" => Ok(Self::InProgress),
            "Complete" => Ok(Self::Complete),
            "Failed" => Ok(Self::Failed),
            other => Err(CoreError::UnknownStage {
                value: other.to_string(),
            }),
        }
    }
}

/// Start of an operation, kept exactly as it was first written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTime {
    raw: String,
    instant: DateTime<Utc>,
}

impl StartTime {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            raw: instant.to_rfc3339_opts(SecondsFormat::Secs, true),
            instant,
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let instant = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| CoreError::validation(format!("invalid StartTime '{raw}': {e}")))?
            .with_timezone(&Utc);
        Ok(Self {
            raw: raw.to_string(),
            instant,
        })
    }

    pub fn instant(&self) -> DateTime<Utc> {
        self.instant
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Decoded callback context
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallbackContext {
    pub stage: Stage,
    pub start_time: Option<StartTime>,
    /// Release name chosen at Init, so later polls never regenerate it
    pub name: Option<String>,
}

impl CallbackContext {
    /// Decode the invoker's context map.
    ///
    /// A missing map, a missing `Stage` or a null `Stage` mean `Init`. Any
    /// other value that is not a known stage name is rejected.
    pub fn from_map(map: Option<&Map<String, JsonValue>>) -> Result<Self> {
        let Some(map) = map else {
            return Ok(Self::default());
        };

        let stage = match map.get(STAGE_KEY) {
            None | Some(JsonValue::Null) => Stage::Init,
            Some(JsonValue::String(s)) => s.parse()?,
            Some(other) => {
                return Err(CoreError::UnknownStage {
                    value: other.to_string(),
                });
            }
        };

        let start_time = match map.get(START_TIME_KEY) {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(StartTime::parse(s)?),
            Some(other) => {
                return Err(CoreError::validation(format!(
                    "StartTime must be a string, got {other}"
                )));
            }
        };

        let name = match map.get(NAME_KEY) {
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };

        Ok(Self {
            stage,
            start_time,
            name,
        })
    }

    /// Encode for the invoker
    pub fn to_map(&self) -> Map<String, JsonValue> {
        let mut map = Map::new();
        map.insert(STAGE_KEY.into(), JsonValue::String(self.stage.to_string()));
        if let Some(start) = &self.start_time {
            map.insert(START_TIME_KEY.into(), JsonValue::String(start.as_str().into()));
        }
        if let Some(name) = &self.name {
            map.insert(NAME_KEY.into(), JsonValue::String(name.clone()));
        }
        map
    }

    /// Move to `next`.
    ///
    /// The first move out of `Init` records `now` as the start time; an
    /// adopted start time is never replaced.
    pub fn advance(&self, next: Stage, now: DateTime<Utc>) -> Result<Self> {
        if !self.stage.can_advance_to(next) {
            return Err(CoreError::validation(format!(
                "illegal stage transition {} -> {}",
                self.stage, next
            )));
        }
        let start_time = match (&self.start_time, next) {
            (Some(existing), _) => Some(existing.clone()),
            (None, Stage::Init) => None,
            (None, _) => Some(StartTime::at(now)),
        };
        Ok(Self {
            stage: next,
            start_time,
            name: self.name.clone(),
        })
    }
}

/// Deadline applied to every non-terminal poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    minutes: u32,
}

impl TimeoutPolicy {
    /// `configured` wins over `default_minutes`
    pub fn new(configured: Option<u32>, default_minutes: u32) -> Self {
        Self {
            minutes: configured.unwrap_or(default_minutes),
        }
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.minutes))
    }

    /// Elapsed time since `start`, or a timeout error once it reaches the deadline
    pub fn check(&self, start: &StartTime, now: DateTime<Utc>) -> Result<TimeDelta> {
        let elapsed = now.signed_duration_since(start.instant());
        tracing::info!(
            elapsed_secs = elapsed.num_seconds(),
            timeout_secs = self.duration().num_seconds(),
            "checking operation deadline"
        );
        if elapsed >= self.duration() {
            return Err(CoreError::Timeout {
                elapsed_secs: elapsed.num_seconds(),
                timeout_minutes: self.minutes,
            });
        }
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: JsonValue) -> Result<CallbackContext> {
        match value {
            JsonValue::Object(map) => CallbackContext::from_map(Some(&map)),
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_missing_or_null_stage_is_init() {
        assert_eq!(CallbackContext::from_map(None).unwrap().stage, Stage::Init);
        assert_eq!(ctx(json!({})).unwrap().stage, Stage::Init);
        assert_eq!(ctx(json!({"Stage": null})).unwrap().stage, Stage::Init);
    }

    #[test]
    fn test_unknown_stage_rejected() {
        assert!(matches!(
            ctx(json!({"Stage": "ReleaseStabilize"})),
            Err(CoreError::UnknownStage { .. })
        ));
        assert!(matches!(
            ctx(json!({"Stage": 3})),
            Err(CoreError::UnknownStage { .. })
        ));
    }

    #[test]
    fn test_start_time_preserved_verbatim() {
        let raw = "2024-03-01T10:00:00.123456+00:00";
        let decoded = ctx(json!({"Stage": "Pending", "StartTime": raw, "Name": "web"})).unwrap();
        assert_eq!(decoded.stage, Stage::Pending);
        assert_eq!(decoded.name.as_deref(), Some("web"));

        let advanced = decoded.advance(Stage::InProgress, Utc::now()).unwrap();
        assert_eq!(advanced.to_map()["StartTime"], json!(raw));
    }

    #[test]
    fn test_first_advance_records_start() {
        let now = Utc::now();
        let next = CallbackContext::default().advance(Stage::Pending, now).unwrap();
        assert_eq!(next.start_time.unwrap().instant().timestamp(), now.timestamp());
    }

    #[test]
    fn test_invalid_start_time_rejected() {
        assert!(matches!(
            ctx(json!({"Stage": "Pending", "StartTime": "yesterday"})),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert!(Stage::Init.can_advance_to(Stage::Pending));
        assert!(Stage::Pending.can_advance_to(Stage::Pending));
        assert!(Stage::Pending.can_advance_to(Stage::Complete));
        assert!(!Stage::InProgress.can_advance_to(Stage::Pending));
        assert!(!Stage::Complete.can_advance_to(Stage::Failed));
        assert!(!Stage::Failed.can_advance_to(Stage::Init));

        let pending = CallbackContext::default()
            .advance(Stage::InProgress, Utc::now())
            .unwrap();
        assert!(pending.advance(Stage::Pending, Utc::now()).is_err());
    }

    #[test]
    fn test_timeout_policy() {
        let now = Utc::now();
        let policy = TimeoutPolicy::new(None, 60);

        let old = StartTime::at(now - TimeDelta::minutes(61));
        assert!(matches!(
            policy.check(&old, now),
            Err(CoreError::Timeout { timeout_minutes: 60, .. })
        ));

        let recent = StartTime::at(now - TimeDelta::minutes(10));
        assert!(policy.check(&recent, now).is_ok());

        let exact = StartTime::at(now - TimeDelta::minutes(5));
        assert!(TimeoutPolicy::new(Some(5), 60).check(&exact, now).is_err());
    }
}
