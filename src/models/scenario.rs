use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::models::metrics::ERRORS_COUNTER;

/// A probe scenario: who to hit, with how many virtual users, for how
/// long, and what the run must satisfy to pass.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub name: String,

    /// Environment variable holding the target hostname. The request URL
    /// is always `http://<value>`.
    pub target_env: String,

    pub vus: u64,

    #[serde(deserialize_with = "de_duration")]
    pub duration: Duration,

    /// Fixed sleep between iterations of each virtual user.
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub pacing: Option<Duration>,

    /// Per-request timeout. Defaults to 5s.
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub thresholds: HashMap<String, Vec<Threshold>>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Threshold {
    pub threshold: ThresholdExpr,
    #[serde(default)]
    pub abort_on_fail: bool,
}

/// A pass condition over a counter's final value, written in scenario
/// files as `"count == 0"`, `"count < 5"` or `"count <= 5"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdExpr {
    op: CmpOp,
    value: u64,
    source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Lt,
    Le,
}

impl ThresholdExpr {
    pub fn eq(value: u64) -> Self {
        Self {
            op: CmpOp::Eq,
            value,
            source: format!("count == {}", value),
        }
    }

    pub fn eval(&self, count: u64) -> bool {
        match self.op {
            CmpOp::Eq => count == self.value,
            CmpOp::Lt => count < self.value,
            CmpOp::Le => count <= self.value,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for ThresholdExpr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let rest = trimmed
            .strip_prefix("count")
            .ok_or_else(|| format!("threshold must compare `count`, got {:?}", trimmed))?
            .trim_start();

        let (op, rest) = if let Some(r) = rest.strip_prefix("==") {
            (CmpOp::Eq, r)
        } else if let Some(r) = rest.strip_prefix("<=") {
            (CmpOp::Le, r)
        } else if let Some(r) = rest.strip_prefix('<') {
            (CmpOp::Lt, r)
        } else {
            return Err(format!("unsupported comparison in threshold {:?}", trimmed));
        };

        let value = rest
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("invalid count in threshold {:?}", trimmed))?;

        Ok(Self {
            op,
            value,
            source: trimmed.to_string(),
        })
    }
}

impl<'de> Deserialize<'de> for ThresholdExpr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl ScenarioConfig {
    /// Probe the application load balancer hard: any failed check aborts
    /// the run immediately.
    pub fn app() -> Self {
        Self {
            name: "app".to_string(),
            target_env: "APP_LB_DNS".to_string(),
            vus: 10,
            duration: Duration::from_secs(180),
            pacing: None,
            timeout: None,
            thresholds: HashMap::from([(
                ERRORS_COUNTER.to_string(),
                vec![Threshold {
                    threshold: ThresholdExpr::eq(0),
                    abort_on_fail: true,
                }],
            )]),
        }
    }

    /// Probe the echoserver load balancer at a gentle fixed pace and
    /// judge the error count only at the end of the run.
    pub fn echoserver() -> Self {
        Self {
            name: "echoserver".to_string(),
            target_env: "ECHOSERVER_LB_DNS".to_string(),
            vus: 10,
            duration: Duration::from_secs(30),
            pacing: Some(Duration::from_secs(1)),
            timeout: None,
            thresholds: HashMap::from([(
                ERRORS_COUNTER.to_string(),
                vec![Threshold {
                    threshold: ThresholdExpr::eq(0),
                    abort_on_fail: false,
                }],
            )]),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Box<dyn Error>> {
        for counter in self.thresholds.keys() {
            if counter != ERRORS_COUNTER {
                return Err(format!(
                    "threshold references unknown counter {:?}, only {:?} exists",
                    counter, ERRORS_COUNTER
                )
                .into());
            }
        }
        Ok(())
    }

    /// Resolve the request target from the environment. An unset or empty
    /// variable substitutes the literal `undefined`, so the run proceeds
    /// and every check fails instead of the process crashing.
    pub fn resolve_target(&self) -> String {
        let host = std::env::var(&self.target_env)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "undefined".to_string());
        format!("http://{}", host)
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeout.unwrap_or(Duration::from_millis(5000))
    }

    pub fn abort_thresholds(&self) -> Vec<Threshold> {
        self.thresholds
            .get(ERRORS_COUNTER)
            .map(|list| list.iter().filter(|t| t.abort_on_fail).cloned().collect())
            .unwrap_or_default()
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration cannot be empty".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let unit_start = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("invalid duration {:?}", s))?;
    let (digits, unit) = s.split_at(unit_start);
    let value = digits
        .parse::<u64>()
        .map_err(|_| format!("invalid duration {:?}", s))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        other => Err(format!("unknown duration unit {:?} in {:?}", other, s)),
    }
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn de_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Secs(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(Raw::Text(text)) => parse_duration(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
