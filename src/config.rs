//! Sleep configuration: which verbs are allowed and which kernel mode and
//! state tokens each verb tries, in order.

use crate::error::SleepError;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default configuration file location.
pub const CONFIG_PATH: &str = "/etc/sleepctl/sleep.conf";

/// Default delay before a suspended machine escalates to hibernation.
const DEFAULT_HIBERNATE_DELAY: Duration = Duration::from_secs(180 * 60);

/// A sleep operation requested on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verb {
    Suspend,
    Hibernate,
    HybridSleep,
    SuspendThenHibernate,
}

impl Verb {
    /// The verb as written on the command line and passed to hooks.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Suspend => "suspend",
            Self::Hibernate => "hibernate",
            Self::HybridSleep => "hybrid-sleep",
            Self::SuspendThenHibernate => "suspend-then-hibernate",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = SleepError;

    fn from_str(s: &str) -> Result<Self, SleepError> {
        match s {
            "suspend" => Ok(Self::Suspend),
            "hibernate" => Ok(Self::Hibernate),
            "hybrid-sleep" => Ok(Self::HybridSleep),
            "suspend-then-hibernate" => Ok(Self::SuspendThenHibernate),
            _ => Err(SleepError::Usage(format!("unknown command `{s}`"))),
        }
    }
}

/// Parsed sleep configuration.
#[derive(Clone, Debug)]
pub struct SleepConfig {
    pub allow_suspend: bool,
    pub allow_hibernate: bool,
    pub allow_hybrid_sleep: bool,
    pub allow_suspend_then_hibernate: bool,
    /// Disk mode candidates, tried in order. Empty for plain suspend.
    pub suspend_modes: Vec<String>,
    pub suspend_states: Vec<String>,
    pub hibernate_modes: Vec<String>,
    pub hibernate_states: Vec<String>,
    pub hybrid_modes: Vec<String>,
    pub hybrid_states: Vec<String>,
    /// Delay before a suspend-then-hibernate escalates to hibernation.
    pub hibernate_delay: Duration,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            allow_suspend: true,
            allow_hibernate: true,
            allow_hybrid_sleep: true,
            allow_suspend_then_hibernate: true,
            suspend_modes: Vec::new(),
            suspend_states: list(&["mem", "standby", "freeze"]),
            hibernate_modes: list(&["platform", "shutdown"]),
            hibernate_states: list(&["disk"]),
            hybrid_modes: list(&["suspend", "platform", "shutdown"]),
            hybrid_states: list(&["disk"]),
            hibernate_delay: DEFAULT_HIBERNATE_DELAY,
        }
    }
}

/// Mode and state candidates resolved for one verb.
#[derive(Debug)]
pub struct SleepSettings {
    pub allowed: bool,
    pub modes: Vec<String>,
    pub states: Vec<String>,
}

impl SleepConfig {
    /// Loads the configuration file at `path`.
    ///
    /// A missing file yields the defaults; any other read failure is an
    /// error.
    pub fn load(path: &Path) -> Result<Self, SleepError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(SleepError::io("read", path, err)),
        };
        Self::parse(&contents)
    }

    /// Parses the INI-style configuration text.
    ///
    /// Only keys in the `[Sleep]` section are honored. Unknown keys and
    /// sections are skipped so configurations written for newer versions
    /// still load.
    fn parse(contents: &str) -> Result<Self, SleepError> {
        let mut config = Self::default();
        let mut section = String::new();

        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].to_owned();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(SleepError::InvalidConfiguration(format!(
                    "line {}: expected `key=value`, got `{line}`",
                    lineno + 1
                )));
            };
            let (key, value) = (key.trim(), value.trim());
            if section != "Sleep" {
                debug!(section = %section, key, "ignoring key outside the [Sleep] section");
                continue;
            }
            match key {
                "AllowSuspend" => config.allow_suspend = parse_bool(key, value)?,
                "AllowHibernate" => config.allow_hibernate = parse_bool(key, value)?,
                "AllowHybridSleep" => config.allow_hybrid_sleep = parse_bool(key, value)?,
                "AllowSuspendThenHibernate" => {
                    config.allow_suspend_then_hibernate = parse_bool(key, value)?
                }
                "SuspendMode" => config.suspend_modes = parse_list(value),
                "SuspendState" => config.suspend_states = parse_list(value),
                "HibernateMode" => config.hibernate_modes = parse_list(value),
                "HibernateState" => config.hibernate_states = parse_list(value),
                "HybridSleepMode" => config.hybrid_modes = parse_list(value),
                "HybridSleepState" => config.hybrid_states = parse_list(value),
                "HibernateDelaySec" => config.hibernate_delay = parse_duration(key, value)?,
                _ => debug!(key, "ignoring unknown configuration key"),
            }
        }

        Ok(config)
    }

    /// Resolves the settings for `verb`.
    ///
    /// `suspend-then-hibernate` needs both underlying operations, so it is
    /// allowed only when both are; its settings carry the suspend lists and
    /// the sequencer switches to the hibernate lists on escalation.
    ///
    /// An empty state list is rejected here: the executor is never entered
    /// with zero candidates.
    pub fn settings(&self, verb: Verb) -> Result<SleepSettings, SleepError> {
        let (allowed, modes, states) = match verb {
            Verb::Suspend => (self.allow_suspend, &self.suspend_modes, &self.suspend_states),
            Verb::Hibernate => (
                self.allow_hibernate,
                &self.hibernate_modes,
                &self.hibernate_states,
            ),
            Verb::HybridSleep => (
                self.allow_hybrid_sleep,
                &self.hybrid_modes,
                &self.hybrid_states,
            ),
            Verb::SuspendThenHibernate => (
                self.allow_suspend_then_hibernate && self.allow_suspend && self.allow_hibernate,
                &self.suspend_modes,
                &self.suspend_states,
            ),
        };

        if states.is_empty() {
            return Err(SleepError::InvalidConfiguration(format!(
                "no power state configured for `{verb}`"
            )));
        }
        if verb == Verb::SuspendThenHibernate && self.hibernate_states.is_empty() {
            return Err(SleepError::InvalidConfiguration(format!(
                "no hibernation state configured for `{verb}`"
            )));
        }

        Ok(SleepSettings {
            allowed,
            modes: modes.clone(),
            states: states.clone(),
        })
    }
}

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_owned()).collect()
}

fn parse_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_owned).collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SleepError> {
    match value {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(SleepError::InvalidConfiguration(format!(
            "{key}: invalid boolean `{value}`"
        ))),
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, SleepError> {
    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => value.split_at(i),
        None => (value, ""),
    };
    let n: u64 = number.parse().map_err(|_| {
        SleepError::InvalidConfiguration(format!("{key}: invalid duration `{value}`"))
    })?;
    let secs = match unit.trim() {
        "" | "s" | "sec" => Some(n),
        "m" | "min" => n.checked_mul(60),
        "h" => n.checked_mul(3600),
        _ => {
            return Err(SleepError::InvalidConfiguration(format!(
                "{key}: invalid duration unit `{unit}`"
            )))
        }
    };
    let secs = secs.ok_or_else(|| {
        SleepError::InvalidConfiguration(format!("{key}: duration `{value}` is out of range"))
    })?;
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_verb_is_a_usage_error() {
        let err = "bogus".parse::<Verb>().unwrap_err();
        assert!(matches!(err, SleepError::Usage(_)));
        assert_eq!(err.errno(), libc::EINVAL);
    }

    #[test]
    fn defaults() {
        let config = SleepConfig::default();
        assert!(config.suspend_modes.is_empty());
        assert_eq!(config.suspend_states, ["mem", "standby", "freeze"]);
        assert_eq!(config.hibernate_modes, ["platform", "shutdown"]);
        assert_eq!(config.hibernate_states, ["disk"]);
        assert_eq!(config.hibernate_delay, Duration::from_secs(180 * 60));
    }

    #[test]
    fn parse_overrides_defaults() {
        let config = SleepConfig::parse(
            "# comment\n\
             [Sleep]\n\
             AllowHibernate=no\n\
             SuspendState=freeze\n\
             HibernateMode=shutdown\n\
             HibernateDelaySec=30min\n",
        )
        .unwrap();
        assert!(!config.allow_hibernate);
        assert!(config.allow_suspend);
        assert_eq!(config.suspend_states, ["freeze"]);
        assert_eq!(config.hibernate_modes, ["shutdown"]);
        assert_eq!(config.hibernate_delay, Duration::from_secs(30 * 60));
    }

    #[test]
    fn keys_outside_sleep_section_are_ignored() {
        let config = SleepConfig::parse("[Other]\nAllowSuspend=no\n").unwrap();
        assert!(config.allow_suspend);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = SleepConfig::parse("[Sleep]\nFutureKnob=1\n").unwrap();
        assert!(config.allow_suspend);
    }

    #[test]
    fn invalid_boolean_is_rejected() {
        let err = SleepConfig::parse("[Sleep]\nAllowSuspend=maybe\n").unwrap_err();
        assert!(matches!(err, SleepError::InvalidConfiguration(_)));
    }

    #[test]
    fn duration_units() {
        let parse = |v| SleepConfig::parse(&format!("[Sleep]\nHibernateDelaySec={v}\n"));
        assert_eq!(parse("90").unwrap().hibernate_delay, Duration::from_secs(90));
        assert_eq!(parse("90s").unwrap().hibernate_delay, Duration::from_secs(90));
        assert_eq!(
            parse("2h").unwrap().hibernate_delay,
            Duration::from_secs(7200)
        );
        assert!(parse("soon").is_err());
    }

    #[test]
    fn overflowing_duration_is_rejected() {
        let contents = format!("[Sleep]\nHibernateDelaySec={}h\n", u64::MAX);
        let err = SleepConfig::parse(&contents).unwrap_err();
        assert!(matches!(err, SleepError::InvalidConfiguration(_)));
    }

    #[test]
    fn empty_state_list_is_rejected_before_execution() {
        let config = SleepConfig::parse("[Sleep]\nSuspendState=\n").unwrap();
        let err = config.settings(Verb::Suspend).unwrap_err();
        assert!(matches!(err, SleepError::InvalidConfiguration(_)));
    }

    #[test]
    fn suspend_then_hibernate_needs_both_operations() {
        let config = SleepConfig::parse("[Sleep]\nAllowHibernate=no\n").unwrap();
        let settings = config.settings(Verb::SuspendThenHibernate).unwrap();
        assert!(!settings.allowed);

        let settings = SleepConfig::default()
            .settings(Verb::SuspendThenHibernate)
            .unwrap();
        assert!(settings.allowed);
        assert_eq!(settings.states, ["mem", "standby", "freeze"]);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = SleepConfig::load(Path::new("/nonexistent/sleep.conf")).unwrap();
        assert!(config.allow_suspend);
    }
}
