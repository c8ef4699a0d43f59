use crate::error::{Result, StandupError};
use crate::paths;
use crate::timers::PhaseTimers;
use crate::types::Phase;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Number of upcoming cycles checked for phase ordering at startup. Two weeks
/// covers weekday-only and alternating schedules.
const ORDER_CHECK_CYCLES: usize = 14;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn error(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Error,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: WarnLevel::Warning,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// IrcConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Channels the bot joins, with optional keys.
    #[serde(default)]
    pub definitions: Vec<ChannelDefinition>,
    /// Targets for submitted standups.
    #[serde(default)]
    pub publish: Vec<String>,
    /// Targets for reminder notices.
    #[serde(default)]
    pub remind: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcConfig {
    pub nick: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    pub server: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    /// Accept self-signed or expired certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Messages allowed per flood-protection window.
    #[serde(default = "default_flood_burst")]
    pub flood_burst: u32,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

fn default_irc_port() -> u16 {
    6667
}

fn default_reconnect_delay() -> u64 {
    30
}

fn default_flood_burst() -> u32 {
    4
}

impl IrcConfig {
    pub fn user_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.nick)
    }

    pub fn real_name(&self) -> &str {
        self.real_name.as_deref().unwrap_or(&self.nick)
    }
}

// ---------------------------------------------------------------------------
// TimersConfig
// ---------------------------------------------------------------------------

/// Cron expressions (seconds first) for each phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersConfig {
    #[serde(alias = "earlyReminder")]
    pub early_reminder: String,
    #[serde(alias = "dueReminder")]
    pub due_reminder: String,
    #[serde(alias = "lateReminder")]
    pub late_reminder: String,
    #[serde(alias = "deadlineReminder")]
    pub deadline_reminder: String,
    /// Offset the cron fields are evaluated in.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

fn default_utc_offset() -> String {
    "+00:00".to_string()
}

impl TimersConfig {
    pub fn expr(&self, phase: Phase) -> &str {
        match phase {
            Phase::Early => &self.early_reminder,
            Phase::Due => &self.due_reminder,
            Phase::Late => &self.late_reminder,
            Phase::Deadline => &self.deadline_reminder,
        }
    }
}

// ---------------------------------------------------------------------------
// ReminderPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderPolicy {
    /// Also message every missing member directly.
    #[serde(default)]
    pub direct_message: bool,
    /// Also publish the deadline message to the publish channels.
    #[serde(default)]
    pub publish_deadline: bool,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
}

fn default_send_timeout() -> u64 {
    10
}

fn default_max_concurrent_sends() -> usize {
    8
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            direct_message: false,
            publish_deadline: false,
            send_timeout_secs: default_send_timeout(),
            max_concurrent_sends: default_max_concurrent_sends(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReportConfig / ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Longest relayed line in bytes, label included. IRC caps a whole
    /// message at 512 bytes, so this leaves room for the command and target.
    #[serde(default = "default_line_width")]
    pub line_width: usize,
}

fn default_line_width() -> usize {
    400
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            line_width: default_line_width(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_http_port(),
            static_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub irc: IrcConfig,
    /// Members in reminder order.
    pub members: Vec<String>,
    #[serde(default = "default_members_dir")]
    pub members_dir: PathBuf,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    pub timers: TimersConfig,
    #[serde(default)]
    pub reminders: ReminderPolicy,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_members_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_MEMBERS_DIR)
}

fn default_database() -> PathBuf {
    PathBuf::from(paths::DEFAULT_DATABASE_FILE)
}

/// On-disk layout: everything lives under a top-level `config:` key.
#[derive(Serialize, Deserialize)]
struct ConfigFile {
    config: Config,
}

impl Config {
    /// Parse a YAML document without validating it.
    pub fn from_yaml(data: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(data)?;
        Ok(file.config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&ConfigFile {
            config: self.clone(),
        })?)
    }

    /// Read, parse and validate the config at `path`. Fails on any
    /// error-level finding so nothing starts with a broken schedule.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = Self::read(path)?;
        cfg.ensure_valid()?;
        Ok(cfg)
    }

    /// Read and parse the config at `path` without validating it.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StandupError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn phase_timers(&self) -> Result<PhaseTimers> {
        PhaseTimers::from_config(&self.timers)
    }

    pub fn ensure_valid(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(StandupError::InvalidConfig(errors))
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // 1. IRC connection
        if self.irc.nick.trim().is_empty() {
            warnings.push(ConfigWarning::error("irc.nick is empty"));
        }
        if self.irc.server.trim().is_empty() {
            warnings.push(ConfigWarning::error("irc.server is empty"));
        }
        if self.irc.port == 0 {
            warnings.push(ConfigWarning::error("irc.port must be non-zero"));
        }

        // 2. Channels: publish/remind targets must be joined
        let defined: HashSet<&str> = self
            .irc
            .channels
            .definitions
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        for (list, targets) in [
            ("publish", &self.irc.channels.publish),
            ("remind", &self.irc.channels.remind),
        ] {
            if targets.is_empty() {
                warnings.push(ConfigWarning::warning(format!(
                    "irc.channels.{list} is empty; nothing will be sent there"
                )));
            }
            for target in targets {
                if !defined.contains(target.as_str()) {
                    warnings.push(ConfigWarning::error(format!(
                        "channel '{target}' in irc.channels.{list} is not listed in irc.channels.definitions"
                    )));
                }
            }
        }

        // 3. Members
        if self.members.is_empty() {
            warnings.push(ConfigWarning::error("members is empty"));
        }
        let mut seen = HashSet::new();
        for member in &self.members {
            if !paths::is_valid_member(member) {
                warnings.push(ConfigWarning::error(format!(
                    "member '{member}' is not a valid IRC nickname"
                )));
            }
            if !seen.insert(member.as_str()) {
                warnings.push(ConfigWarning::error(format!(
                    "member '{member}' is listed more than once"
                )));
            }
        }
        if self.members_dir.as_os_str().is_empty() {
            warnings.push(ConfigWarning::error("members_dir is empty"));
        }

        // 4. Timers parse and fire in phase order
        match self.phase_timers() {
            Ok(timers) => {
                if let Err(e) = timers.check_cycle_order(Utc::now(), ORDER_CHECK_CYCLES) {
                    warnings.push(ConfigWarning::error(e.to_string()));
                }
            }
            Err(e) => warnings.push(ConfigWarning::error(e.to_string())),
        }

        // 5. Delivery and formatting limits
        if self.reminders.send_timeout_secs == 0 {
            warnings.push(ConfigWarning::error(
                "reminders.send_timeout_secs must be at least 1",
            ));
        }
        if self.reminders.max_concurrent_sends == 0 {
            warnings.push(ConfigWarning::error(
                "reminders.max_concurrent_sends must be at least 1",
            ));
        }
        if self.report.line_width < 40 {
            warnings.push(ConfigWarning::error(format!(
                "report.line_width {} is too small (minimum 40)",
                self.report.line_width
            )));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
config:
  irc:
    nick: standupbot
    server: irc.example.org
    channels:
      definitions:
        - name: "#team"
        - name: "#leads"
          password: hunter2
      publish: ["#team"]
      remind: ["#team", "#leads"]
  members: [alice, bob]
  timers:
    early_reminder: "0 45 9 * * Mon-Fri"
    due_reminder: "0 0 10 * * Mon-Fri"
    late_reminder: "0 15 10 * * Mon-Fri"
    deadline_reminder: "0 0 12 * * Mon-Fri"
"##;

    fn errors(cfg: &Config) -> Vec<String> {
        cfg.validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.irc.port, 6667);
        assert!(!cfg.irc.ssl);
        assert_eq!(cfg.irc.user_name(), "standupbot");
        assert_eq!(cfg.members_dir, PathBuf::from("./members"));
        assert_eq!(cfg.database, PathBuf::from("stats.db"));
        assert_eq!(cfg.timers.utc_offset, "+00:00");
        assert_eq!(cfg.reminders.send_timeout_secs, 10);
        assert_eq!(cfg.report.line_width, 400);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(
            cfg.irc.channels.definitions[1].password.as_deref(),
            Some("hunter2")
        );
    }

    #[test]
    fn minimal_config_is_valid() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        assert!(errors(&cfg).is_empty(), "{:?}", errors(&cfg));
        cfg.ensure_valid().unwrap();
    }

    #[test]
    fn camel_case_timer_keys_accepted() {
        let yaml = MINIMAL
            .replace("early_reminder", "earlyReminder")
            .replace("deadline_reminder", "deadlineReminder");
        let cfg = Config::from_yaml(&yaml).unwrap();
        assert_eq!(cfg.timers.expr(Phase::Early), "0 45 9 * * Mon-Fri");
        assert_eq!(cfg.timers.expr(Phase::Deadline), "0 0 12 * * Mon-Fri");
    }

    #[test]
    fn yaml_roundtrip() {
        let cfg = Config::from_yaml(MINIMAL).unwrap();
        let again = Config::from_yaml(&cfg.to_yaml().unwrap()).unwrap();
        assert_eq!(again.members, cfg.members);
        assert_eq!(again.timers.due_reminder, cfg.timers.due_reminder);
    }

    #[test]
    fn missing_required_field_is_a_parse_error() {
        let yaml = MINIMAL.replace("    server: irc.example.org\n", "");
        assert!(matches!(
            Config::from_yaml(&yaml).unwrap_err(),
            StandupError::Yaml(_)
        ));
    }

    #[test]
    fn duplicate_and_invalid_members_rejected() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.members = vec!["alice".into(), "alice".into(), "../root".into()];
        let errs = errors(&cfg);
        assert!(errs.iter().any(|e| e.contains("more than once")), "{errs:?}");
        assert!(errs.iter().any(|e| e.contains("not a valid IRC nickname")), "{errs:?}");
    }

    #[test]
    fn empty_members_rejected() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.members.clear();
        assert!(errors(&cfg).iter().any(|e| e == "members is empty"));
    }

    #[test]
    fn undefined_channel_rejected() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.irc.channels.remind.push("#nowhere".into());
        let errs = errors(&cfg);
        assert!(errs.iter().any(|e| e.contains("#nowhere")), "{errs:?}");
    }

    #[test]
    fn empty_remind_list_is_only_a_warning() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.irc.channels.remind.clear();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("remind")));
        assert!(errors(&cfg).is_empty());
    }

    #[test]
    fn bad_cron_rejected() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.timers.late_reminder = "not a schedule".into();
        let errs = errors(&cfg);
        assert!(errs.iter().any(|e| e.contains("late")), "{errs:?}");
    }

    #[test]
    fn phases_out_of_order_rejected() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.timers.due_reminder = "0 0 9 * * Mon-Fri".into();
        let err = cfg.ensure_valid().unwrap_err();
        assert!(matches!(err, StandupError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn zero_limits_rejected() {
        let mut cfg = Config::from_yaml(MINIMAL).unwrap();
        cfg.reminders.send_timeout_secs = 0;
        cfg.reminders.max_concurrent_sends = 0;
        cfg.report.line_width = 10;
        assert_eq!(errors(&cfg).len(), 3);
    }

    #[test]
    fn load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/standup.yaml")).unwrap_err();
        assert!(matches!(err, StandupError::ConfigNotFound(_)));
    }

    #[test]
    fn load_validates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL.replace("[alice, bob]", "[]")).unwrap();
        assert!(matches!(
            Config::load(&path).unwrap_err(),
            StandupError::InvalidConfig(_)
        ));

        std::fs::write(&path, MINIMAL).unwrap();
        assert_eq!(Config::load(&path).unwrap().members, vec!["alice", "bob"]);
    }

    #[test]
    fn shipped_example_config_is_valid() {
        let cfg = Config::from_yaml(include_str!("../../../conf/example-config.yaml")).unwrap();
        assert!(errors(&cfg).is_empty(), "{:?}", errors(&cfg));
        assert_eq!(cfg.irc.port, 6697);
        assert_eq!(cfg.server.static_dir, Some(PathBuf::from("./public")));
    }
}
