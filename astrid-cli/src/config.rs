use anyhow::{Context, Result};
use astrid_core::time::parse_time_of_day;
use astrid_core::{QuietHours, ReminderPreferences};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::ensure_astrid_home;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reminders: RemindersSection,
    #[serde(default)]
    pub quiet_hours: QuietHoursSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersSection {
    pub enabled: bool,
    /// IANA zone used for time-of-day rules, e.g. "Europe/Berlin".
    pub timezone: String,
    /// Reminder time for tasks due on a date without a time ("HH:MM").
    pub default_time: String,
    /// Jitter reminder times; off gives reproducible schedules.
    pub randomize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHoursSection {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

impl Default for RemindersSection {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: "UTC".to_string(),
            default_time: "18:00".to_string(),
            randomize: true,
        }
    }
}

impl Default for QuietHoursSection {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
        }
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz> {
        let tz = &self.reminders.timezone;
        tz.parse()
            .map_err(|_| anyhow::anyhow!("invalid timezone in config: {tz}"))
    }

    pub fn preferences(&self) -> Result<ReminderPreferences> {
        let default_time = parse_time_of_day(&self.reminders.default_time)
            .context("[reminders].default_time")?;

        let mut prefs = ReminderPreferences::default()
            .with_timezone(self.timezone()?)
            .with_default_time(default_time);
        prefs.enabled = self.reminders.enabled;
        if !self.reminders.randomize {
            prefs = prefs.without_randomization();
        }

        if self.quiet_hours.enabled {
            let start = parse_time_of_day(&self.quiet_hours.start).context("[quiet_hours].start")?;
            let end = parse_time_of_day(&self.quiet_hours.end).context("[quiet_hours].end")?;
            prefs = prefs.with_quiet_hours(QuietHours::new(start, end));
        }
        Ok(prefs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_astrid_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    let cfg = Config::default();
    save_config(&cfg)?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config() -> Result<()> {
    let p = config_path()?;
    let cfg = load_config()?;
    // Fail early on values the engine cannot use.
    cfg.preferences()?;
    println!("# {}{}", p.display(), if p.exists() { "" } else { " (defaults)" });
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [reminders]
            timezone = "America/Chicago"

            [quiet_hours]
            enabled = true
            "#,
        )
        .unwrap();

        let prefs = cfg.preferences().unwrap();
        assert!(prefs.enabled);
        assert!(prefs.randomize);
        assert_eq!(prefs.timezone, chrono_tz::America::Chicago);
        assert_eq!(prefs.default_time, NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        let quiet = prefs.quiet_hours.unwrap();
        assert_eq!(quiet.start, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert_eq!(quiet.end, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    }

    #[test]
    fn quiet_hours_are_off_unless_enabled() {
        let prefs = Config::default().preferences().unwrap();
        assert!(prefs.quiet_hours.is_none());
    }

    #[test]
    fn bad_values_are_reported() {
        let mut cfg = Config::default();
        cfg.reminders.timezone = "Mars/Olympus".to_string();
        assert!(cfg.preferences().is_err());

        let mut cfg = Config::default();
        cfg.reminders.default_time = "6pm".to_string();
        let err = cfg.preferences().unwrap_err();
        assert!(format!("{err:#}").contains("default_time"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("config.toml")).unwrap();
        assert!(cfg.reminders.enabled);
        assert_eq!(cfg.reminders.timezone, "UTC");
    }
}
