use crate::attendance::geo::{GeoFence, OfficeLocation};
use crate::attendance::ledger::EtaPolicy;
use crate::database::store::WorkHours;
use crate::utils::time::{business_offset, parse_time_string};
use anyhow::{Context, Result};
use chrono::{Duration, FixedOffset, NaiveTime};
use std::env;
use std::str::FromStr;
use tracing::warn;

const DEFAULT_UTC_OFFSET_MINUTES: i32 = 9 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub admin_role_id: Option<String>,
    pub timezone: FixedOffset,
    pub office: Option<OfficeConfig>,
    pub geofence_strict: bool,
    pub default_work_hours: WorkHours,
    pub reminder_lead: Duration,
    pub stats_time: NaiveTime,
    pub event_reminder_lead: Duration,
    pub eta_policy: EtaPolicy,
}

/// Raw office coordinates as configured. Validated when the geofence is built.
#[derive(Debug, Clone, Copy)]
pub struct OfficeConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let discord_token = env::var("DISCORD_TOKEN")
            .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN environment variable is required"))?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:attendance.db".to_string());

        let admin_role_id = env::var("ADMIN_ROLE_ID").ok();

        let timezone = business_offset(parse_or("BUSINESS_UTC_OFFSET_MINUTES", DEFAULT_UTC_OFFSET_MINUTES)?)?;

        let default_work_hours = WorkHours {
            start: time_or("DEFAULT_WORK_START", "09:00")?,
            end: time_or("DEFAULT_WORK_END", "18:00")?,
        };
        if default_work_hours.end <= default_work_hours.start {
            anyhow::bail!("DEFAULT_WORK_END must be later than DEFAULT_WORK_START");
        }

        let eta_policy = EtaPolicy {
            require_future: parse_or("ETA_REQUIRE_FUTURE", false)?,
            max_ahead: parse_opt::<i64>("ETA_MAX_AHEAD_MINUTES")?
                .map(|m| minutes("ETA_MAX_AHEAD_MINUTES", m))
                .transpose()?,
        };

        Ok(Config {
            discord_token,
            database_url,
            admin_role_id,
            timezone,
            office: office_from_env(),
            geofence_strict: parse_or("GEOFENCE_STRICT", false)?,
            default_work_hours,
            reminder_lead: minutes_or("REMINDER_LEAD_MINUTES", 10)?,
            stats_time: time_or("STATS_TIME", "10:00")?,
            event_reminder_lead: minutes_or("EVENT_REMINDER_LEAD_MINUTES", 60)?,
            eta_policy,
        })
    }

    /// Builds the office geofence. Missing or invalid coordinates yield a
    /// permissive fence instead of an error.
    pub fn geofence(&self) -> GeoFence {
        let Some(office) = self.office else {
            warn!("Office location is not configured, every check-in counts as inside the office");
            return GeoFence::unavailable("office location not configured");
        };

        match OfficeLocation::new(office.latitude, office.longitude, office.radius_meters) {
            Ok(location) => GeoFence::new(location),
            Err(e) => {
                warn!("Invalid office location ({}), every check-in counts as inside the office", e);
                GeoFence::unavailable(e.to_string())
            }
        }
    }
}

fn office_from_env() -> Option<OfficeConfig> {
    let read = |key: &str| -> Option<f64> {
        let value = env::var(key).ok()?;
        match value.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key, %value, "Ignoring unparsable office setting");
                None
            }
        }
    };

    Some(OfficeConfig {
        latitude: read("OFFICE_LATITUDE")?,
        longitude: read("OFFICE_LONGITUDE")?,
        radius_meters: read("OFFICE_RADIUS_METERS")?,
    })
}

fn parse_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value {:?}: {}", key, value, e)),
        _ => Ok(None),
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(key)?.unwrap_or(default))
}

fn minutes(key: &str, value: i64) -> Result<Duration> {
    Duration::try_minutes(value).with_context(|| format!("{} is out of range: {}", key, value))
}

fn minutes_or(key: &str, default: i64) -> Result<Duration> {
    minutes(key, parse_or(key, default)?)
}

fn time_or(key: &str, default: &str) -> Result<NaiveTime> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    parse_time_string(&value).with_context(|| format!("{} must be HH:MM", key))
}
