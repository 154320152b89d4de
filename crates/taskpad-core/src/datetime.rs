use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  SecondsFormat,
  TimeZone,
  Timelike,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::{
  Deserialize,
  Serialize
};

use crate::config::Config;
use crate::validate::ValidationError;

const TIMEZONE_ENV_VAR: &str =
  "TASKPAD_TIMEZONE";

/// Timezone in which deadlines become
/// calendar dates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayZone(Tz);

impl Default for DisplayZone {
  fn default() -> Self {
    Self(chrono_tz::UTC)
  }
}

impl DisplayZone {
  pub fn new(tz: Tz) -> Self {
    Self(tz)
  }

  pub fn resolve(cfg: &Config) -> Self {
    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
      && let Some(tz) = parse_timezone(
        &raw,
        TIMEZONE_ENV_VAR
      )
    {
      return Self(tz);
    }

    if let Some(raw) =
      cfg.get("display.timezone")
      && let Some(tz) = parse_timezone(
        &raw,
        "display.timezone"
      )
    {
      return Self(tz);
    }

    tracing::debug!(
      "no display timezone configured; \
       using UTC"
    );
    Self::default()
  }

  pub fn tz(&self) -> Tz {
    self.0
  }

  #[must_use]
  pub fn date_of(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    dt.with_timezone(&self.0)
      .date_naive()
  }

  #[must_use]
  pub fn today(&self) -> NaiveDate {
    self.date_of(Utc::now())
  }

  fn to_utc(
    &self,
    local_naive: NaiveDateTime
  ) -> anyhow::Result<DateTime<Utc>> {
    match self
      .0
      .from_local_datetime(&local_naive)
    {
      | LocalResult::Single(local_dt) => {
        Ok(local_dt.with_timezone(&Utc))
      }
      | LocalResult::Ambiguous(
        first,
        second
      ) => {
        tracing::warn!(
          first = %first,
          second = %second,
          "ambiguous local datetime; using earliest"
        );
        let chosen = if first <= second {
          first
        } else {
          second
        };
        Ok(chosen.with_timezone(&Utc))
      }
      | LocalResult::None => {
        Err(anyhow!(
          "local datetime {local_naive} \
           does not exist in {}",
          self.0
        ))
      }
    }
  }
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Time of day in `H:MM AM|PM` form.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
)]
#[serde(
  try_from = "String",
  into = "String"
)]
pub struct DueTime(NaiveTime);

impl DueTime {
  pub fn from_hm(
    hour: u32,
    minute: u32
  ) -> Option<Self> {
    NaiveTime::from_hms_opt(
      hour, minute, 0
    )
    .map(Self)
  }

  pub fn as_naive(&self) -> NaiveTime {
    self.0
  }
}

impl fmt::Display for DueTime {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    let (pm, hour) = self.0.hour12();
    write!(
      f,
      "{}:{:02} {}",
      hour,
      self.0.minute(),
      if pm { "PM" } else { "AM" }
    )
  }
}

impl FromStr for DueTime {
  type Err = ValidationError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    parse_clock_time(s)
      .and_then(|(h, m)| {
        DueTime::from_hm(h, m)
      })
      .ok_or_else(|| {
        ValidationError::InvalidDueTime(
          s.to_string()
        )
      })
  }
}

impl TryFrom<String> for DueTime {
  type Error = ValidationError;

  fn try_from(
    value: String
  ) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<DueTime> for String {
  fn from(value: DueTime) -> Self {
    value.to_string()
  }
}

fn parse_clock_time(
  token: &str
) -> Option<(u32, u32)> {
  static CLOCK_RE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  let clock_re = CLOCK_RE
    .get_or_init(|| {
      Regex::new(
        r"(?i)^(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<ampm>[ap]m)?$",
      )
      .ok()
    })
    .as_ref()?;
  let captures =
    clock_re.captures(token.trim())?;

  let raw_hour = captures
    .name("hour")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let minute = captures
    .name("minute")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  if minute > 59 {
    return None;
  }

  let hour = if let Some(ampm_match) =
    captures.name("ampm")
  {
    if raw_hour == 0 || raw_hour > 12 {
      return None;
    }
    let pm = ampm_match
      .as_str()
      .eq_ignore_ascii_case("pm");
    match (pm, raw_hour) {
      | (false, 12) => 0,
      | (false, h) => h,
      | (true, 12) => 12,
      | (true, h) => h + 12
    }
  } else {
    if raw_hour > 23 {
      return None;
    }
    raw_hour
  };

  Some((hour, minute))
}

/// Splits a wire `deadline` into a
/// calendar date and an optional time.
/// Midnight means "date only".
/// Unparseable input yields `None`.
pub fn parse_deadline(
  raw: &str,
  zone: DisplayZone
) -> Option<(NaiveDate, Option<DueTime>)>
{
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  let local = if let Ok(dt) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    dt.with_timezone(&zone.tz())
      .naive_local()
  } else if let Some(naive) =
    parse_naive_datetime(trimmed)
  {
    naive
  } else if let Ok(date) =
    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
  {
    return Some((date, None));
  } else {
    return None;
  };

  let time = local.time();
  let due_time = if time == NaiveTime::MIN
  {
    None
  } else {
    DueTime::from_hm(
      time.hour(),
      time.minute()
    )
  };
  Some((local.date(), due_time))
}

fn parse_naive_datetime(
  raw: &str
) -> Option<NaiveDateTime> {
  [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M"
  ]
  .iter()
  .find_map(|fmt| {
    NaiveDateTime::parse_from_str(
      raw, fmt
    )
    .ok()
  })
}

/// Joins a date and optional time into
/// the wire `deadline` (UTC, RFC 3339).
pub fn format_deadline(
  date: NaiveDate,
  time: Option<DueTime>,
  zone: DisplayZone
) -> anyhow::Result<String> {
  let local = date.and_time(
    time
      .map(|t| t.as_naive())
      .unwrap_or(NaiveTime::MIN)
  );
  let utc = zone.to_utc(local)?;
  Ok(utc.to_rfc3339_opts(
    SecondsFormat::Secs,
    true
  ))
}

/// "Today", "Tomorrow", "May 3", or
/// "May 3, 2025" outside the current
/// year.
pub fn date_label(
  date: NaiveDate,
  today: NaiveDate
) -> String {
  if date == today {
    return "Today".to_string();
  }
  if today.succ_opt() == Some(date) {
    return "Tomorrow".to_string();
  }
  if date.year() == today.year() {
    date.format("%b %-d").to_string()
  } else {
    date.format("%b %-d, %Y").to_string()
  }
}

/// Parses user-entered due dates:
/// `today`, `tomorrow`, weekday names,
/// `+Nd`, `+Nw`, or `YYYY-MM-DD`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_due_date(
  input: &str,
  today: NaiveDate
) -> Result<NaiveDate, ValidationError> {
  let invalid = || {
    ValidationError::InvalidDueDate(
      input.to_string()
    )
  };
  let lower =
    input.trim().to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return today
        .succ_opt()
        .ok_or_else(invalid);
    }
    | _ => {}
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(next_weekday_date(
      today, weekday
    ));
  }

  if let Some(rest) =
    lower.strip_prefix('+')
  {
    let unit = rest
      .chars()
      .last()
      .ok_or_else(invalid)?;
    let digits =
      &rest[..rest.len() - unit.len_utf8()];
    let n = digits
      .parse::<i64>()
      .map_err(|_| invalid())?;
    let days = match unit {
      | 'd' => n,
      | 'w' => n
        .checked_mul(7)
        .ok_or_else(invalid)?,
      | _ => return Err(invalid())
    };
    let span = Duration::try_days(days)
      .ok_or_else(invalid)?;
    return today
      .checked_add_signed(span)
      .ok_or_else(invalid);
  }

  NaiveDate::parse_from_str(
    lower.as_str(),
    "%Y-%m-%d"
  )
  .map_err(|_| invalid())
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}
