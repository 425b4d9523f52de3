use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use tracing::{
  debug,
  warn
};

use crate::config::Config;

pub const TIMEZONE_ENV_VAR: &str =
  "RILL_TIMEZONE";
pub const DUE_FORMAT: &str = "%Y-%m-%d";

/// Timezone used to decide which
/// calendar day it is. `RILL_TIMEZONE`
/// wins over the `timezone` rc key;
/// falls back to UTC.
pub fn resolve_timezone(
  cfg: &Config
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(raw) = cfg.get("timezone")
    && let Some(tz) =
      parse_timezone(&raw, "rc")
  {
    return tz;
  }

  chrono_tz::UTC
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      debug!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      warn!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id; ignoring"
      );
      None
    }
  }
}

#[must_use]
pub fn today(
  now: DateTime<Utc>,
  tz: Tz
) -> NaiveDate {
  now.with_timezone(&tz).date_naive()
}

/// First instant of `date` in `tz`.
#[must_use]
pub fn start_of_day(
  date: NaiveDate,
  tz: Tz
) -> DateTime<Utc> {
  let midnight =
    date.and_time(NaiveTime::MIN);
  match tz.from_local_datetime(&midnight)
  {
    | LocalResult::Single(dt) => {
      dt.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      first.min(second).with_timezone(&Utc)
    }
    | LocalResult::None => {
      // midnight skipped by a DST jump
      let one_am = midnight
        + Duration::hours(1);
      tz.from_local_datetime(&one_am)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| {
          midnight.and_utc()
        })
    }
  }
}

/// A due date is overdue once its day
/// has started.
#[must_use]
pub fn is_overdue(
  due: NaiveDate,
  now: DateTime<Utc>,
  tz: Tz
) -> bool {
  start_of_day(due, tz) < now
}

#[must_use]
pub fn format_due(
  date: NaiveDate
) -> String {
  date.format(DUE_FORMAT).to_string()
}

#[tracing::instrument(skip(now, tz), fields(input = input))]
pub fn parse_due_expr(
  input: &str,
  now: DateTime<Utc>,
  tz: Tz
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let base = today(now, tz);

  match lower.as_str() {
    | "today" => return Ok(base),
    | "tomorrow" => {
      return shift_days(base, 1);
    }
    | "yesterday" => {
      return shift_days(base, -1);
    }
    | _ => {}
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, DUE_FORMAT
    )
  {
    return Ok(date);
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let num: i64 = caps["num"]
      .parse()
      .context(
        "invalid relative date amount"
      )?;
    let days = match &caps["unit"] {
      | "w" => num.saturating_mul(7),
      | _ => num
    };
    let signed = if &caps["sign"] == "-"
    {
      -days
    } else {
      days
    };
    return shift_days(base, signed);
  }

  if let Some(weekday) =
    parse_weekday_name(&lower)
  {
    return next_weekday_date(
      base, weekday
    );
  }

  Err(anyhow!(
    "unrecognized due date: \
     {token} (use YYYY-MM-DD, today, \
     tomorrow, +Nd, +Nw or a weekday)"
  ))
}

fn shift_days(
  base: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  Duration::try_days(days)
    .and_then(|delta| {
      base.checked_add_signed(delta)
    })
    .ok_or_else(|| {
      anyhow!(
        "due date out of range: \
         {days} days from {base}"
      )
    })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token {
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
) -> anyhow::Result<NaiveDate> {
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
  shift_days(from, delta)
}
