//! Cron expressions.
//!
//! An expression has six whitespace separated fields, or five with the
//! seconds field omitted (it then defaults to `0`):
//!
//! | Field | Values | Extra tokens |
//! |-------|--------|--------------|
//! | second | 0-59 | |
//! | minute | 0-59 | |
//! | hour | 0-23 | |
//! | day of month | 1-31 | `?` `L` `nL` `LW` `nW` |
//! | month | 1-12 or `JAN`-`DEC` | |
//! | day of week | 1-7 (Monday first, 0 is Sunday too) or `MON`-`SUN` | `?` `nL` `d#k` |
//!
//! Every field accepts `*`, values, ranges `a-b`, steps `*/n`, `a/n`,
//! `a-b/n`, comma separated lists and `R`, a value picked from a seeded
//! generator so that a job keeps the same slot across evaluations. Day of
//! month and day of week must both match.
//!
//! ```rust
//! use chrono::NaiveDate;
//! use rxsignal::cron::Cron;
//!
//! let noon = Cron::parse("0 0 12 * * ?").unwrap();
//! let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
//! let next = noon.next(base).unwrap();
//! assert_eq!(next.to_string(), "2024-01-02 12:00:00");
//! ```

use std::{
  collections::hash_map::DefaultHasher,
  fmt,
  hash::{Hash, Hasher},
  str::FromStr,
};

use chrono::{
  DateTime, Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike,
  Weekday,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
  #[error("cron expression '{expression}' has {found} fields, expected 5 or 6")]
  FieldCount { expression: String, found: usize },
  #[error("invalid {field} token '{token}'")]
  InvalidToken { field: &'static str, token: String },
  #[error("no matching time up to {limit}")]
  NotFound { limit: NaiveDateTime },
}

const MONTHS: [&str; 12] =
  ["JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC"];
const WEEKDAYS: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
  Second,
  Minute,
  Hour,
  DayOfMonth,
  Month,
  DayOfWeek,
}

impl Kind {
  fn name(self) -> &'static str {
    match self {
      Kind::Second => "second",
      Kind::Minute => "minute",
      Kind::Hour => "hour",
      Kind::DayOfMonth => "day-of-month",
      Kind::Month => "month",
      Kind::DayOfWeek => "day-of-week",
    }
  }

  /// The span `*` covers.
  fn range(self) -> (u32, u32) {
    match self {
      Kind::Second | Kind::Minute => (0, 59),
      Kind::Hour => (0, 23),
      Kind::DayOfMonth => (1, 31),
      Kind::Month => (1, 12),
      Kind::DayOfWeek => (1, 7),
    }
  }

  /// The span `R` picks from; days stop at 28 so every month has a match.
  fn random_range(self) -> (u32, u32) {
    match self {
      Kind::DayOfMonth => (1, 28),
      _ => self.range(),
    }
  }

  fn names(self) -> &'static [&'static str] {
    match self {
      Kind::Month => &MONTHS,
      Kind::DayOfWeek => &WEEKDAYS,
      _ => &[],
    }
  }

  /// Parses a number or a name and checks it against the field bounds.
  fn value(self, text: &str) -> Option<u32> {
    let value = match digits(text) {
      Some(value) => value,
      None => self.names().iter().position(|name| *name == text).map(|i| i as u32 + 1)?,
    };
    let (min, max) = self.range();
    let lowest = if self == Kind::DayOfWeek { 0 } else { min };
    (lowest..=max).contains(&value).then_some(value)
  }
}

fn digits(text: &str) -> Option<u32> {
  if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  text.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
  Range { start: u32, end: u32, step: u32 },
  /// `?`
  Any,
  /// `L` or `nL` in day of month: `n` days before the last day.
  LastDay(u32),
  /// `LW`
  LastWeekday,
  /// `nW`
  NearestWeekday(u32),
  /// `dL` in day of week: the last weekday `d` of the month.
  LastOf(u32),
  /// `d#k`
  Nth(u32, u32),
}

impl Part {
  fn parse(kind: Kind, token: &str, rng: &mut StdRng) -> Result<Part, CronError> {
    Self::parse_upper(kind, &token.to_ascii_uppercase(), rng)
      .ok_or_else(|| CronError::InvalidToken { field: kind.name(), token: token.to_string() })
  }

  fn parse_upper(kind: Kind, text: &str, rng: &mut StdRng) -> Option<Part> {
    let (min, max) = kind.range();
    let day_of_month = kind == Kind::DayOfMonth;
    let day_of_week = kind == Kind::DayOfWeek;

    match text {
      "*" => return Some(Part::Range { start: min, end: max, step: 1 }),
      "?" if day_of_month || day_of_week => return Some(Part::Any),
      "L" if day_of_month => return Some(Part::LastDay(0)),
      "LW" if day_of_month => return Some(Part::LastWeekday),
      "R" => {
        let (low, high) = kind.random_range();
        let value = rng.gen_range(low..=high);
        return Some(Part::Range { start: value, end: value, step: 1 });
      }
      _ => {}
    }

    if let Some((range, step)) = text.split_once('/') {
      let step = digits(step).filter(|step| *step > 0)?;
      let (start, end) = match range.split_once('-') {
        _ if range == "*" => (min, max),
        Some((start, end)) => (kind.value(start)?, kind.value(end)?),
        None => (kind.value(range)?, max),
      };
      return range_part(start, end, step);
    }
    if day_of_week {
      if let Some((day, nth)) = text.split_once('#') {
        let nth = digits(nth).filter(|nth| (1..=5).contains(nth))?;
        return Some(Part::Nth(kind.value(day)?, nth));
      }
      if let Some(day) = text.strip_suffix('L') {
        return kind.value(day).map(Part::LastOf);
      }
    }
    if day_of_month {
      if let Some(day) = text.strip_suffix('W') {
        return kind.value(day).map(Part::NearestWeekday);
      }
      if let Some(offset) = text.strip_suffix('L') {
        return digits(offset).filter(|offset| *offset < 31).map(Part::LastDay);
      }
    }
    match text.split_once('-') {
      Some((start, end)) => range_part(kind.value(start)?, kind.value(end)?, 1),
      None => kind.value(text).map(|value| Part::Range { start: value, end: value, step: 1 }),
    }
  }

  fn contains(&self, value: u32) -> bool {
    match *self {
      Part::Range { start, end, step } => start <= value && value <= end && (value - start) % step == 0,
      Part::Any => true,
      _ => false,
    }
  }

  fn matches_day(&self, kind: Kind, date: NaiveDate) -> bool {
    let day = date.day();
    let weekday = date.weekday().number_from_monday();
    let last = days_in_month(date);
    match *self {
      Part::Any => true,
      Part::Range { .. } if kind == Kind::DayOfWeek => is_weekday(self, weekday),
      Part::Range { .. } => self.contains(day),
      Part::LastDay(offset) => last.checked_sub(offset) == Some(day),
      Part::LastWeekday => day == nearest_weekday(date, last),
      Part::NearestWeekday(target) => target <= last && day == nearest_weekday(date, target),
      Part::LastOf(expected) => same_weekday(expected, weekday) && day + 7 > last,
      Part::Nth(expected, nth) => same_weekday(expected, weekday) && (day - 1) / 7 + 1 == nth,
    }
  }
}

fn range_part(start: u32, end: u32, step: u32) -> Option<Part> {
  (start <= end).then_some(Part::Range { start, end, step })
}

/// `0` and `7` both stand for Sunday.
fn same_weekday(expected: u32, actual: u32) -> bool {
  expected == actual || (expected == 0 && actual == 7)
}

fn is_weekday(part: &Part, weekday: u32) -> bool {
  part.contains(weekday) || (weekday == 7 && part.contains(0))
}

fn days_in_month(date: NaiveDate) -> u32 {
  let (year, month) = (date.year(), date.month());
  let next = if month == 12 {
    NaiveDate::from_ymd_opt(year + 1, 1, 1)
  } else {
    NaiveDate::from_ymd_opt(year, month + 1, 1)
  };
  next.and_then(|first| first.pred_opt()).map_or(31, |last| last.day())
}

/// The Monday-to-Friday day closest to `target` without leaving the month.
fn nearest_weekday(date: NaiveDate, target: u32) -> u32 {
  let last = days_in_month(date);
  match date.with_day(target).map(|day| day.weekday()) {
    Some(Weekday::Sat) if target == 1 => 3,
    Some(Weekday::Sat) => target - 1,
    Some(Weekday::Sun) if target == last => target - 2,
    Some(Weekday::Sun) => target + 1,
    _ => target,
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
  kind: Kind,
  parts: Vec<Part>,
}

impl Field {
  fn parse(kind: Kind, text: &str, rng: &mut StdRng) -> Result<Field, CronError> {
    let parts = text
      .split(',')
      .map(|token| Part::parse(kind, token, rng))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Field { kind, parts })
  }

  fn matches(&self, value: u32) -> bool { self.parts.iter().any(|part| part.contains(value)) }

  fn matches_day(&self, date: NaiveDate) -> bool {
    self.parts.iter().any(|part| part.matches_day(self.kind, date))
  }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cron {
  seconds: Field,
  minutes: Field,
  hours: Field,
  days: Field,
  months: Field,
  weekdays: Field,
  expression: String,
}

impl Cron {
  /// Parses `expression`, seeding `R` tokens from the expression text.
  pub fn parse(expression: &str) -> Result<Self, CronError> {
    let mut hasher = DefaultHasher::new();
    expression.hash(&mut hasher);
    Self::parse_with_seed(expression, hasher.finish())
  }

  /// Parses `expression`, seeding `R` tokens with `seed`.
  pub fn parse_with_seed(expression: &str, seed: u64) -> Result<Self, CronError> {
    let mut tokens: Vec<&str> = expression.split_whitespace().collect();
    match tokens.len() {
      6 => {}
      5 => tokens.insert(0, "0"),
      found => {
        return Err(CronError::FieldCount { expression: expression.to_string(), found });
      }
    }
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(Cron {
      seconds: Field::parse(Kind::Second, tokens[0], &mut rng)?,
      minutes: Field::parse(Kind::Minute, tokens[1], &mut rng)?,
      hours: Field::parse(Kind::Hour, tokens[2], &mut rng)?,
      days: Field::parse(Kind::DayOfMonth, tokens[3], &mut rng)?,
      months: Field::parse(Kind::Month, tokens[4], &mut rng)?,
      weekdays: Field::parse(Kind::DayOfWeek, tokens[5], &mut rng)?,
      expression: tokens.join(" "),
    })
  }

  /// The first matching time strictly after `base`, searching at most four
  /// years ahead.
  pub fn next(&self, base: NaiveDateTime) -> Result<NaiveDateTime, CronError> {
    let limit = base.checked_add_months(Months::new(48)).unwrap_or(NaiveDateTime::MAX);
    let not_found = || CronError::NotFound { limit };
    let mut time = base.with_nanosecond(0).and_then(next_second).ok_or_else(not_found)?;

    while time <= limit {
      let step = if !self.months.matches(time.month()) {
        next_month(time)
      } else if !(self.days.matches_day(time.date()) && self.weekdays.matches_day(time.date())) {
        next_day(time)
      } else if !self.hours.matches(time.hour()) {
        next_hour(time)
      } else if !self.minutes.matches(time.minute()) {
        next_minute(time)
      } else if !self.seconds.matches(time.second()) {
        next_second(time)
      } else {
        return Ok(time);
      };
      time = step.ok_or_else(not_found)?;
    }
    Err(not_found())
  }

  /// Like [`next`](Self::next) in the time zone of `base`. Local times that a
  /// zone transition skips are passed over.
  pub fn next_after<Tz: TimeZone>(&self, base: &DateTime<Tz>) -> Result<DateTime<Tz>, CronError> {
    let zone = base.timezone();
    let mut local = base.naive_local();
    loop {
      let next = self.next(local)?;
      if let Some(found) = zone.from_local_datetime(&next).earliest() {
        return Ok(found);
      }
      local = next;
    }
  }
}

impl FromStr for Cron {
  type Err = CronError;

  fn from_str(expression: &str) -> Result<Self, Self::Err> { Cron::parse(expression) }
}

impl fmt::Display for Cron {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.expression) }
}

fn midnight(date: NaiveDate) -> NaiveDateTime { date.and_time(NaiveTime::MIN) }

fn next_month(time: NaiveDateTime) -> Option<NaiveDateTime> {
  let first = time.date().with_day(1)?;
  first.checked_add_months(Months::new(1)).map(midnight)
}

fn next_day(time: NaiveDateTime) -> Option<NaiveDateTime> { time.date().succ_opt().map(midnight) }

fn next_hour(time: NaiveDateTime) -> Option<NaiveDateTime> {
  match time.hour() {
    23 => next_day(time),
    hour => time.date().and_hms_opt(hour + 1, 0, 0),
  }
}

fn next_minute(time: NaiveDateTime) -> Option<NaiveDateTime> {
  match time.minute() {
    59 => next_hour(time),
    minute => time.date().and_hms_opt(time.hour(), minute + 1, 0),
  }
}

fn next_second(time: NaiveDateTime) -> Option<NaiveDateTime> {
  time.checked_add_signed(TimeDelta::seconds(1))
}
