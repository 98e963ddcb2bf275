// Time range model and the relative time expression resolver
//
// Accepted expressions:
//   <integer>                      epoch milliseconds
//   now[(+|-)<n><unit>][/<unit>]   relative to the anchor, optionally snapped
// with unit one of m, h, d, w, M, y.
use crate::domain::error::ReportError;
use chrono::{
    DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
    Timelike,
};
use std::fmt;

/// Human readable rendering used in report documents, e.g. `Tue Jan 19 12:27:27 2016`.
const HUMAN_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Snap to the start of the boundary unit (range start).
    Floor,
    /// Snap to the start of the next boundary unit (range end, exclusive).
    Ceiling,
}

#[derive(Debug, Clone)]
pub struct ResolvedRange<Tz: TimeZone> {
    pub from: DateTime<Tz>,
    pub to: DateTime<Tz>,
}

impl TimeRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Resolve both ends against `now`: `from` is floored, `to` is ceiled.
    pub fn resolve_at<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<ResolvedRange<Tz>, ReportError> {
        Ok(ResolvedRange {
            from: resolve(&self.from, now, Rounding::Floor)?,
            to: resolve(&self.to, now, Rounding::Ceiling)?,
        })
    }
}

impl<Tz: TimeZone> ResolvedRange<Tz>
where
    Tz::Offset: fmt::Display,
{
    pub fn from_formatted(&self) -> String {
        self.from.format(HUMAN_FORMAT).to_string()
    }

    pub fn to_formatted(&self) -> String {
        self.to.format(HUMAN_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, PartialEq, Eq)]
enum Expression {
    Absolute(i64),
    Relative {
        offset: Option<(i64, Unit)>,
        boundary: Option<Unit>,
    },
}

/// Resolve a single time expression against `now`.
pub fn resolve<Tz: TimeZone>(
    expr: &str,
    now: &DateTime<Tz>,
    rounding: Rounding,
) -> Result<DateTime<Tz>, ReportError> {
    let malformed = || ReportError::MalformedTimeExpression(expr.to_string());

    match parse(expr)? {
        Expression::Absolute(millis) => now
            .timezone()
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(malformed),
        Expression::Relative { offset, boundary } => {
            let mut instant = now.clone();
            if let Some((amount, unit)) = offset {
                instant = unit.shift(&instant, amount).ok_or_else(malformed)?;
            }
            if let Some(unit) = boundary {
                instant = unit.snap(&instant, rounding).ok_or_else(malformed)?;
            }
            Ok(instant)
        }
    }
}

fn parse(expr: &str) -> Result<Expression, ReportError> {
    let malformed = || ReportError::MalformedTimeExpression(expr.to_string());

    if is_digits(expr) {
        return expr
            .parse::<i64>()
            .map(Expression::Absolute)
            .map_err(|_| malformed());
    }

    let rest = expr.strip_prefix("now").ok_or_else(malformed)?;
    let (offset_part, boundary_part) = match rest.split_once('/') {
        Some((offset, boundary)) => (offset, Some(boundary)),
        None => (rest, None),
    };

    let offset = if offset_part.is_empty() {
        None
    } else {
        let (sign, body) = if let Some(body) = offset_part.strip_prefix('+') {
            (1, body)
        } else if let Some(body) = offset_part.strip_prefix('-') {
            (-1, body)
        } else {
            return Err(malformed());
        };
        let unit_char = body.chars().last().ok_or_else(malformed)?;
        let digits = &body[..body.len() - unit_char.len_utf8()];
        if !is_digits(digits) {
            return Err(malformed());
        }
        let amount: i64 = digits.parse().map_err(|_| malformed())?;
        let unit = Unit::from_char(unit_char).ok_or_else(malformed)?;
        Some((sign * amount, unit))
    };

    let boundary = match boundary_part {
        None => None,
        Some(part) => {
            let mut chars = part.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(Unit::from_char(c).ok_or_else(malformed)?),
                _ => return Err(malformed()),
            }
        }
    };

    Ok(Expression::Relative { offset, boundary })
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl Unit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'm' => Some(Unit::Minute),
            'h' => Some(Unit::Hour),
            'd' => Some(Unit::Day),
            'w' => Some(Unit::Week),
            'M' => Some(Unit::Month),
            'y' => Some(Unit::Year),
            _ => None,
        }
    }

    /// Minutes and hours move the instant by a fixed duration, larger units
    /// move the local wall clock.
    fn shift<Tz: TimeZone>(self, instant: &DateTime<Tz>, amount: i64) -> Option<DateTime<Tz>> {
        match self {
            Unit::Minute => instant
                .clone()
                .checked_add_signed(TimeDelta::try_minutes(amount)?),
            Unit::Hour => instant
                .clone()
                .checked_add_signed(TimeDelta::try_hours(amount)?),
            Unit::Day => on_wall_clock(instant, |naive| add_days(naive, amount)),
            Unit::Week => on_wall_clock(instant, |naive| add_days(naive, amount.checked_mul(7)?)),
            Unit::Month => on_wall_clock(instant, |naive| add_months(naive, amount)),
            Unit::Year => {
                on_wall_clock(instant, |naive| add_months(naive, amount.checked_mul(12)?))
            }
        }
    }

    fn snap<Tz: TimeZone>(self, instant: &DateTime<Tz>, rounding: Rounding) -> Option<DateTime<Tz>> {
        on_wall_clock(instant, |naive| match rounding {
            Rounding::Floor => self.floor(naive),
            Rounding::Ceiling => self.ceil(naive),
        })
    }

    fn floor(self, naive: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = naive.date();
        match self {
            Unit::Minute => date.and_hms_opt(naive.hour(), naive.minute(), 0),
            Unit::Hour => date.and_hms_opt(naive.hour(), 0, 0),
            Unit::Day => Some(date.and_time(NaiveTime::MIN)),
            Unit::Week => {
                let since_sunday = u64::from(date.weekday().num_days_from_sunday());
                Some(date.checked_sub_days(Days::new(since_sunday))?.and_time(NaiveTime::MIN))
            }
            Unit::Month => Some(date.with_day(1)?.and_time(NaiveTime::MIN)),
            Unit::Year => Some(NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_time(NaiveTime::MIN)),
        }
    }

    fn ceil(self, naive: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = self.floor(naive)?;
        match self {
            Unit::Minute => start.checked_add_signed(TimeDelta::minutes(1)),
            Unit::Hour => start.checked_add_signed(TimeDelta::hours(1)),
            Unit::Day => add_days(start, 1),
            Unit::Week => add_days(start, 7),
            Unit::Month => add_months(start, 1),
            Unit::Year => add_months(start, 12),
        }
    }
}

/// Apply `f` to the local wall-clock time of `instant` and map the result back
/// into the same time zone.
fn on_wall_clock<Tz, F>(instant: &DateTime<Tz>, f: F) -> Option<DateTime<Tz>>
where
    Tz: TimeZone,
    F: FnOnce(NaiveDateTime) -> Option<NaiveDateTime>,
{
    let tz = instant.timezone();
    let naive = f(instant.naive_local())?;
    tz.from_local_datetime(&naive).earliest().or_else(|| {
        // wall-clock time skipped by a DST transition
        tz.from_local_datetime(&naive.checked_add_signed(TimeDelta::hours(1))?)
            .earliest()
    })
}

fn add_days(naive: NaiveDateTime, days: i64) -> Option<NaiveDateTime> {
    naive.checked_add_signed(TimeDelta::try_days(days)?)
}

/// Month arithmetic where a day-of-month missing from the target month rolls
/// over into the following month (Mar 31 - 1M = Mar 2 or 3).
fn add_months(naive: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let total = i64::from(naive.year()) * 12 + i64::from(naive.month0()) + months;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let date = first.checked_add_days(Days::new(u64::from(naive.day0())))?;
    Some(date.and_time(naive.time()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn anchor() -> DateTime<Utc> {
        // Wed, 06 Jan 2016 16:34:32 UTC
        Utc.with_ymd_and_hms(2016, 1, 6, 16, 34, 32).unwrap()
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn floor(expr: &str) -> DateTime<Utc> {
        resolve(expr, &anchor(), Rounding::Floor).unwrap()
    }

    fn ceil(expr: &str) -> DateTime<Utc> {
        resolve(expr, &anchor(), Rounding::Ceiling).unwrap()
    }

    #[test]
    fn test_now_is_the_anchor() {
        assert_eq!(ceil("now"), anchor());
        assert_eq!(floor("now"), anchor());
    }

    #[test]
    fn test_fixed_duration_offsets() {
        assert_eq!(ceil("now-1m"), anchor() - TimeDelta::minutes(1));
        assert_eq!(ceil("now-58m"), anchor() - TimeDelta::minutes(58));
        assert_eq!(ceil("now+1m"), anchor() + TimeDelta::minutes(1));
        assert_eq!(ceil("now+58m"), anchor() + TimeDelta::minutes(58));
        assert_eq!(ceil("now-3h"), anchor() - TimeDelta::hours(3));
        assert_eq!(ceil("now-82h"), anchor() - TimeDelta::hours(82));
    }

    #[test]
    fn test_calendar_offsets() {
        assert_eq!(ceil("now-1d"), at(2016, 1, 5, 16, 34, 32));
        assert_eq!(ceil("now-105d"), at(2015, 9, 23, 16, 34, 32));
        assert_eq!(ceil("now-1w"), at(2015, 12, 30, 16, 34, 32));
        assert_eq!(ceil("now-33w"), at(2015, 5, 20, 16, 34, 32));
        assert_eq!(ceil("now-1M"), at(2015, 12, 6, 16, 34, 32));
        assert_eq!(ceil("now-33M"), at(2013, 4, 6, 16, 34, 32));
        assert_eq!(ceil("now-1y"), at(2015, 1, 6, 16, 34, 32));
        assert_eq!(ceil("now-33y"), at(1983, 1, 6, 16, 34, 32));
        assert_eq!(ceil("now+2d"), at(2016, 1, 8, 16, 34, 32));
    }

    #[test]
    fn test_month_offset_overflows_short_months() {
        let end_of_march = at(2016, 3, 31, 10, 0, 0);
        let resolved = resolve("now-1M", &end_of_march, Rounding::Floor).unwrap();
        // Feb 31 2016 does not exist; it rolls over to Mar 2 (leap year)
        assert_eq!(resolved, at(2016, 3, 2, 10, 0, 0));
    }

    #[test]
    fn test_absolute_millis_are_not_rounded() {
        let expected = Utc.timestamp_millis_opt(1463464226537).unwrap();
        assert_eq!(ceil("1463464226537"), expected);
        assert_eq!(floor("1463464226537"), expected);
        assert_eq!(floor("14123456789"), ceil("14123456789"));
    }

    #[test]
    fn test_malformed_expressions_are_rejected() {
        for expr in ["not-a-time", "now-43k", "1235032k", "", "now-", "now-h", "now/", "now/dd", "now*1d"] {
            let err = resolve(expr, &anchor(), Rounding::Ceiling).unwrap_err();
            assert!(
                matches!(err, ReportError::MalformedTimeExpression(ref e) if e == expr),
                "{expr:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_floor_without_boundary_matches_ceiling() {
        assert_eq!(floor("now"), ceil("now"));
        assert_eq!(floor("now-3M"), ceil("now-3M"));
    }

    #[test]
    fn test_floor_days() {
        let start_of_today = at(2016, 1, 6, 0, 0, 0);
        assert_eq!(floor("now/d"), start_of_today);
        assert_eq!(floor("now-1m/d"), start_of_today);
        assert_eq!(floor("now-72m/d"), start_of_today);

        let start_of_yesterday = at(2016, 1, 5, 0, 0, 0);
        assert_eq!(floor("now-1d/d"), start_of_yesterday);
        assert_eq!(floor("now-24h/d"), start_of_yesterday);
    }

    #[test]
    fn test_floor_weeks() {
        let start_of_week = at(2016, 1, 3, 0, 0, 0);
        assert_eq!(floor("now/w"), start_of_week);
        assert_eq!(floor("now-82m/w"), start_of_week);
        assert_eq!(floor("now-33h/w"), start_of_week);
        assert_eq!(floor("now-2d/w"), start_of_week);
        assert_eq!(floor("now-1w/w"), at(2015, 12, 27, 0, 0, 0));
    }

    #[test]
    fn test_floor_months() {
        let start_of_month = at(2016, 1, 1, 0, 0, 0);
        assert_eq!(floor("now/M"), start_of_month);
        assert_eq!(floor("now-82m/M"), start_of_month);
        assert_eq!(floor("now-33h/M"), start_of_month);
        assert_eq!(floor("now-2d/M"), start_of_month);
        assert_eq!(floor("now-1M/M"), at(2015, 12, 1, 0, 0, 0));
    }

    #[test]
    fn test_floor_years() {
        let start_of_year = at(2016, 1, 1, 0, 0, 0);
        assert_eq!(floor("now/y"), start_of_year);
        assert_eq!(floor("now-82m/y"), start_of_year);
        assert_eq!(floor("now-33h/y"), start_of_year);
        assert_eq!(floor("now-2d/y"), start_of_year);
        assert_eq!(floor("now-1y/y"), at(2015, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_ceil_days() {
        let end_of_today = at(2016, 1, 7, 0, 0, 0);
        assert_eq!(ceil("now/d"), end_of_today);
        assert_eq!(ceil("now-1m/d"), end_of_today);
        assert_eq!(ceil("now-72m/d"), end_of_today);
        assert_eq!(ceil("now-1d/d"), at(2016, 1, 6, 0, 0, 0));
    }

    #[test]
    fn test_ceil_weeks() {
        let end_of_week = at(2016, 1, 10, 0, 0, 0);
        assert_eq!(ceil("now/w"), end_of_week);
        assert_eq!(ceil("now-82m/w"), end_of_week);
        assert_eq!(ceil("now-33h/w"), end_of_week);
        assert_eq!(ceil("now-2d/w"), end_of_week);
        assert_eq!(ceil("now-1w/w"), at(2016, 1, 3, 0, 0, 0));
    }

    #[test]
    fn test_ceil_months() {
        let end_of_month = at(2016, 2, 1, 0, 0, 0);
        assert_eq!(ceil("now/M"), end_of_month);
        assert_eq!(ceil("now-82m/M"), end_of_month);
        assert_eq!(ceil("now-33h/M"), end_of_month);
        assert_eq!(ceil("now-2d/M"), end_of_month);
        assert_eq!(ceil("now-1M/M"), at(2016, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_ceil_years() {
        let end_of_year = at(2017, 1, 1, 0, 0, 0);
        assert_eq!(ceil("now/y"), end_of_year);
        assert_eq!(ceil("now-82m/y"), end_of_year);
        assert_eq!(ceil("now-33h/y"), end_of_year);
        assert_eq!(ceil("now-2d/y"), end_of_year);
        assert_eq!(ceil("now-1y/y"), at(2016, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_hour_and_minute_boundaries() {
        assert_eq!(floor("now/h"), at(2016, 1, 6, 16, 0, 0));
        assert_eq!(ceil("now/h"), at(2016, 1, 6, 17, 0, 0));
        assert_eq!(floor("now/m"), at(2016, 1, 6, 16, 34, 0));
        assert_eq!(ceil("now/m"), at(2016, 1, 6, 16, 35, 0));
    }

    #[test]
    fn test_range_resolution_and_formatting() {
        let range = TimeRange::new("1453206447000", "now-1d/d");
        let resolved = range.resolve_at(&anchor()).unwrap();

        assert_eq!(resolved.from_formatted(), "Tue Jan 19 12:27:27 2016");
        assert_eq!(resolved.to_formatted(), "Wed Jan  6 00:00:00 2016");
    }

    #[test]
    fn test_range_with_bad_end_is_an_error() {
        let range = TimeRange::new("now-1h", "yesterday");
        assert!(matches!(
            range.resolve_at(&anchor()),
            Err(ReportError::MalformedTimeExpression(_))
        ));
    }
}
