//! Time-range chunking.
//!
//! Splits `[start, end)` into windows small enough for a provider's query
//! limits. The first chunk starts exactly at `start`; later chunks start on
//! the strategy's boundaries.
//!
//! Two boundary conventions exist side by side:
//!
//! - [`ChunkBound::Exclusive`] (hour, day, equal parts): a chunk ends where
//!   the next one starts.
//! - [`ChunkBound::InclusiveDay`] (fixed N days, calendar month): the chunk's
//!   end day is part of the chunk, so the next one starts at the following
//!   midnight.
//!
//! Whatever the strategy, the chunks cover `[start, end)` without gaps and the
//! last one ends exactly at `end` with an exclusive bound. An empty or
//! inverted range produces no chunks.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

/// How a chunk's `end` relates to the next chunk's `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkBound {
    Exclusive,
    InclusiveDay,
}

/// One window of a chunked range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeChunk {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bound: ChunkBound,
}

impl TimeChunk {
    /// Where the following chunk starts. Everything in `[start, resume_at())`
    /// belongs to this chunk.
    pub fn resume_at(&self) -> DateTime<Utc> {
        match self.bound {
            ChunkBound::Exclusive => self.end,
            ChunkBound::InclusiveDay => start_of_day(self.end) + Duration::days(1),
        }
    }
}

/// Chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Up to the next top of the hour.
    Hour,
    /// Up to the next midnight.
    Day,
    /// Up to the last day of the calendar month, at 00:00, inclusive. A start
    /// already on that day runs to the end of the following month.
    MonthAligned,
    /// `start + n` days, inclusive. Not aligned to the calendar.
    FixedDays(u32),
    /// `n` equal windows of `ceil(duration / n)`.
    Parts(u32),
}

impl Granularity {
    pub fn bound(&self) -> ChunkBound {
        match self {
            Granularity::MonthAligned | Granularity::FixedDays(_) => ChunkBound::InclusiveDay,
            Granularity::Hour | Granularity::Day | Granularity::Parts(_) => ChunkBound::Exclusive,
        }
    }
}

/// Lazy chunk sequence.
#[derive(Debug, Clone)]
pub struct TimeChunks {
    next_start: DateTime<Utc>,
    end: DateTime<Utc>,
    granularity: Granularity,
    step: Duration,
}

impl TimeChunks {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, granularity: Granularity) -> Self {
        let step = match granularity {
            Granularity::Parts(parts) if end > start => {
                let total = (end - start).num_seconds().max(1);
                let parts = i64::from(parts.max(1));
                Duration::seconds((total + parts - 1) / parts)
            }
            Granularity::FixedDays(days) => Duration::days(i64::from(days.max(1))),
            _ => Duration::zero(),
        };
        Self {
            next_start: start,
            end,
            granularity,
            step,
        }
    }

    fn boundary_after(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self.granularity {
            Granularity::Hour => start_of_hour(start) + Duration::hours(1),
            Granularity::Day => start_of_day(start) + Duration::days(1),
            Granularity::MonthAligned => {
                let last = last_day_of_month(start);
                if last > start {
                    last
                } else {
                    last_day_of_month(last + Duration::days(1))
                }
            }
            Granularity::FixedDays(_) | Granularity::Parts(_) => start + self.step,
        }
    }
}

impl Iterator for TimeChunks {
    type Item = TimeChunk;

    fn next(&mut self) -> Option<TimeChunk> {
        if self.next_start >= self.end {
            return None;
        }
        let start = self.next_start;
        let boundary = self.boundary_after(start);
        let bound = self.granularity.bound();
        let covered_until = match bound {
            ChunkBound::Exclusive => boundary,
            ChunkBound::InclusiveDay => start_of_day(boundary) + Duration::days(1),
        };
        let chunk = if covered_until >= self.end {
            TimeChunk {
                start,
                end: self.end,
                bound: ChunkBound::Exclusive,
            }
        } else {
            TimeChunk {
                start,
                end: boundary,
                bound,
            }
        };
        self.next_start = chunk.resume_at();
        Some(chunk)
    }
}

/// Splits `[start, end)` with the given strategy.
pub fn chunks(start: DateTime<Utc>, end: DateTime<Utc>, granularity: Granularity) -> TimeChunks {
    TimeChunks::new(start, end, granularity)
}

fn start_of_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t - Duration::minutes(i64::from(t.minute()))
        - Duration::seconds(i64::from(t.second()))
        - Duration::nanoseconds(i64::from(t.nanosecond()))
}

fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&t.date_naive().and_time(chrono::NaiveTime::MIN))
}

/// Last calendar day of `t`'s month at 00:00.
fn last_day_of_month(t: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(first_of_next) => {
            let last = first_of_next - Duration::days(1);
            Utc.from_utc_datetime(&last.and_time(chrono::NaiveTime::MIN))
        }
        None => t,
    }
}
