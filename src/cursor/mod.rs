//! Incremental watermark tracking.
//!
//! A [`CursorState`] lives for one fetch session. It is opened from the
//! value persisted by the previous run (or from its initial value), moves
//! forward as records are handed out, and is read back at the end of the
//! session so the caller can persist the new high-water mark.
//!
//! ```text
//!   start_value            last_value ──→            end_value
//!   (session open)         (moves up only)           (optional)
//! ────────┼─────────────────────┼──────────────────────────┼──────
//!   Skip  │               Emit + advance                   │ OutOfRange
//! ```

mod value;

pub use value::CursorValue;

use crate::error::{FetchError, Result};
use crate::record::{get_field, Record};
use std::cmp::Ordering;
use std::fmt;

/// Which record field(s) hold the watermark.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorField {
    /// A single field, addressed by dotted path (`statistics.last_close_at`).
    Path(String),
    /// Several fields read together into a [`CursorValue::Composite`].
    Composite(Vec<String>),
}

impl From<&str> for CursorField {
    fn from(path: &str) -> Self {
        CursorField::Path(path.to_string())
    }
}

impl From<String> for CursorField {
    fn from(path: String) -> Self {
        CursorField::Path(path)
    }
}

impl fmt::Display for CursorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorField::Path(path) => f.write_str(path),
            CursorField::Composite(paths) => write!(f, "({})", paths.join(", ")),
        }
    }
}

/// Ordering used to compare watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorOrder {
    /// Natural ordering of the value kind.
    #[default]
    Natural,
    /// Compare composite values by one element only.
    ///
    /// With `CursorField::Composite(["id", "created"])` and `ByElement(1)`
    /// records sort by `created` while the cursor still carries the `id` of
    /// the latest record.
    ByElement(usize),
}

/// What to do with a record that has no watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingValue {
    /// Fail the session with [`FetchError::MissingCursorValue`].
    #[default]
    Fail,
    /// Emit the record without moving the cursor.
    Include,
    /// Drop the record.
    Exclude,
}

/// Classification of a single record against the cursor range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Emit,
    /// Below the range start, already delivered by an earlier run.
    Skip,
    /// Past `end_value`.
    OutOfRange,
}

/// Watermark state for one fetch session.
#[derive(Debug, Clone)]
pub struct CursorState {
    field: CursorField,
    initial_value: Option<CursorValue>,
    last_value: Option<CursorValue>,
    start_value: Option<CursorValue>,
    end_value: Option<CursorValue>,
    range_start_inclusive: bool,
    range_end_inclusive: bool,
    order: CursorOrder,
    on_missing: MissingValue,
    sorted: bool,
    resumed: bool,
}

impl CursorState {
    /// Creates a cursor over `field` with no initial value.
    ///
    /// Defaults: start inclusive, end exclusive, natural order, missing
    /// watermarks fail the session.
    pub fn new(field: impl Into<CursorField>) -> Self {
        Self {
            field: field.into(),
            initial_value: None,
            last_value: None,
            start_value: None,
            end_value: None,
            range_start_inclusive: true,
            range_end_inclusive: false,
            order: CursorOrder::Natural,
            on_missing: MissingValue::Fail,
            sorted: true,
            resumed: false,
        }
    }

    /// Value used when no prior state exists.
    pub fn initial_value(mut self, value: impl Into<CursorValue>) -> Self {
        let value = value.into();
        if !self.resumed {
            self.last_value = Some(value.clone());
            self.start_value = Some(value.clone());
        }
        self.initial_value = Some(value);
        self
    }

    /// Opens the session from a persisted watermark. `None` keeps the
    /// initial value.
    pub fn resume_from(mut self, persisted: Option<CursorValue>) -> Self {
        if let Some(value) = persisted {
            self.last_value = Some(value.clone());
            self.start_value = Some(value);
            self.resumed = true;
        }
        self
    }

    pub fn end_value(mut self, value: impl Into<CursorValue>) -> Self {
        self.end_value = Some(value.into());
        self
    }

    pub fn start_inclusive(mut self, inclusive: bool) -> Self {
        self.range_start_inclusive = inclusive;
        self
    }

    pub fn end_inclusive(mut self, inclusive: bool) -> Self {
        self.range_end_inclusive = inclusive;
        self
    }

    pub fn order(mut self, order: CursorOrder) -> Self {
        self.order = order;
        self
    }

    pub fn on_missing(mut self, policy: MissingValue) -> Self {
        self.on_missing = policy;
        self
    }

    /// Whether records arrive in watermark order (the default).
    ///
    /// A sorted source ends its session at the first out-of-range record.
    /// For an unsorted one, out-of-range records are dropped and the
    /// session reads on to the last page.
    pub fn sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn field(&self) -> &CursorField {
        &self.field
    }

    pub fn last_value(&self) -> Option<&CursorValue> {
        self.last_value.as_ref()
    }

    /// The watermark the session was opened with.
    pub fn start_value(&self) -> Option<&CursorValue> {
        self.start_value.as_ref()
    }

    pub fn initial(&self) -> Option<&CursorValue> {
        self.initial_value.as_ref()
    }

    pub fn end(&self) -> Option<&CursorValue> {
        self.end_value.as_ref()
    }

    /// True when the session resumed from persisted state.
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Reads the watermark of a record. Missing or null fields yield `None`.
    pub fn watermark(&self, record: &Record) -> Result<Option<CursorValue>> {
        match &self.field {
            CursorField::Path(path) => match get_field(record, path) {
                Some(value) => CursorValue::from_json(value),
                None => Ok(None),
            },
            CursorField::Composite(paths) => {
                let mut parts = Vec::with_capacity(paths.len());
                for path in paths {
                    let part = match get_field(record, path) {
                        Some(value) => CursorValue::from_json(value)?,
                        None => None,
                    };
                    match part {
                        Some(part) => parts.push(part),
                        None => return Ok(None),
                    }
                }
                Ok(Some(CursorValue::Composite(parts)))
            }
        }
    }

    /// Compares two watermarks under this cursor's ordering.
    pub fn compare(&self, left: &CursorValue, right: &CursorValue) -> Result<Ordering> {
        match self.order {
            CursorOrder::Natural => left.try_cmp(right),
            CursorOrder::ByElement(index) => match (left, right) {
                (CursorValue::Composite(a), CursorValue::Composite(b)) => {
                    match (a.get(index), b.get(index)) {
                        (Some(a), Some(b)) => a.try_cmp(b),
                        _ => Err(FetchError::TypeMismatch {
                            left: left.to_string(),
                            right: right.to_string(),
                        }),
                    }
                }
                _ => Err(FetchError::TypeMismatch {
                    left: left.to_string(),
                    right: right.to_string(),
                }),
            },
        }
    }

    /// True iff an end value is set and the record's watermark is past it.
    pub fn is_out_of_range(&self, record: &Record) -> Result<bool> {
        let (Some(end), Some(mark)) = (&self.end_value, self.watermark(record)?) else {
            return Ok(false);
        };
        let ordering = self.compare(&mark, end)?;
        Ok(if self.range_end_inclusive {
            ordering == Ordering::Greater
        } else {
            ordering != Ordering::Less
        })
    }

    /// True when the record sits below the watermark the session opened with.
    pub fn is_before_range(&self, record: &Record) -> Result<bool> {
        let (Some(start), Some(mark)) = (&self.start_value, self.watermark(record)?) else {
            return Ok(false);
        };
        let ordering = self.compare(&mark, start)?;
        Ok(if self.range_start_inclusive {
            ordering == Ordering::Less
        } else {
            ordering != Ordering::Greater
        })
    }

    /// Classifies a record without changing the cursor.
    pub fn observe(&self, record: &Record) -> Result<Verdict> {
        if self.watermark(record)?.is_none() {
            return match self.on_missing {
                MissingValue::Fail => Err(FetchError::MissingCursorValue(self.field.to_string())),
                MissingValue::Include => Ok(Verdict::Emit),
                MissingValue::Exclude => Ok(Verdict::Skip),
            };
        }
        if self.is_out_of_range(record)? {
            return Ok(Verdict::OutOfRange);
        }
        if self.is_before_range(record)? {
            return Ok(Verdict::Skip);
        }
        Ok(Verdict::Emit)
    }

    /// Moves `last_value` up to the record's watermark if it is higher.
    pub fn advance(&mut self, record: &Record) -> Result<()> {
        let Some(mark) = self.watermark(record)? else {
            return Ok(());
        };
        let higher = match &self.last_value {
            None => true,
            Some(last) => self.compare(&mark, last)? == Ordering::Greater,
        };
        if higher {
            self.last_value = Some(mark);
        }
        Ok(())
    }
}
