//! A cursor into the upstream changelog timeline.

use crate::error::{Error, Result};
use chrono::{Datelike, Timelike, Utc};
use std::fmt;

/// A point in the changelog timeline: an hour in the calendar plus a
/// sequence number within that hour.
///
/// The canonical textual form is `YYYY/MM/DD/HH/SSSSSS`, mirroring the
/// path layout of the upstream feed. A sequence of zero means "no
/// sequence constraint": used as an upper bound it matches every
/// sequence within the hour, used as a lower bound it means "from the
/// start of the hour".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChangeCursor {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub sequence: u32,
}

impl ChangeCursor {
    pub fn new(year: u32, month: u32, day: u32, hour: u32, sequence: u32) -> Self {
        Self { year, month, day, hour, sequence }
    }

    /// The cursor for the current wall-clock hour, sequence zero.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            year: now.year() as u32,
            month: now.month(),
            day: now.day(),
            hour: now.hour(),
            sequence: 0,
        }
    }

    /// Parse the canonical slash-separated form. Accepts both the full
    /// five-field form and the four-field hour path.
    pub fn parse(input: &str) -> Result<Self> {
        let fields: Vec<&str> = input
            .trim()
            .trim_end_matches('/')
            .split('/')
            .collect();
        if fields.len() != 4 && fields.len() != 5 {
            return Err(Error::Parse(format!("Invalid cursor: {}", input)));
        }
        let mut values = [0u32; 5];
        for (i, field) in fields.iter().enumerate() {
            values[i] = field
                .parse()
                .map_err(|_| Error::Parse(format!("Invalid cursor field '{}' in {}", field, input)))?;
        }
        Ok(Self::from_fields(values))
    }

    /// Build a cursor from `[year, month, day, hour, sequence]`.
    pub fn from_fields(fields: [u32; 5]) -> Self {
        Self {
            year: fields[0],
            month: fields[1],
            day: fields[2],
            hour: fields[3],
            sequence: fields[4],
        }
    }

    /// True when both cursors point into the same calendar hour,
    /// whatever their sequences.
    pub fn is_same_hour(&self, other: &ChangeCursor) -> bool {
        self.hour_key() == other.hour_key()
    }

    /// Ordering used for range walks over the feed.
    ///
    /// Cursors in different hours compare by hour. Within one hour a
    /// zero sequence on `other` acts as "no constraint", so any cursor
    /// of that hour is smaller-or-equal to it.
    pub fn is_smaller_or_equal(&self, other: &ChangeCursor) -> bool {
        let mine = self.hour_key();
        let theirs = other.hour_key();
        if mine != theirs {
            return mine < theirs;
        }
        other.sequence == 0 || self.sequence <= other.sequence
    }

    /// Advance to the next changeset within the hour.
    pub fn next_sequence(&mut self) {
        self.sequence += 1;
    }

    pub fn set_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
    }

    pub fn zero_sequence(&mut self) {
        self.sequence = 0;
    }

    /// Advance to the next hour, resetting the sequence to zero, with
    /// calendar carry across day, month and year boundaries.
    pub fn advance_hour(&mut self) {
        self.sequence = 0;
        self.hour += 1;
        if self.hour < 24 {
            return;
        }
        self.hour = 0;
        self.day += 1;
        if self.day <= days_in_month(self.year, self.month) {
            return;
        }
        self.day = 1;
        self.month += 1;
        if self.month <= 12 {
            return;
        }
        self.month = 1;
        self.year += 1;
    }

    /// The cursor one hour later, sequence zero.
    pub fn next_hour(&self) -> Self {
        let mut next = *self;
        next.advance_hour();
        next
    }

    /// Canonical form `YYYY/MM/DD/HH/SSSSSS`.
    pub fn path(&self) -> String {
        format!("{}{:06}", self.hour_path(), self.sequence)
    }

    /// Canonical form without the sequence component, `YYYY/MM/DD/HH/`.
    pub fn hour_path(&self) -> String {
        format!(
            "{:04}/{:02}/{:02}/{:02}/",
            self.year, self.month, self.day, self.hour
        )
    }

    fn hour_key(&self) -> (u32, u32, u32, u32) {
        (self.year, self.month, self.day, self.hour)
    }
}

impl fmt::Display for ChangeCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        // Out-of-range months carry immediately
        _ => 0,
    }
}

fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
