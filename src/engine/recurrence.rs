//! Recurrence expansion: rule + base event → ordered future occurrences.
//!
//! Occurrence `k` is always computed from the base date as
//! `base + k * interval` periods, never by stepping from the previous
//! occurrence, so month-end clamping does not drift (Jan 31 → Feb 28 →
//! Mar 31). Generation is lazy and can resume from any `k`.

use std::iter::FusedIterator;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{EventId, EventStatus, RecurrenceRule, RecurrenceType, ScheduledEvent};

/// Advance `base` by `k * interval` periods of the rule.
///
/// Month and year steps land on the last valid day of the target month
/// when the base day does not exist there. The time of day is preserved.
pub fn next_date(base: DateTime<Utc>, rule: &RecurrenceRule, k: u32) -> Result<DateTime<Utc>> {
    rule.validate()?;
    if k == 0 {
        return Ok(base);
    }

    let steps = i64::from(k) * i64::from(rule.interval);
    let advanced = match rule.kind {
        RecurrenceType::None => {
            return Err(Error::InvalidRecurrenceRule(
                "recurrence type NONE has no period to advance by".to_string(),
            ));
        }
        RecurrenceType::Daily => Duration::try_days(steps).and_then(|d| base.checked_add_signed(d)),
        RecurrenceType::Weekly => {
            Duration::try_weeks(steps).and_then(|d| base.checked_add_signed(d))
        }
        RecurrenceType::Monthly => add_months(base, steps),
        RecurrenceType::Yearly => steps.checked_mul(12).and_then(|m| add_months(base, m)),
    };

    advanced.ok_or_else(|| {
        Error::InvalidArgument(format!(
            "occurrence {k} of a {} rule falls outside the calendar range",
            rule.kind
        ))
    })
}

fn add_months(base: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let months = u32::try_from(months).ok()?;
    base.checked_add_months(Months::new(months))
}

/// Lazily generate occurrence drafts of `base` under `rule`.
///
/// The rule and the base location are validated before anything is
/// produced. A `NONE` rule, or an end date before the base date, yields an
/// empty sequence.
pub fn generate_occurrences(base: &ScheduledEvent, rule: &RecurrenceRule) -> Result<Occurrences> {
    rule.validate()?;
    base.location.validate()?;
    Ok(Occurrences::new(base.clone(), rule.clone()))
}

// ---------------------------------------------------------------------------
// Occurrences
// ---------------------------------------------------------------------------

/// Pull-based sequence of occurrence drafts for `k = 1, 2, 3, …`.
///
/// Finite whenever the rule has an end date or a max-occurrence count;
/// otherwise the caller caps it (e.g. with `take`).
#[derive(Debug, Clone)]
pub struct Occurrences {
    base: ScheduledEvent,
    rule: RecurrenceRule,
    parent: Option<EventId>,
    next_k: u32,
    /// Highest `k` allowed by `max_occurrences` (which counts the base).
    last_k: Option<u32>,
    done: bool,
}

impl Occurrences {
    fn new(base: ScheduledEvent, rule: RecurrenceRule) -> Self {
        // Chains stay one level deep: occurrences of an occurrence point at
        // the original base.
        let parent = base.parent_event_id.or(base.id);
        let last_k = rule
            .max_occurrences
            .map(|max| u32::try_from(max.saturating_sub(1)).unwrap_or(0));
        let done = rule.kind == RecurrenceType::None;
        Self {
            base,
            rule,
            parent,
            next_k: 1,
            last_k,
            done,
        }
    }

    /// Restart generation at occurrence `k` (1-based).
    pub fn resume_from(mut self, k: u32) -> Self {
        self.next_k = k.max(1);
        self.done = self.rule.kind == RecurrenceType::None;
        self
    }

    /// Index of the occurrence the next call to `next` would produce.
    pub fn next_index(&self) -> u32 {
        self.next_k
    }

    pub fn rule(&self) -> &RecurrenceRule {
        &self.rule
    }

    /// Only the dates, without building drafts.
    pub fn dates(self) -> impl Iterator<Item = DateTime<Utc>> {
        self.map(|occurrence| occurrence.scheduled_at)
    }

    fn draft_at(&self, scheduled_at: DateTime<Utc>) -> ScheduledEvent {
        let mut draft = self.base.clone();
        draft.id = None;
        draft.scheduled_at = scheduled_at;
        draft.parent_event_id = self.parent;
        draft.status = EventStatus::Scheduled;
        draft.completed_at = None;
        draft.updated_at = None;
        draft
    }
}

impl Iterator for Occurrences {
    type Item = ScheduledEvent;

    fn next(&mut self) -> Option<ScheduledEvent> {
        if self.done {
            return None;
        }
        let k = self.next_k;
        if self.last_k.is_some_and(|last| k > last) {
            self.done = true;
            return None;
        }

        let Ok(date) = next_date(self.base.scheduled_at, &self.rule, k) else {
            self.done = true;
            return None;
        };
        if self.rule.end_date.is_some_and(|end| date > end) {
            self.done = true;
            return None;
        }

        match k.checked_add(1) {
            Some(next) => self.next_k = next,
            None => self.done = true,
        }
        Some(self.draft_at(date))
    }
}

impl FusedIterator for Occurrences {}

// ---------------------------------------------------------------------------
// Series view
// ---------------------------------------------------------------------------

/// The base event plus its generated dates. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceSeries {
    pub base: ScheduledEvent,
    pub dates: Vec<DateTime<Utc>>,
    /// More occurrences exist beyond `cap`.
    pub truncated: bool,
}

impl OccurrenceSeries {
    /// Expand the base's own rule, keeping at most `cap` generated dates.
    pub fn compute(base: &ScheduledEvent, cap: usize) -> Result<Self> {
        let Some(ref rule) = base.recurrence else {
            return Ok(Self {
                base: base.clone(),
                dates: Vec::new(),
                truncated: false,
            });
        };

        let mut dates: Vec<DateTime<Utc>> = generate_occurrences(base, rule)?
            .dates()
            .take(cap.saturating_add(1))
            .collect();
        let truncated = dates.len() > cap;
        dates.truncate(cap);

        Ok(Self {
            base: base.clone(),
            dates,
            truncated,
        })
    }

    /// Number of instances in the series, base included.
    pub fn instance_count(&self) -> usize {
        1 + self.dates.len()
    }
}
