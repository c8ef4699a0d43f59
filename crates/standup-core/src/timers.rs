//! Phase timers: one cron schedule per phase, and a registry that yields
//! firings in `(time, phase)` order.
//!
//! The registry is pure. It never reads a clock; callers pass the instant to
//! start from and pop firings as they become due, which keeps it usable both
//! from the scheduler loop and from config validation.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use cron::Schedule;
use serde::Serialize;

use crate::config::TimersConfig;
use crate::error::{Result, StandupError};
use crate::types::Phase;

// ---------------------------------------------------------------------------
// Firing
// ---------------------------------------------------------------------------

/// A phase due at a specific instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Firing {
    pub phase: Phase,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// PhaseTimers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PhaseTimers {
    schedules: BTreeMap<Phase, (String, Schedule)>,
    offset: FixedOffset,
}

impl PhaseTimers {
    pub fn from_config(cfg: &TimersConfig) -> Result<Self> {
        let offset = parse_utc_offset(&cfg.utc_offset).map_err(|reason| {
            StandupError::InvalidSchedule {
                phase: "all".to_string(),
                expr: cfg.utc_offset.clone(),
                reason,
            }
        })?;

        let mut schedules = BTreeMap::new();
        for &phase in Phase::all() {
            let expr = cfg.expr(phase);
            let schedule =
                Schedule::from_str(expr).map_err(|e| StandupError::InvalidSchedule {
                    phase: phase.to_string(),
                    expr: expr.to_string(),
                    reason: e.to_string(),
                })?;
            schedules.insert(phase, (expr.to_string(), schedule));
        }
        Ok(Self { schedules, offset })
    }

    /// First occurrence of `phase` strictly after `after`.
    pub fn next_after(&self, phase: Phase, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (_, schedule) = self.schedules.get(&phase)?;
        schedule
            .after(&after.with_timezone(&self.offset))
            .next()
            .map(|at| at.with_timezone(&Utc))
    }

    pub fn registry(&self, from: DateTime<Utc>) -> TimerRegistry {
        let next = Phase::all()
            .iter()
            .filter_map(|&phase| self.next_after(phase, from).map(|at| (phase, at)))
            .collect();
        TimerRegistry {
            timers: self.clone(),
            next,
        }
    }

    /// Whether an overdue `firing` belongs to a cycle that has already closed
    /// by `now`: a later occurrence of the same phase, or the deadline that
    /// ends its cycle, has passed too. Such firings are dropped rather than
    /// replayed after a suspend or a forward clock jump.
    pub fn superseded(&self, firing: Firing, now: DateTime<Utc>) -> bool {
        let passed = |phase| self.next_after(phase, firing.at).is_some_and(|at| at <= now);
        passed(firing.phase) || passed(Phase::Deadline)
    }

    /// Check that, starting at the first Early firing after `from`, the next
    /// `cycles` cycles fire Early, Due, Late, Deadline in that order.
    pub fn check_cycle_order(&self, from: DateTime<Utc>, cycles: usize) -> Result<()> {
        for &phase in Phase::all() {
            if self.next_after(phase, from).is_none() {
                return Err(self.order_error(phase, "schedule never fires".to_string()));
            }
        }

        let mut registry = self.registry(from);
        let mut expected = Phase::Early;
        let mut previous: Option<Firing> = None;
        let mut completed = 0;

        // At most three firings can precede the first Early of a well-formed
        // schedule; anything beyond that is covered by the order check.
        for _ in 0..(cycles * Phase::all().len() + 3) {
            let Some(firing) = registry.pop() else {
                return Err(self.order_error(expected, "schedule stops firing".to_string()));
            };
            match previous {
                None if firing.phase != Phase::Early => continue,
                Some(prev) if firing.phase != expected => {
                    return Err(self.order_error(
                        firing.phase,
                        format!(
                            "fires at {} before the {expected} phase that should follow {} at {}",
                            firing.at, prev.phase, prev.at
                        ),
                    ));
                }
                _ => {}
            }
            previous = Some(firing);
            if firing.phase == Phase::Deadline {
                completed += 1;
                if completed == cycles {
                    return Ok(());
                }
            }
            expected = firing.phase.next().unwrap_or(Phase::Early);
        }
        Ok(())
    }

    fn order_error(&self, phase: Phase, reason: String) -> StandupError {
        StandupError::InvalidSchedule {
            phase: phase.to_string(),
            expr: self
                .schedules
                .get(&phase)
                .map(|(expr, _)| expr.clone())
                .unwrap_or_default(),
            reason,
        }
    }
}

// ---------------------------------------------------------------------------
// TimerRegistry
// ---------------------------------------------------------------------------

/// Next pending occurrence of every phase. Advancing one phase never moves
/// another, so two phases scheduled for the same instant both fire, in
/// declaration order.
#[derive(Debug, Clone)]
pub struct TimerRegistry {
    timers: PhaseTimers,
    next: BTreeMap<Phase, DateTime<Utc>>,
}

impl TimerRegistry {
    /// The earliest pending firing; ties go to the phase declared first.
    pub fn peek(&self) -> Option<Firing> {
        self.next
            .iter()
            .min_by_key(|(phase, at)| (**at, **phase))
            .map(|(&phase, &at)| Firing { phase, at })
    }

    /// Mark `phase` as fired and schedule its following occurrence.
    pub fn advance(&mut self, phase: Phase) {
        let Some(at) = self.next.remove(&phase) else {
            return;
        };
        if let Some(following) = self.timers.next_after(phase, at) {
            self.next.insert(phase, following);
        }
    }

    pub fn pop(&mut self) -> Option<Firing> {
        let firing = self.peek()?;
        self.advance(firing.phase);
        Some(firing)
    }

    /// Pending occurrence of each phase, in declaration order.
    pub fn pending(&self) -> Vec<Firing> {
        self.next
            .iter()
            .map(|(&phase, &at)| Firing { phase, at })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Offset parsing
// ---------------------------------------------------------------------------

/// Parse `Z`, `UTC`, `+HH:MM`, `-HH:MM`, or `+HHMM`.
pub fn parse_utc_offset(s: &str) -> std::result::Result<FixedOffset, String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| "invalid offset".to_string());
    }
    let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = s.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(format!("offset '{s}' must start with '+' or '-'"));
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("offset '{s}' must look like +HH:MM"));
    }
    let hours: i32 = digits[..2].parse().map_err(|_| format!("bad hours in '{s}'"))?;
    let minutes: i32 = digits[2..].parse().map_err(|_| format!("bad minutes in '{s}'"))?;
    if hours > 23 || minutes > 59 {
        return Err(format!("offset '{s}' is out of range"));
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("offset '{s}' is out of range"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
