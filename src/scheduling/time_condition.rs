//! Recurring time windows with intra-window frequency.
//!
//! A [`TimeCondition`] gates a collector on a daily stride or a weekday
//! set. Within a window it re-arms every `frequency` hours; at window
//! end the launch instant rolls forward to the next window start.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::scheduling::clock::{Clock, SystemClock};

/// Recurrence basis for a [`TimeCondition`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SchedulePeriod {
    /// Every `stride` days.
    Daily(u32),
    /// On the listed ISO weekdays (1 = Monday .. 7 = Sunday).
    Weekdays(Vec<u32>),
}

impl SchedulePeriod {
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SchedulePeriod::Daily(stride) if *stride < 1 => Err(ConfigError::InvalidPeriod(
                "day stride must be at least 1".into(),
            )),
            SchedulePeriod::Weekdays(days) if days.is_empty() => Err(ConfigError::InvalidPeriod(
                "weekday set must not be empty".into(),
            )),
            SchedulePeriod::Weekdays(days) if days.iter().any(|d| !(1..=7).contains(d)) => Err(
                ConfigError::InvalidPeriod("weekdays use ISO numbering 1..=7".into()),
            ),
            _ => Ok(()),
        }
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| ConfigError::InvalidPeriod(format!("cannot parse time string '{s}'")))
}

/// Time-window activation condition.
///
/// `launch` is the next instant the condition becomes able; it only
/// moves forward (modulo the catch-up alignment applied when the
/// process starts with a lag larger than the frequency).
pub struct TimeCondition {
    period: SchedulePeriod,
    start: NaiveTime,
    end: Option<NaiveTime>,
    frequency_hours: f64,
    one_run: bool,
    launch: Option<NaiveDateTime>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TimeCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeCondition")
            .field("period", &self.period)
            .field("start", &self.start)
            .field("end", &self.effective_end())
            .field("frequency_hours", &self.frequency_hours)
            .field("launch", &self.launch)
            .finish()
    }
}

impl TimeCondition {
    /// Create a condition firing within the `start_time` window on the
    /// given period, once per window (`frequency` 0).
    pub fn new(period: SchedulePeriod, start_time: &str) -> Result<Self, ConfigError> {
        period.validate()?;
        Ok(Self {
            period,
            start: parse_time(start_time)?,
            end: None,
            frequency_hours: 0.0,
            one_run: true,
            launch: None,
            clock: Arc::new(SystemClock),
        })
    }

    /// Set the window end time. Without it the window runs until
    /// `23:59` shrunk by the frequency, so the last re-arm still fits.
    pub fn with_end(mut self, end_time: &str) -> Result<Self, ConfigError> {
        self.end = Some(parse_time(end_time)?);
        Ok(self)
    }

    /// Re-arm every `hours` within the window. Zero means one run per window.
    pub fn with_frequency(mut self, hours: f64) -> Self {
        self.frequency_hours = hours.max(0.0);
        self.one_run = self.frequency_hours == 0.0;
        self
    }

    /// Pin the first launch instant instead of deriving it from the clock.
    pub fn with_launch(mut self, launch: NaiveDateTime) -> Self {
        self.launch = Some(launch);
        self
    }

    /// Swap the time source (tests use [`ManualClock`](crate::scheduling::ManualClock)).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Next instant this condition becomes able.
    pub fn next_launch(&self) -> Option<NaiveDateTime> {
        self.launch
    }

    // Default end: the last minute of the day shrunk by one frequency,
    // so the final re-arm still lands inside the window.
    fn effective_end(&self) -> NaiveTime {
        self.end.unwrap_or_else(|| {
            let hours = 23u32.saturating_sub(self.frequency_hours.floor() as u32);
            let minutes =
                59u32.saturating_sub((self.frequency_hours.fract() * 60.0).round() as u32);
            NaiveTime::from_hms_opt(hours, minutes.min(59), 0)
                .unwrap_or_else(|| NaiveTime::from_hms_opt(23, 59, 0).unwrap())
        })
    }

    fn ensure_launch(&mut self) {
        if self.launch.is_none() {
            let now = self.clock.now();
            self.launch = Some(now.date().and_time(self.start));
            // Window already over for today: move straight to the next one.
            if now.time() >= self.effective_end() {
                self.roll();
            }
        }
    }

    /// True iff `now` has reached the launch instant and the window has
    /// not closed yet.
    pub fn is_able(&mut self) -> bool {
        self.ensure_launch();
        let now = self.clock.now();
        let launch = self.launch.expect("launch initialized above");
        now >= launch && now.time() < self.effective_end()
    }

    /// Suspend until the condition holds, then re-arm it.
    pub async fn pending(&mut self) {
        while !self.is_able() {
            let delay = self.delay_to_launch();
            if delay.is_zero() {
                // Launch has passed but the window is closed: roll over.
                self.roll();
                continue;
            }
            trace!(delay_secs = delay.as_secs(), "schedule waiting");
            tokio::time::sleep(delay).await;
        }
        self.reset();
    }

    fn delay_to_launch(&self) -> StdDuration {
        let delta = self.launch.expect("launch initialized") - self.clock.now();
        delta.to_std().unwrap_or(StdDuration::ZERO)
    }

    /// Advance `launch` past the run that just fired.
    pub fn reset(&mut self) {
        self.ensure_launch();
        if self.one_run {
            self.roll();
            return;
        }
        self.shift();
        let launch = self.launch.expect("launch initialized");
        if launch.time() > self.effective_end() {
            self.roll();
        }
        debug!(next_launch = %self.launch.expect("launch set"), "schedule re-armed");
    }

    // Shift within the window. When the process woke up with a lag
    // larger than the frequency, align forward so successive runs do
    // not fire back-to-back.
    fn shift(&mut self) {
        let launch = self.launch.expect("launch initialized");
        let lag_hours = (self.clock.now() - launch).num_hours().max(0) as f64;
        let hours = if lag_hours > self.frequency_hours {
            lag_hours + self.frequency_hours
        } else {
            self.frequency_hours
        };
        self.launch = Some(launch + Duration::seconds((hours * 3600.0) as i64));
    }

    // Move `launch` to the start of the next window.
    fn roll(&mut self) {
        let launch = self
            .launch
            .expect("roll is only reached after ensure_launch");
        let next_date = match &self.period {
            SchedulePeriod::Daily(stride) => launch.date() + Duration::days(*stride as i64),
            SchedulePeriod::Weekdays(days) => {
                let current = launch.date().weekday().number_from_monday();
                launch.date() + Duration::days(weekday_gap(current, days) as i64)
            }
        };
        self.launch = Some(next_date.and_time(self.start));
    }
}

/// Days until the next weekday in `days` strictly after `current`
/// (ISO numbering, cyclic). A single-element set yields a full week.
fn weekday_gap(current: u32, days: &[u32]) -> u32 {
    let mut sorted: Vec<u32> = days.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    for day in &sorted {
        if *day > current {
            return day - current;
        }
    }
    7 - current + sorted[0]
}
