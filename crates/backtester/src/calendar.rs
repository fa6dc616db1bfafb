//! Simulation calendar and rebalance schedule.

use chrono::{Datelike, NaiveDate};
use market_core::{CalendarAlignment, MarketData, RebalanceFrequency};
use std::collections::BTreeMap;

/// Dates to simulate, ascending.
///
/// `Intersect` keeps dates on which every symbol has a bar; `Union` keeps
/// every date on which any symbol has one.
pub fn trading_calendar(data: &MarketData, alignment: CalendarAlignment) -> Vec<NaiveDate> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for series in data.values() {
        for date in series.dates() {
            *counts.entry(date).or_default() += 1;
        }
    }

    match alignment {
        CalendarAlignment::Intersect => {
            let required = data.len();
            counts.retain(|_, count| *count == required);
            counts.into_keys().collect()
        }
        CalendarAlignment::Union => counts.into_keys().collect(),
    }
}

/// Decides which simulated dates are rebalance dates.
///
/// Fed every simulated date in order; the first date always rebalances.
#[derive(Debug, Clone)]
pub struct RebalanceSchedule {
    frequency: RebalanceFrequency,
    previous: Option<NaiveDate>,
    days_since_rebalance: u32,
}

impl RebalanceSchedule {
    pub fn new(frequency: RebalanceFrequency) -> Self {
        Self {
            frequency,
            previous: None,
            days_since_rebalance: 0,
        }
    }

    /// Advance to `date` and report whether it is a rebalance date.
    pub fn is_rebalance_day(&mut self, date: NaiveDate) -> bool {
        let rebalance = match self.previous {
            None => true,
            Some(previous) => match self.frequency {
                RebalanceFrequency::Daily => true,
                RebalanceFrequency::Weekly => {
                    let (prev_week, week) = (previous.iso_week(), date.iso_week());
                    (prev_week.year(), prev_week.week()) != (week.year(), week.week())
                }
                RebalanceFrequency::Monthly => {
                    (previous.year(), previous.month()) != (date.year(), date.month())
                }
                RebalanceFrequency::EveryNDays(n) => self.days_since_rebalance + 1 >= n,
            },
        };

        self.previous = Some(date);
        if rebalance {
            self.days_since_rebalance = 0;
        } else {
            self.days_since_rebalance += 1;
        }
        rebalance
    }
}
