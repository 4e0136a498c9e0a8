//! Where "today" comes from.
//!
//! The engine never reads the wall clock directly, so queries that are
//! relative to now (forecast, NRR) are reproducible under a fixed clock.

use chrono::{NaiveDate, Utc};
use std::cell::Cell;

pub trait Clock {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock pinned to a date; the runner steps it month by month.
#[derive(Debug, Clone)]
pub struct FixedClock {
    today: Cell<NaiveDate>,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today: Cell::new(today) }
    }

    pub fn set(&self, today: NaiveDate) {
        self.today.set(today);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today.get()
    }
}

impl<C: Clock + ?Sized> Clock for std::rc::Rc<C> {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }
}
