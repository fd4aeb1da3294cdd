//! One-shot timers ordered by monotonic expiry.
//!
//! The wheel is a list kept sorted by expiry time. Each frame, everything
//! due is detached into a local firing list *before* any callback runs, so a
//! callback can arm or cancel any timer, including itself, without
//! corrupting the iteration. Re-arming is expressed through the returned
//! [`TimerAction`]; operations on *other* timers go through the
//! [`TimerOps`] handed to the callback and apply once firing completes.

use crate::error::{Error, ErrorKind, Result};
use applause_utils::counter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// What a fired timer wants next.
pub enum TimerAction {
    /// One-shot: the timer is released.
    Done,
    /// Fire again `dt` seconds from now.
    Rearm(f64),
}

pub type TimerFn = Box<dyn FnMut(&mut TimerOps) -> TimerAction>;

enum DeferredOp {
    Cancel(TimerId),
    Set {
        dt: f64,
        existing: Option<TimerId>,
        callback: TimerFn,
    },
}

/// Deferred timer operations available to callbacks mid-firing.
pub struct TimerOps {
    now: f64,
    ops: Vec<DeferredOp>,
}

impl TimerOps {
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn cancel(&mut self, timer: TimerId) {
        self.ops.push(DeferredOp::Cancel(timer));
    }

    pub fn set(
        &mut self,
        dt: f64,
        existing: Option<TimerId>,
        callback: impl FnMut(&mut TimerOps) -> TimerAction + 'static,
    ) {
        self.ops.push(DeferredOp::Set {
            dt,
            existing,
            callback: Box::new(callback),
        });
    }
}

struct TimerEntry {
    id: TimerId,
    expiry: f64,
    callback: TimerFn,
}

#[derive(Default)]
pub struct Timers {
    /// Sorted ascending by expiry; equal expiries keep insertion order.
    entries: Vec<TimerEntry>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Arms a timer `dt` seconds from `now`. Passing an existing id re-arms
    /// that timer instead of allocating a new one.
    pub fn set(
        &mut self,
        now: f64,
        dt: f64,
        existing: Option<TimerId>,
        callback: impl FnMut(&mut TimerOps) -> TimerAction + 'static,
    ) -> Result<TimerId> {
        if dt < 0.0 {
            return Err(Error::new(ErrorKind::InvalidArguments));
        }
        self.set_boxed(now, dt, existing, Box::new(callback))
    }

    fn set_boxed(
        &mut self,
        now: f64,
        dt: f64,
        existing: Option<TimerId>,
        callback: TimerFn,
    ) -> Result<TimerId> {
        let id = match existing {
            Some(id) => {
                self.remove(id)?;
                id
            }
            None => TimerId(counter::next()),
        };
        self.insert(TimerEntry {
            id,
            expiry: now + dt,
            callback,
        });
        Ok(id)
    }

    pub fn cancel(&mut self, timer: TimerId) -> Result<()> {
        self.remove(timer).map(drop)
    }

    fn remove(&mut self, timer: TimerId) -> Result<TimerEntry> {
        match self.entries.iter().position(|entry| entry.id == timer) {
            Some(at) => Ok(self.entries.remove(at)),
            None => Err(Error::new(ErrorKind::NotFound)),
        }
    }

    fn insert(&mut self, entry: TimerEntry) {
        // First entry strictly later than this one; equal expiries stay FIFO.
        let at = self
            .entries
            .iter()
            .position(|other| other.expiry > entry.expiry)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry);
    }

    /// Fires everything due at `now`, in expiry order.
    pub fn run(&mut self, now: f64) {
        let due = self
            .entries
            .iter()
            .take_while(|entry| entry.expiry <= now)
            .count();
        if due == 0 {
            return;
        }

        // Detach before running any callback.
        let firing: Vec<TimerEntry> = self.entries.drain(..due).collect();
        let mut ops = TimerOps {
            now,
            ops: Vec::new(),
        };

        for mut entry in firing {
            match (entry.callback)(&mut ops) {
                TimerAction::Done => {}
                TimerAction::Rearm(dt) => {
                    entry.expiry = now + dt.max(0.0);
                    self.insert(entry);
                }
            }
        }

        for op in ops.ops {
            match op {
                DeferredOp::Cancel(id) => {
                    let _ = self.cancel(id);
                }
                DeferredOp::Set {
                    dt,
                    existing,
                    callback,
                } => {
                    let _ = self.set_boxed(now, dt.max(0.0), existing, callback);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn timers_fire_in_expiry_order_even_inserted_reversed() {
        let mut timers = Timers::new();
        let fired = Rc::new(RefCell::new(Vec::new()));

        let f = fired.clone();
        timers
            .set(0.0, 2.0, None, move |_| {
                f.borrow_mut().push("late");
                TimerAction::Done
            })
            .unwrap();
        let f = fired.clone();
        timers
            .set(0.0, 1.0, None, move |_| {
                f.borrow_mut().push("early");
                TimerAction::Done
            })
            .unwrap();

        timers.run(3.0);
        assert_eq!(*fired.borrow(), vec!["early", "late"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn not_due_timers_stay_armed() {
        let mut timers = Timers::new();
        let fired = Rc::new(RefCell::new(0u32));
        let f = fired.clone();
        timers
            .set(0.0, 0.5, None, move |_| {
                *f.borrow_mut() += 1;
                TimerAction::Done
            })
            .unwrap();

        timers.run(0.4);
        assert_eq!(*fired.borrow(), 0);
        assert_eq!(timers.len(), 1);

        timers.run(0.5);
        assert_eq!(*fired.borrow(), 1);
        assert!(timers.is_empty());
    }

    #[test]
    fn rearmed_timer_is_retained() {
        let mut timers = Timers::new();
        let fired = Rc::new(RefCell::new(0u32));
        let f = fired.clone();
        timers
            .set(0.0, 1.0, None, move |_| {
                *f.borrow_mut() += 1;
                TimerAction::Rearm(1.0)
            })
            .unwrap();

        timers.run(1.0);
        timers.run(2.0);
        timers.run(2.5);
        assert_eq!(*fired.borrow(), 2);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn callback_canceling_peer_does_not_break_iteration() {
        let mut timers = Timers::new();
        let fired = Rc::new(RefCell::new(Vec::new()));

        // a cancels c from inside its callback; b still fires this round
        // (it was detached before any callback ran), c is gone afterwards.
        let f = fired.clone();
        let c_slot: Rc<RefCell<Option<TimerId>>> = Rc::new(RefCell::new(None));
        let slot = c_slot.clone();
        timers
            .set(0.0, 1.0, None, move |ops| {
                f.borrow_mut().push("a");
                if let Some(c) = *slot.borrow() {
                    ops.cancel(c);
                }
                TimerAction::Done
            })
            .unwrap();
        let f = fired.clone();
        timers
            .set(0.0, 1.5, None, move |_| {
                f.borrow_mut().push("b");
                TimerAction::Done
            })
            .unwrap();
        let f = fired.clone();
        let c = timers
            .set(0.0, 5.0, None, move |_| {
                f.borrow_mut().push("c");
                TimerAction::Done
            })
            .unwrap();
        *c_slot.borrow_mut() = Some(c);

        timers.run(2.0);
        assert_eq!(*fired.borrow(), vec!["a", "b"]);
        assert!(timers.is_empty());

        timers.run(10.0);
        assert_eq!(*fired.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn reusing_an_id_rearms_instead_of_allocating() {
        let mut timers = Timers::new();
        let id = timers.set(0.0, 1.0, None, |_| TimerAction::Done).unwrap();
        let same = timers.set(0.0, 2.0, Some(id), |_| TimerAction::Done).unwrap();
        assert_eq!(id, same);
        assert_eq!(timers.len(), 1);

        timers.run(1.0); // original expiry has been replaced
        assert_eq!(timers.len(), 1);
        timers.run(2.0);
        assert!(timers.is_empty());
    }

    #[test]
    fn negative_interval_is_rejected() {
        let mut timers = Timers::new();
        let err = timers.set(0.0, -1.0, None, |_| TimerAction::Done);
        assert!(err.is_err());
    }
}
