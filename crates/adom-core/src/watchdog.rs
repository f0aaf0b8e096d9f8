//! Cooperative cancellation for the closure and simplex hot loops.
//!
//! A [`Watchdog`] is a thread-local weight counter: `arm` installs a budget,
//! the hot loops call [`Watchdog::tick`] once per costly step, and when the
//! budget crosses zero an optional callback fires and the loop unwinds with
//! [`DomainError::Abandoned`]. No lock is held at any tick site, so the
//! unwind is always safe.

use std::cell::RefCell;

use crate::error::{DomainError, DomainResult};

struct WatchdogState {
    remaining: u64,
    callback: Option<Box<dyn FnMut()>>,
}

thread_local! {
    static WATCHDOG: RefCell<Option<WatchdogState>> = const { RefCell::new(None) };
}

/// Handle for the thread-local computation budget.
pub struct Watchdog;

impl Watchdog {
    /// Install a budget of `weight` costly steps on the current thread.
    pub fn arm(weight: u64) {
        WATCHDOG.with(|w| {
            *w.borrow_mut() = Some(WatchdogState {
                remaining: weight,
                callback: None,
            });
        });
    }

    /// Install a budget and a callback invoked once when it expires.
    pub fn arm_with_callback(weight: u64, callback: impl FnMut() + 'static) {
        WATCHDOG.with(|w| {
            *w.borrow_mut() = Some(WatchdogState {
                remaining: weight,
                callback: Some(Box::new(callback)),
            });
        });
    }

    /// Remove any installed budget.
    pub fn disarm() {
        WATCHDOG.with(|w| {
            *w.borrow_mut() = None;
        });
    }

    pub fn is_armed() -> bool {
        WATCHDOG.with(|w| w.borrow().is_some())
    }

    /// Consume `weight` units of budget.
    ///
    /// Returns `Err(Abandoned)` once the budget is exhausted; the watchdog
    /// stays expired until disarmed so nested loops keep unwinding.
    pub fn tick(weight: u64) -> DomainResult<()> {
        WATCHDOG.with(|w| {
            let mut guard = w.borrow_mut();
            let Some(state) = guard.as_mut() else {
                return Ok(());
            };
            if state.remaining > weight {
                state.remaining -= weight;
                Ok(())
            } else {
                state.remaining = 0;
                if let Some(mut cb) = state.callback.take() {
                    drop(guard);
                    cb();
                }
                Err(DomainError::Abandoned)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_unarmed_ticks_are_free() {
        Watchdog::disarm();
        for _ in 0..1000 {
            Watchdog::tick(1).unwrap();
        }
    }

    #[test]
    fn test_budget_expires() {
        Watchdog::arm(3);
        assert!(Watchdog::tick(1).is_ok());
        assert!(Watchdog::tick(1).is_ok());
        assert!(matches!(Watchdog::tick(1), Err(DomainError::Abandoned)));
        // Stays expired until disarmed.
        assert!(Watchdog::tick(1).is_err());
        Watchdog::disarm();
        assert!(Watchdog::tick(1).is_ok());
    }

    #[test]
    fn test_callback_fires_once() {
        let fired = Rc::new(Cell::new(0));
        let fired_in_cb = Rc::clone(&fired);
        Watchdog::arm_with_callback(1, move || {
            fired_in_cb.set(fired_in_cb.get() + 1);
        });
        assert!(Watchdog::tick(5).is_err());
        assert!(Watchdog::tick(5).is_err());
        assert_eq!(fired.get(), 1);
        Watchdog::disarm();
    }
}
