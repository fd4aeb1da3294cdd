//! Per-class instance accounting.
//!
//! Ownership of engine objects is expressed through the usual Rust means
//! (moves, [`Arc`], pool handles), but the diagnostics the old manual
//! refcounting provided are worth keeping: every long-lived object class
//! registers its live-instance count here, and a snapshot of the counts can
//! be printed at any time. A non-zero count at teardown is a leak.
//!
//! Objects participate by embedding a [`ClassGuard`], created with
//! [`ClassGuard::new`] (counted) or [`ClassGuard::static_instance`]
//! (exempt, for `&'static` singletons).

use crate::error::{Error, ErrorKind, Result};
use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;

struct Registry {
    /// class name -> active instances. The map only ever grows; classes stay
    /// listed at zero so leak checks can enumerate everything ever created.
    active: AHashMap<&'static str, u64>,
    /// Insertion order, for stable snapshot output.
    order: Vec<&'static str>,
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| {
    Mutex::new(Registry {
        active: AHashMap::new(),
        order: Vec::new(),
    })
});

/// RAII registration of one live instance of a named class.
#[derive(Debug)]
pub struct ClassGuard {
    class: Option<&'static str>,
}

impl ClassGuard {
    pub fn new(class: &'static str) -> Self {
        let mut reg = REGISTRY.lock();
        match reg.active.get_mut(class) {
            Some(count) => *count += 1,
            None => {
                reg.active.insert(class, 1);
                reg.order.push(class);
            }
        }
        Self { class: Some(class) }
    }

    /// A guard that never counts. For statically allocated instances that are
    /// never dropped.
    pub const fn static_instance() -> Self {
        Self { class: None }
    }
}

impl Drop for ClassGuard {
    fn drop(&mut self) {
        if let Some(class) = self.class {
            let mut reg = REGISTRY.lock();
            let count = reg
                .active
                .get_mut(class)
                .expect("dropping an unregistered class guard");
            debug_assert!(*count > 0, "class '{class}' active count underflow");
            *count = count.saturating_sub(1);
        }
    }
}

/// Number of live instances of `class`.
pub fn active(class: &str) -> u64 {
    REGISTRY.lock().active.get(class).copied().unwrap_or(0)
}

/// Formatted per-class summary for diagnostics:
///
/// ```text
///  -> 'scene': 1
///  -> 'entity': 12
///  total: 2
/// ```
pub fn classes_snapshot() -> String {
    let reg = REGISTRY.lock();
    let mut out = String::new();
    for class in &reg.order {
        let count = reg.active[class];
        out.push_str(&format!(" -> '{class}': {count}\n"));
    }
    out.push_str(&format!(" total: {}", reg.order.len()));
    out
}

/// True if any class still has live instances. Checked at engine teardown.
pub fn any_active() -> bool {
    REGISTRY.lock().active.values().any(|&count| count > 0)
}

/// Consumes an [`Arc`] the caller believes to be the last reference,
/// returning the inner value. Fails with `InvalidOperation` when other
/// references are still live, mirroring the old `ref_put_last` assertion.
pub fn release_last<T>(arc: Arc<T>) -> Result<T> {
    Arc::try_unwrap(arc).map_err(|_| Error::new(ErrorKind::InvalidOperation))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        _guard: ClassGuard,
    }

    impl Widget {
        fn new() -> Self {
            Self {
                _guard: ClassGuard::new("test_widget"),
            }
        }
    }

    #[test]
    fn guards_count_up_and_down() {
        let before = active("test_widget");
        let a = Widget::new();
        let b = Widget::new();
        assert_eq!(active("test_widget"), before + 2);
        drop(a);
        assert_eq!(active("test_widget"), before + 1);
        drop(b);
        assert_eq!(active("test_widget"), before);
    }

    #[test]
    fn static_guards_do_not_count() {
        let before = active("test_widget");
        let guard = ClassGuard::static_instance();
        assert_eq!(active("test_widget"), before);
        drop(guard);
        assert_eq!(active("test_widget"), before);
    }

    #[test]
    fn snapshot_lists_known_classes() {
        let _w = Widget::new();
        let snap = classes_snapshot();
        assert!(snap.contains("'test_widget'"), "{snap}");
        assert!(snap.contains("total:"), "{snap}");
    }

    #[test]
    fn release_last_requires_sole_ownership() {
        let arc = Arc::new(5);
        let extra = arc.clone();
        let arc = match release_last(arc) {
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::InvalidOperation);
                extra
            }
            Ok(_) => panic!("release_last succeeded with two owners"),
        };
        assert_eq!(release_last(arc).unwrap(), 5);
    }
}
