use std::sync::atomic::{AtomicBool, Ordering};

/// Per-operation marker ensuring at most one outstanding request of a kind.
///
/// Acquisition never blocks: callers that find the guard taken drop their request.
#[derive(Debug, Default)]
pub struct InFlightGuard {
    busy: AtomicBool,
    label: &'static str,
}

impl InFlightGuard {
    pub const fn new(label: &'static str) -> Self {
        Self {
            busy: AtomicBool::new(false),
            label,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Take the guard; the returned permit releases it on drop, on every exit path.
    pub fn try_acquire(&self) -> Option<InFlightPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightPermit { guard: self })
    }
}

#[derive(Debug)]
pub struct InFlightPermit<'a> {
    guard: &'a InFlightGuard,
}

impl Drop for InFlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let guard = InFlightGuard::new("view");
        let permit = guard.try_acquire().expect("first acquire");
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }
}
