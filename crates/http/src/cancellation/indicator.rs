use std::sync::atomic::{AtomicBool, Ordering};

/// A set-once flag marking a pending operation as resolved.
///
/// When several completions race for the same operation (a timer, an external
/// cancel and the operation itself), only the one that wins [`try_resolve`](Self::try_resolve)
/// acts; the others become no-ops.
#[derive(Debug, Default)]
pub struct CancellationIndicator {
    resolved: AtomicBool,
}

impl CancellationIndicator {
    pub fn new() -> Self {
        Default::default()
    }

    /// Marks the operation resolved. Returns true only for the first caller.
    #[inline]
    pub fn try_resolve(&self) -> bool {
        !self.resolved.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn only_first_resolve_wins() {
        let indicator = CancellationIndicator::new();
        assert!(!indicator.is_resolved());
        assert!(indicator.try_resolve());
        assert!(!indicator.try_resolve());
        assert!(indicator.is_resolved());
    }

    #[test]
    fn one_winner_across_threads() {
        let indicator = Arc::new(CancellationIndicator::new());
        let handles = (0..8)
            .map(|_| {
                let indicator = indicator.clone();
                std::thread::spawn(move || indicator.try_resolve())
            })
            .collect::<Vec<_>>();

        let winners = handles.into_iter().map(|handle| handle.join().unwrap()).filter(|won| *won).count();
        assert_eq!(winners, 1);
    }
}
