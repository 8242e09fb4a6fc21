// A list of operator-registered congestion predicates, OR'd together.
// Append-only: predicates are expected to be registered before the run
// loop starts, not mutated at runtime.

use coordinator_base::BackPressureFunc;
use std::sync::RwLock;

#[derive(Default)]
pub struct BackPressureGate {
    predicates: RwLock<Vec<Box<dyn BackPressureFunc>>>,
}

impl BackPressureGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, predicate: impl BackPressureFunc + 'static) {
        self.predicates.write().unwrap().push(Box::new(predicate));
    }

    /// `true` if any registered predicate fires.
    pub fn fires(&self) -> bool {
        self.predicates.read().unwrap().iter().any(|p| p())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn no_predicates_never_fires() {
        let gate = BackPressureGate::new();
        assert!(!gate.fires());
    }

    #[test]
    fn any_true_predicate_fires() {
        let gate = BackPressureGate::new();
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        gate.register(move || flag_clone.load(Ordering::SeqCst));
        gate.register(|| false);
        assert!(!gate.fires());
        flag.store(true, Ordering::SeqCst);
        assert!(gate.fires());
    }
}
