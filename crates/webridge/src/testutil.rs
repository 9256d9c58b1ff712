use crate::dispatch::Ticket;
use crate::surface::{EvalFailed, Surface};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Headless surface for tests: records evaluated scripts and wake signals,
/// and can be told to reject the next evaluation.
pub(crate) struct RecordingSurface {
    evals: Mutex<Vec<String>>,
    wakes: Mutex<Vec<Ticket>>,
    fail_next_eval: AtomicBool,
}

impl RecordingSurface {
    pub(crate) fn new() -> Self {
        Self {
            evals: Mutex::new(Vec::new()),
            wakes: Mutex::new(Vec::new()),
            fail_next_eval: AtomicBool::new(false),
        }
    }

    pub(crate) fn evals(&self) -> Vec<String> {
        self.evals.lock().expect("evals lock").clone()
    }

    pub(crate) fn wakes(&self) -> Vec<Ticket> {
        self.wakes.lock().expect("wakes lock").clone()
    }

    pub(crate) fn fail_next_eval(&self) {
        self.fail_next_eval.store(true, Ordering::SeqCst);
    }
}

impl Surface for RecordingSurface {
    fn eval(&self, script: &str) -> Result<(), EvalFailed> {
        if self.fail_next_eval.swap(false, Ordering::SeqCst) {
            return Err(EvalFailed);
        }
        self.evals.lock().expect("evals lock").push(script.to_string());
        Ok(())
    }

    fn wake(&self, ticket: Ticket) {
        self.wakes.lock().expect("wakes lock").push(ticket);
    }

    fn step(&self, _blocking: bool) -> bool {
        false
    }
}
