use crate::dispatch::Ticket;

/// The native layer rejected a piece of script text.
#[derive(Debug, thiserror::Error)]
#[error("script evaluation failed")]
pub struct EvalFailed;

/// The native rendering surface behind one window.
///
/// One designated thread owns all surface interaction; `eval` must only be
/// called from that thread. `wake` and `step` are the two hooks the bridge
/// needs from the native event loop: `wake` tells it a dispatch ticket is
/// pending, and the loop answers by calling [`crate::Bridge::drain`] with
/// that ticket from the owning thread.
pub trait Surface: Send + Sync + 'static {
    /// Evaluate script text inside the rendering surface.
    fn eval(&self, script: &str) -> Result<(), EvalFailed>;

    /// Signal the native event loop that `ticket` is ready to drain.
    fn wake(&self, ticket: Ticket);

    /// Run one iteration of the native event loop. Returns `false` once the
    /// loop should stop (window closed or terminated).
    fn step(&self, blocking: bool) -> bool;

    /// Drive the event loop until it stops.
    fn run(&self) {
        while self.step(true) {}
    }
}
