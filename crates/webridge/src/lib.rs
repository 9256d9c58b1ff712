//! Bridge between a host application and an embedded web-rendering surface.
//!
//! Host objects are bound under a script-side namespace whose functions
//! forward calls back into typed host closures; host state is pushed into
//! script as structured updates; and any thread can schedule work onto the
//! one thread that owns the rendering surface. The native windowing layer
//! itself stays outside this crate, behind the [`Surface`] trait.

mod binding;
mod dispatch;
mod method;
mod script;
mod surface;
#[cfg(test)]
mod testutil;

pub use binding::{BoundObject, RpcMessage, SyncError};
pub use dispatch::{DispatchQueue, Ticket, UnknownTicket};
pub use method::{DescriptorError, MethodDescriptor, MethodSet};
pub use script::ProjectionError;
pub use surface::{EvalFailed, Surface};

use binding::BindingCore;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Generation-checked identity of one attached window.
///
/// Indexes into the bridge's window arena; the generation is bumped when a
/// slot is detached, so an id held past [`Bridge::detach`] is recognized as
/// stale instead of aliasing whatever reuses the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId {
    index: u32,
    generation: u32,
}

/// Lookup for a window id that is not attached.
///
/// Every live window is attached before the native boundary can deliver
/// events for it, so this indicates a programming error in the boundary
/// glue (or use of a stale id), not a recoverable runtime condition.
#[derive(Debug, thiserror::Error)]
#[error("window {0:?} is not attached")]
pub struct UnknownWindow(pub WindowId);

/// A bind call failed. No handler is installed when bind fails.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("binding exposes no invocable operations")]
    NoOperations,
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Window(#[from] UnknownWindow),
    #[error(transparent)]
    Eval(#[from] EvalFailed),
}

/// A script evaluation routed through the bridge failed.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error(transparent)]
    Window(#[from] UnknownWindow),
    #[error(transparent)]
    Eval(#[from] EvalFailed),
}

type InvokeHandler = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type FallbackHandler = Arc<dyn Fn(&str) + Send + Sync>;
type CloseHandler = Arc<dyn Fn() -> bool + Send + Sync>;

struct WindowState<S> {
    surface: Arc<S>,
    // Named binding handlers, iterated in registration order until one
    // reports handled. Rebinding a name replaces its entry in place.
    bindings: Vec<(String, InvokeHandler)>,
    fallback: Option<FallbackHandler>,
    on_close: Option<CloseHandler>,
}

struct WindowSlot<S> {
    generation: u32,
    state: Option<WindowState<S>>,
}

/// The application-owned context tying everything together: the window
/// table and the main-thread dispatch queue.
///
/// All table operations are short critical sections under one lock; handler
/// execution, script evaluation, and dispatched tasks run outside it.
pub struct Bridge<S: Surface> {
    windows: Mutex<Vec<WindowSlot<S>>>,
    queue: DispatchQueue,
}

impl<S: Surface> Default for Bridge<S> {
    fn default() -> Self {
        Self {
            windows: Mutex::new(Vec::new()),
            queue: DispatchQueue::new(),
        }
    }
}

impl<S: Surface> Bridge<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a window's surface and return its id. Called by the
    /// boundary glue at window construction time, before any event for the
    /// window can be delivered.
    pub fn attach(&self, surface: Arc<S>) -> WindowId {
        let mut windows = self.lock_windows();
        let state = WindowState {
            surface,
            bindings: Vec::new(),
            fallback: None,
            on_close: None,
        };

        for (index, slot) in windows.iter_mut().enumerate() {
            if slot.state.is_none() {
                slot.state = Some(state);
                return WindowId {
                    index: index as u32,
                    generation: slot.generation,
                };
            }
        }

        windows.push(WindowSlot {
            generation: 0,
            state: Some(state),
        });
        WindowId {
            index: (windows.len() - 1) as u32,
            generation: 0,
        }
    }

    /// Remove the window's entry at teardown and invalidate its id.
    pub fn detach(&self, id: WindowId) -> Result<(), UnknownWindow> {
        let mut windows = self.lock_windows();
        let slot = windows
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.state.is_some())
            .ok_or(UnknownWindow(id))?;
        slot.state = None;
        slot.generation = slot.generation.wrapping_add(1);
        Ok(())
    }

    /// Install the catch-all invoke callback that receives payloads no
    /// binding handled.
    pub fn on_invoke(
        &self,
        id: WindowId,
        f: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<(), UnknownWindow> {
        let mut windows = self.lock_windows();
        state_mut(&mut windows, id)?.fallback = Some(Arc::new(f));
        Ok(())
    }

    /// Install the close handler; its verdict decides whether the native
    /// layer may destroy the window. Without one, close is allowed.
    pub fn on_close(
        &self,
        id: WindowId,
        f: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Result<(), UnknownWindow> {
        let mut windows = self.lock_windows();
        state_mut(&mut windows, id)?.on_close = Some(Arc::new(f));
        Ok(())
    }

    pub fn surface(&self, id: WindowId) -> Result<Arc<S>, UnknownWindow> {
        let mut windows = self.lock_windows();
        Ok(state_mut(&mut windows, id)?.surface.clone())
    }

    /// Expose `target`'s operations to script code under `name`.
    ///
    /// Generates the namespace projection, evaluates it, installs (or
    /// replaces) the window's handler entry for `name`, and performs the
    /// initial state sync. Must run on the rendering-surface thread, and
    /// concurrent binds against the same window are not safe against each
    /// other; callers serialize them.
    pub fn bind<T>(
        &self,
        id: WindowId,
        name: &str,
        target: T,
        methods: MethodSet<T>,
    ) -> Result<BoundObject<T, S>, BindError>
    where
        T: Serialize + Send + 'static,
    {
        if methods.is_empty() {
            return Err(BindError::NoOperations);
        }

        let surface = self.surface(id)?;
        let core = Arc::new(BindingCore::new(
            name.to_string(),
            methods,
            target,
            surface.clone(),
        ));
        let projection = core.projection()?;
        surface.eval(&projection)?;

        let handler: InvokeHandler = {
            let core = core.clone();
            Arc::new(move |payload: &str| core.handle_invoke(payload))
        };
        {
            let mut windows = self.lock_windows();
            let state = state_mut(&mut windows, id)?;
            match state.bindings.iter_mut().find(|(n, _)| n == name) {
                Some(entry) => entry.1 = handler,
                None => state.bindings.push((name.to_string(), handler)),
            }
        }

        let bound = BoundObject::new(core);
        if let Err(err) = bound.sync() {
            tracing::warn!(binding = name, error = %err, "initial state sync skipped");
        }
        Ok(bound)
    }

    /// Schedule `task` to run exactly once on the rendering-surface thread
    /// and wake the window's native loop.
    pub fn dispatch(
        &self,
        id: WindowId,
        task: impl FnOnce() + Send + 'static,
    ) -> Result<Ticket, UnknownWindow> {
        let surface = self.surface(id)?;
        let ticket = self.queue.enqueue(task);
        surface.wake(ticket);
        Ok(ticket)
    }

    /// Execute the task for `ticket`. Called by the native loop from the
    /// rendering-surface thread in response to a wake signal.
    pub fn drain(&self, ticket: Ticket) -> Result<(), UnknownTicket> {
        self.queue.drain(ticket)
    }

    /// Route a script-originated invoke payload through the window's handler
    /// list. Returns whether a binding handled it; unhandled payloads go to
    /// the fallback callback when one is installed.
    pub fn deliver_invoke(&self, id: WindowId, payload: &str) -> Result<bool, UnknownWindow> {
        let (handlers, fallback) = {
            let mut windows = self.lock_windows();
            let state = state_mut(&mut windows, id)?;
            let handlers: Vec<InvokeHandler> =
                state.bindings.iter().map(|(_, h)| h.clone()).collect();
            (handlers, state.fallback.clone())
        };

        // Handler bodies evaluate script; they must not run under the table
        // lock.
        for handler in handlers {
            if handler(payload) {
                return Ok(true);
            }
        }
        if let Some(fallback) = fallback {
            fallback(payload);
        }
        Ok(false)
    }

    /// Ask the window's close handler whether the native layer may proceed
    /// with closing. Does not detach; the boundary glue detaches when it
    /// actually destroys the window.
    pub fn deliver_close(&self, id: WindowId) -> Result<bool, UnknownWindow> {
        let on_close = {
            let mut windows = self.lock_windows();
            state_mut(&mut windows, id)?.on_close.clone()
        };
        Ok(on_close.map_or(true, |f| f()))
    }

    /// Evaluate arbitrary script text in the window. Rendering-surface
    /// thread only.
    pub fn eval(&self, id: WindowId, script: &str) -> Result<(), ScriptError> {
        self.surface(id)?.eval(script)?;
        Ok(())
    }

    /// Inject a stylesheet through the script runtime.
    pub fn inject_css(&self, id: WindowId, css: &str) -> Result<(), ScriptError> {
        self.eval(id, &script::css_inject_script(css))
    }

    fn lock_windows(&self) -> MutexGuard<'_, Vec<WindowSlot<S>>> {
        match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn state_mut<S>(
    windows: &mut Vec<WindowSlot<S>>,
    id: WindowId,
) -> Result<&mut WindowState<S>, UnknownWindow> {
    windows
        .get_mut(id.index as usize)
        .filter(|slot| slot.generation == id.generation)
        .and_then(|slot| slot.state.as_mut())
        .ok_or(UnknownWindow(id))
}
