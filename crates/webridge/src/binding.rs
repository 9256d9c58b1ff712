use crate::method::MethodSet;
use crate::script;
use crate::surface::{EvalFailed, Surface};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

/// Wire shape of one script-originated call: the namespace it targets, the
/// projected method name, and the positional arguments. Transient; parsed
/// from the invoke payload and consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcMessage {
    pub scope: String,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// A state push into script failed.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to encode bound state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Eval(#[from] EvalFailed),
}

/// Shared state of one binding: the namespace name, the descriptor set, the
/// exclusively owned target object, and the surface state pushes go to.
/// Referenced by the window's handler entry and by the [`BoundObject`]
/// handed back to the application.
pub(crate) struct BindingCore<T, S: Surface> {
    name: String,
    methods: MethodSet<T>,
    target: Mutex<T>,
    surface: Arc<S>,
}

impl<T, S> BindingCore<T, S>
where
    T: Serialize + Send + 'static,
    S: Surface,
{
    pub(crate) fn new(name: String, methods: MethodSet<T>, target: T, surface: Arc<S>) -> Self {
        Self {
            name,
            methods,
            target: Mutex::new(target),
            surface,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn projection(&self) -> Result<String, script::ProjectionError> {
        script::projection(&self.name, &self.methods)
    }

    /// The invocation dispatcher. Reports whether the payload was handled;
    /// anything that does not bind cleanly (parse failure, scope mismatch,
    /// unknown method, argument mismatch) is a normal "not for me" signal
    /// and control falls through to the next handler in the window's chain.
    pub(crate) fn handle_invoke(&self, payload: &str) -> bool {
        let Ok(message) = serde_json::from_str::<RpcMessage>(payload) else {
            return false;
        };
        if message.scope != self.name {
            return false;
        }
        let Some(descriptor) = self.methods.find(&message.method) else {
            return false;
        };

        {
            let mut target = self.lock_target();
            if let Err(mismatch) = descriptor.invoke(&mut target, &message.params) {
                tracing::debug!(
                    binding = %self.name,
                    method = %message.method,
                    error = %mismatch,
                    "invoke payload did not bind"
                );
                return false;
            }
        }

        // A handled call is followed by a state push. Encoding failures skip
        // the push and leave the previous script-side state in place; eval
        // failures have no reply channel here, so both are only logged.
        if let Err(err) = self.sync() {
            tracing::warn!(binding = %self.name, error = %err, "post-call state sync skipped");
        }
        true
    }

    /// Serialize the current target state and install it into the script
    /// namespace. Rendering-surface thread only.
    pub(crate) fn sync(&self) -> Result<(), SyncError> {
        let script = {
            let target = self.lock_target();
            script::sync_script(&self.name, &*target)?
        };
        self.surface.eval(&script)?;
        Ok(())
    }

    fn lock_target(&self) -> MutexGuard<'_, T> {
        match self.target.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Handle to a bound object, returned by [`crate::Bridge::bind`].
///
/// The bound target is owned by the binding; the application reaches it
/// through [`BoundObject::update`] and pushes its state into script with
/// [`BoundObject::sync`]. Both are cheap to clone into dispatch closures,
/// which is how background threads mutate bound state safely: mutate via
/// `update`, then `sync` from the dispatched task on the surface thread.
pub struct BoundObject<T, S: Surface> {
    core: Arc<BindingCore<T, S>>,
}

impl<T, S: Surface> std::fmt::Debug for BoundObject<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundObject").finish_non_exhaustive()
    }
}

impl<T, S: Surface> Clone for BoundObject<T, S> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T, S> BoundObject<T, S>
where
    T: Serialize + Send + 'static,
    S: Surface,
{
    pub(crate) fn new(core: Arc<BindingCore<T, S>>) -> Self {
        Self { core }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Push the current state into the script namespace. Must be called from
    /// the rendering-surface thread.
    pub fn sync(&self) -> Result<(), SyncError> {
        self.core.sync()
    }

    /// Run `f` against the bound target under the binding's lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.core.lock_target())
    }
}
