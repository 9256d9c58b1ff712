use serde::de::DeserializeOwned;
use serde_json::Value;

/// A method name was rejected at registration time.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    /// Exposed operations follow the exported-identifier convention: a
    /// non-empty ASCII identifier starting with an upper-case letter.
    #[error("method name {0:?} is not an exported identifier")]
    NotExported(String),
}

/// Why an invocation did not bind to a descriptor. Diagnostic only; the
/// dispatcher reports such calls as unhandled.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CallMismatch {
    #[error("expected {expected} params, got {got}")]
    Count { expected: usize, got: usize },
    #[error("param {index} failed to coerce: {source}")]
    Param {
        index: usize,
        source: serde_json::Error,
    },
}

type Invoker<T> = Box<dyn Fn(&mut T, &[Value]) -> Result<(), CallMismatch> + Send + Sync>;

/// One invocable operation of a bound object: its exported name, the
/// projected script-side name, its arity, and the typed invoker closure.
/// Immutable once built.
pub struct MethodDescriptor<T> {
    name: String,
    js_name: String,
    arity: usize,
    invoker: Invoker<T>,
}

impl<T> MethodDescriptor<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The script-side function name: the exported name with its first code
    /// point lower-cased, everything else unchanged.
    pub fn js_name(&self) -> &str {
        &self.js_name
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub(crate) fn invoke(&self, target: &mut T, params: &[Value]) -> Result<(), CallMismatch> {
        (self.invoker)(target, params)
    }
}

/// Ordered set of operations a bound object exposes to script code.
///
/// The host registers each operation explicitly as a typed closure; arity
/// and parameter coercion follow from the closure's signature. If two
/// registrations share a projected name, the later definition shadows the
/// earlier one in the generated namespace; since invoke payloads carry the
/// projected name, the first registered invoker receives such calls.
pub struct MethodSet<T> {
    methods: Vec<MethodDescriptor<T>>,
}

impl<T> std::fmt::Debug for MethodSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodSet").finish_non_exhaustive()
    }
}

impl<T> Default for MethodSet<T> {
    fn default() -> Self {
        Self {
            methods: Vec::new(),
        }
    }
}

impl<T> MethodSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a zero-argument operation.
    pub fn op0(
        self,
        name: &str,
        f: impl Fn(&mut T) + Send + Sync + 'static,
    ) -> Result<Self, DescriptorError> {
        self.register(
            name,
            0,
            Box::new(move |target, params| {
                check_arity(0, params)?;
                f(target);
                Ok(())
            }),
        )
    }

    /// Register a one-argument operation.
    pub fn op1<A>(
        self,
        name: &str,
        f: impl Fn(&mut T, A) + Send + Sync + 'static,
    ) -> Result<Self, DescriptorError>
    where
        A: DeserializeOwned,
    {
        self.register(
            name,
            1,
            Box::new(move |target, params| {
                check_arity(1, params)?;
                let a0 = coerce::<A>(params, 0)?;
                f(target, a0);
                Ok(())
            }),
        )
    }

    /// Register a two-argument operation.
    pub fn op2<A, B>(
        self,
        name: &str,
        f: impl Fn(&mut T, A, B) + Send + Sync + 'static,
    ) -> Result<Self, DescriptorError>
    where
        A: DeserializeOwned,
        B: DeserializeOwned,
    {
        self.register(
            name,
            2,
            Box::new(move |target, params| {
                check_arity(2, params)?;
                let a0 = coerce::<A>(params, 0)?;
                let a1 = coerce::<B>(params, 1)?;
                f(target, a0, a1);
                Ok(())
            }),
        )
    }

    /// Register a three-argument operation.
    pub fn op3<A, B, C>(
        self,
        name: &str,
        f: impl Fn(&mut T, A, B, C) + Send + Sync + 'static,
    ) -> Result<Self, DescriptorError>
    where
        A: DeserializeOwned,
        B: DeserializeOwned,
        C: DeserializeOwned,
    {
        self.register(
            name,
            3,
            Box::new(move |target, params| {
                check_arity(3, params)?;
                let a0 = coerce::<A>(params, 0)?;
                let a1 = coerce::<B>(params, 1)?;
                let a2 = coerce::<C>(params, 2)?;
                f(target, a0, a1, a2);
                Ok(())
            }),
        )
    }

    /// Register a four-argument operation.
    pub fn op4<A, B, C, D>(
        self,
        name: &str,
        f: impl Fn(&mut T, A, B, C, D) + Send + Sync + 'static,
    ) -> Result<Self, DescriptorError>
    where
        A: DeserializeOwned,
        B: DeserializeOwned,
        C: DeserializeOwned,
        D: DeserializeOwned,
    {
        self.register(
            name,
            4,
            Box::new(move |target, params| {
                check_arity(4, params)?;
                let a0 = coerce::<A>(params, 0)?;
                let a1 = coerce::<B>(params, 1)?;
                let a2 = coerce::<C>(params, 2)?;
                let a3 = coerce::<D>(params, 3)?;
                f(target, a0, a1, a2, a3);
                Ok(())
            }),
        )
    }

    fn register(
        mut self,
        name: &str,
        arity: usize,
        invoker: Invoker<T>,
    ) -> Result<Self, DescriptorError> {
        if !is_exported_name(name) {
            return Err(DescriptorError::NotExported(name.to_string()));
        }
        self.methods.push(MethodDescriptor {
            name: name.to_string(),
            js_name: projected_name(name),
            arity,
            invoker,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// First descriptor whose projected name matches `js_name`.
    pub(crate) fn find(&self, js_name: &str) -> Option<&MethodDescriptor<T>> {
        self.methods.iter().find(|m| m.js_name == js_name)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &MethodDescriptor<T>> {
        self.methods.iter()
    }
}

fn check_arity(expected: usize, params: &[Value]) -> Result<(), CallMismatch> {
    if params.len() == expected {
        Ok(())
    } else {
        Err(CallMismatch::Count {
            expected,
            got: params.len(),
        })
    }
}

// Round-trip one positional value through the canonical encoding into the
// declared parameter type. All positions are coerced before any invoker
// runs, so a failing position rejects the whole call.
fn coerce<A: DeserializeOwned>(params: &[Value], index: usize) -> Result<A, CallMismatch> {
    serde_json::from_value(params[index].clone())
        .map_err(|source| CallMismatch::Param { index, source })
}

fn is_exported_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

pub(crate) fn projected_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
