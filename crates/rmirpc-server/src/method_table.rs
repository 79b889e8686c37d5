//! Per-service method tables.
//!
//! A [`MethodTable`] is what gets bound under a name in the [`Registry`].
//! It maps each method id to a handler and the parameter types the handler
//! declared. Tables are built once with [`MethodTableBuilder`] and are
//! immutable afterwards; replacing a service means rebinding a new table.
//!
//! [`Registry`]: crate::Registry

use std::collections::HashMap;
use std::sync::Arc;

use rmirpc_common::protocol::error::{Result, RpcError};
use rmirpc_common::protocol::{ArgType, MethodDescriptor, MethodId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::finite::ensure_finite;

/// Untyped handler: receives the already type-checked argument list.
pub type Handler = dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync;

struct Method {
    descriptor: MethodDescriptor,
    handler: Arc<Handler>,
}

/// Immutable mapping from method id to handler.
///
/// # Example
///
/// ```
/// use rmirpc_common::protocol::ArgType;
/// use rmirpc_server::MethodTable;
/// use serde_json::json;
///
/// let table = MethodTable::builder()
///     .method("multiply", vec![ArgType::Number, ArgType::Number], |(a, b): (f64, f64)| {
///         Ok(a * b)
///     })
///     .build();
///
/// let result = table.invoke("Calc", "multiply", vec![json!(3), json!(4)]).unwrap();
/// assert_eq!(result, json!(12.0));
/// ```
pub struct MethodTable {
    methods: HashMap<MethodId, Method>,
}

impl MethodTable {
    pub fn builder() -> MethodTableBuilder {
        MethodTableBuilder {
            methods: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn descriptor(&self, method: &str) -> Option<&MethodDescriptor> {
        self.methods.get(method).map(|m| &m.descriptor)
    }

    /// All method signatures, sorted by id.
    pub fn descriptors(&self) -> Vec<MethodDescriptor> {
        let mut descriptors: Vec<_> = self.methods.values().map(|m| m.descriptor.clone()).collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    /// Resolves `method`, validates `args` against its declaration and runs
    /// the handler on the current thread.
    ///
    /// `service` is only used to name the target in errors.
    pub fn invoke(&self, service: &str, method: &str, args: Vec<Value>) -> Result<Value> {
        let entry = self
            .methods
            .get(method)
            .ok_or_else(|| RpcError::UnknownMethod(format!("{}.{}", service, method)))?;

        entry.descriptor.check_args(&args)?;
        (entry.handler)(args)
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.descriptors())
            .finish()
    }
}

/// Collects methods before they are frozen into a [`MethodTable`].
///
/// Registering the same id twice keeps the later handler.
pub struct MethodTableBuilder {
    methods: HashMap<MethodId, Method>,
}

impl MethodTableBuilder {
    /// Adds a handler that works on raw JSON argument lists.
    pub fn raw_method<F>(mut self, id: impl Into<MethodId>, params: Vec<ArgType>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        let id = id.into();
        let descriptor = MethodDescriptor::new(id.clone(), params);
        self.methods.insert(
            id,
            Method {
                descriptor,
                handler: Arc::new(handler),
            },
        );
        self
    }

    /// Adds a typed handler.
    ///
    /// The argument list is deserialized into `A` as a JSON array, so `A` is
    /// normally a tuple with one element per declared parameter; methods
    /// without parameters take `()`. A value that passes the declared type
    /// check but still does not fit `A` is reported as `ArgumentMismatch`.
    /// A result holding a NaN or infinite float fails with `Application`
    /// instead of reaching the caller as `null`.
    pub fn method<A, R, F>(self, id: impl Into<MethodId>, params: Vec<ArgType>, handler: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> Result<R> + Send + Sync + 'static,
    {
        let id = id.into();
        let name = id.clone();

        self.raw_method(id, params, move |args| {
            let input = if args.is_empty() {
                Value::Null
            } else {
                Value::Array(args)
            };

            let typed: A = serde_json::from_value(input)
                .map_err(|e| RpcError::ArgumentMismatch(format!("{}: {}", name, e)))?;

            let output = handler(typed)?;
            let unencodable = |e: serde_json::Error| {
                RpcError::Application(format!("{}: result could not be encoded: {}", name, e))
            };

            ensure_finite(&output).map_err(unencodable)?;
            serde_json::to_value(output).map_err(unencodable)
        })
    }

    pub fn build(self) -> MethodTable {
        MethodTable {
            methods: self.methods,
        }
    }
}
