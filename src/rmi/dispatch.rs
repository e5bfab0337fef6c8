use crate::error::{Error, Result};
use crate::rmi::descriptor::MethodDescriptor;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_cbor::Value;
use std::future::Future;
use std::pin::Pin;

/// Request frame sent by a stub: the method being invoked plus its heterogeneous argument
/// sequence, each argument a self-describing CBOR value so a generic skeleton can route the
/// frame before any interface-specific type is known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub descriptor: MethodDescriptor,
    pub arguments: Vec<Value>,
}

/// Response frame sent by a skeleton: a tagged envelope so the stub never has to guess whether
/// the payload is a return value or a captured failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum Outcome {
    Ok(Value),
    Raised(Error),
}

/// Future returned by [`Dispatch::dispatch`].
pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// A remote interface's server-side dispatch table: the generated-table stand-in for runtime
/// reflection. One implementation of this trait exists per interface (`Dispatch` for
/// `RegistrationInterface`, `ServiceInterface`, `StorageInterface`, `CommandInterface`).
pub trait Dispatch: Send + Sync {
    /// Descriptors this implementation answers for - used both to validate that every method
    /// is a remote method, and to resolve an incoming descriptor.
    fn descriptors(&self) -> &[MethodDescriptor];

    /// Invokes the method matching `descriptor` with `arguments`, returning its encoded result
    /// or the `Error` it raised. Returns `Err` with `ErrorKind::Rmi` if no method matches.
    fn dispatch<'a>(&'a self, descriptor: &'a MethodDescriptor, arguments: Vec<Value>) -> DispatchFuture<'a>;
}

/// Encodes one typed argument into the self-describing form carried in an [`Invocation`].
pub fn encode_arg<T: Serialize>(value: &T) -> Result<Value> {
    serde_cbor::value::to_value(value).map_err(Error::from)
}

/// Decodes a typed value out of a [`Value`] pulled from an [`Invocation`] or [`Outcome`].
pub fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_cbor::value::from_value(value).map_err(Error::from)
}
