//! Demonstrates that a remote method's failure crosses the wire with its original `ErrorKind`
//! intact, rather than being collapsed into a generic `Rmi` failure.

use rmifs_core::error::{Error, ErrorKind};
use rmifs_core::rmi::{decode_value, encode_arg, Dispatch, DispatchFuture, MethodDescriptor, Skeleton, Stub};
use serde_cbor::Value;

struct Divide;

impl Divide {
    fn descriptor() -> MethodDescriptor {
        MethodDescriptor::new("divide", "i64", vec!["i64", "i64"], vec!["InvalidArgument", "Rmi"])
    }
}

impl Dispatch for Divide {
    fn descriptors(&self) -> &[MethodDescriptor] {
        // A single static-shaped descriptor table would need a `&'static` slice; a one-method
        // interface can just build it fresh since nothing here depends on lifetime identity.
        std::slice::from_ref(DESCRIPTOR.get_or_init(Divide::descriptor))
    }

    fn dispatch<'a>(&'a self, descriptor: &'a MethodDescriptor, arguments: Vec<Value>) -> DispatchFuture<'a> {
        Box::pin(async move {
            if descriptor.name != "divide" {
                return Err(Error::rmi(format!("no such method: {}", descriptor.name)));
            }
            let mut it = arguments.into_iter();
            let a: i64 = decode_value(it.next().unwrap())?;
            let b: i64 = decode_value(it.next().unwrap())?;
            if b == 0 {
                return Err(Error::invalid_argument("cannot divide by zero"));
            }
            encode_arg(&(a / b))
        })
    }
}

static DESCRIPTOR: std::sync::OnceLock<MethodDescriptor> = std::sync::OnceLock::new();

#[tokio::test]
async fn remote_invalid_argument_failure_is_observed_verbatim_at_the_call_site() {
    let skeleton = Skeleton::new(Divide).unwrap();
    skeleton.start().await.unwrap();
    let address = skeleton.address().await.unwrap();
    let stub = Stub::new("Divide", address);

    let err = stub
        .call::<i64>(&Divide::descriptor(), vec![encode_arg(&1i64).unwrap(), encode_arg(&0i64).unwrap()])
        .await
        .unwrap_err();

    assert!(err.is_kind(ErrorKind::InvalidArgument));
    assert_eq!(err.description, "cannot divide by zero");

    skeleton.stop().await;
}

#[tokio::test]
async fn remote_success_returns_the_same_value_as_a_direct_call() {
    let skeleton = Skeleton::new(Divide).unwrap();
    skeleton.start().await.unwrap();
    let address = skeleton.address().await.unwrap();
    let stub = Stub::new("Divide", address);

    let result: i64 = stub
        .call(&Divide::descriptor(), vec![encode_arg(&10i64).unwrap(), encode_arg(&4i64).unwrap()])
        .await
        .unwrap();

    assert_eq!(result, 10 / 4);
    skeleton.stop().await;
}
