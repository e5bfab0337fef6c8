//! The RMI fabric: method descriptors, per-interface dispatch tables, and the skeleton/stub
//! pair that carries invocations across TCP as though they were local calls.

mod descriptor;
pub use descriptor::{find_in, MethodDescriptor, RMI_FAILURE_TYPE_NAME};

mod dispatch;
pub use dispatch::{decode_value, encode_arg, Dispatch, DispatchFuture, Invocation, Outcome};

mod skeleton;
pub use skeleton::{ErrorHook, Skeleton, SkeletonState};

mod stub;
pub use stub::Stub;
