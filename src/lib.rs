//! A distributed filesystem built on a small RMI fabric: a naming core that owns the namespace
//! and a set of independently addressable storage servers that hold the bytes.
//!
//! [`rmi`] provides the transport-agnostic plumbing (method descriptors, dispatch tables,
//! skeletons, stubs). [`naming`] and [`storage`] build the two halves of the filesystem on top
//! of it.

pub mod config;
pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod path;
pub use path::Path;

mod net;
pub use net::{InmemoryStream, InmemoryTransport, Transport, TransportReader, TransportWriter};

pub mod rmi;
pub use rmi::{Dispatch, MethodDescriptor, Skeleton, SkeletonState, Stub};

pub mod storage;
pub use storage::{Command, CommandStub, LocalStorageServer, Storage, StorageStub};

pub mod naming;
pub use naming::{NamingCore, NamingServer, RegistrationStub, ServiceStub};
