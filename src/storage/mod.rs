//! The storage-server interface surface the naming core consumes (`Storage`, `Command`), plus
//! a reference local-filesystem implementation used to exercise the registration protocol and
//! the `create_file`/`delete` round trips end-to-end in tests.
//!
//! The on-disk behavior of a storage server is treated by the wider system as a capability it
//! exposes, not a specified contract; `LocalStorageServer` is one reasonable implementation of
//! that capability, grounded in ordinary `tokio::fs` usage, and is not itself load-bearing for
//! any invariant the naming core relies on.

use crate::error::{Error, Result};
use crate::naming::RegistrationStub;
use crate::path::Path;
use crate::rmi::{decode_value, encode_arg, Dispatch, DispatchFuture, MethodDescriptor, Skeleton, Stub};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_cbor::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Method descriptors for the `Storage` and `Command` interfaces, built once by hand next to
/// the traits they describe (there is no reflective method handle to derive them from).
pub mod descriptors {
    use super::MethodDescriptor;

    pub fn size() -> MethodDescriptor {
        MethodDescriptor::new("size", "u64", vec!["Path"], vec!["NotFound", "Rmi"])
    }
    pub fn read() -> MethodDescriptor {
        MethodDescriptor::new(
            "read",
            "Vec<u8>",
            vec!["Path", "u64", "u64"],
            vec!["NotFound", "Rmi"],
        )
    }
    pub fn write() -> MethodDescriptor {
        MethodDescriptor::new(
            "write",
            "()",
            vec!["Path", "u64", "Vec<u8>"],
            vec!["NotFound", "Rmi"],
        )
    }
    pub fn create() -> MethodDescriptor {
        MethodDescriptor::new("create", "bool", vec!["Path"], vec!["Rmi"])
    }
    pub fn delete() -> MethodDescriptor {
        MethodDescriptor::new("delete", "bool", vec!["Path"], vec!["Rmi"])
    }
}

/// Client → storage read path. The naming core never calls this directly; a client obtains a
/// `StorageStub` via `ServiceStub::get_storage` and calls it itself.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn size(&self, path: &Path) -> Result<u64>;
    async fn read(&self, path: &Path, offset: u64, length: u64) -> Result<Vec<u8>>;
    async fn write(&self, path: &Path, offset: u64, data: Vec<u8>) -> Result<()>;
}

/// Naming → storage mutation path. The naming core calls `create` during `create_file` and
/// `delete` during `delete`.
#[async_trait]
pub trait Command: Send + Sync {
    async fn create(&self, path: &Path) -> Result<bool>;
    async fn delete(&self, path: &Path) -> Result<bool>;
}

fn next_arg<T: serde::de::DeserializeOwned>(it: &mut std::vec::IntoIter<Value>) -> Result<T> {
    let value = it.next().ok_or_else(|| Error::rmi("missing argument in invocation"))?;
    decode_value(value)
}

/// Client-side typed façade for [`Storage`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageStub(Stub);

impl StorageStub {
    pub fn new(address: SocketAddr) -> Self {
        Self(Stub::new("Storage", address))
    }

    pub async fn bound_to_skeleton<D: Dispatch>(skeleton: &Skeleton<D>) -> Result<Self> {
        Ok(Self(Stub::bound_to_skeleton("Storage", skeleton).await?))
    }

    pub fn address(&self) -> SocketAddr {
        self.0.address()
    }

    pub async fn size(&self, path: &Path) -> Result<u64> {
        self.0.call(&descriptors::size(), vec![encode_arg(path)?]).await
    }

    pub async fn read(&self, path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.0
            .call(
                &descriptors::read(),
                vec![encode_arg(path)?, encode_arg(&offset)?, encode_arg(&length)?],
            )
            .await
    }

    pub async fn write(&self, path: &Path, offset: u64, data: Vec<u8>) -> Result<()> {
        self.0
            .call(
                &descriptors::write(),
                vec![encode_arg(path)?, encode_arg(&offset)?, encode_arg(&data)?],
            )
            .await
    }
}

/// Client/naming-side typed façade for [`Command`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandStub(Stub);

impl CommandStub {
    pub fn new(address: SocketAddr) -> Self {
        Self(Stub::new("Command", address))
    }

    pub async fn bound_to_skeleton<D: Dispatch>(skeleton: &Skeleton<D>) -> Result<Self> {
        Ok(Self(Stub::bound_to_skeleton("Command", skeleton).await?))
    }

    pub fn address(&self) -> SocketAddr {
        self.0.address()
    }

    pub async fn create(&self, path: &Path) -> Result<bool> {
        self.0.call(&descriptors::create(), vec![encode_arg(path)?]).await
    }

    pub async fn delete(&self, path: &Path) -> Result<bool> {
        self.0.call(&descriptors::delete(), vec![encode_arg(path)?]).await
    }
}

/// Server-side dispatch table for [`Storage`], wrapping any implementation in the generic
/// tag-based routing `Skeleton` expects.
pub struct StorageDispatch<S: Storage> {
    inner: Arc<S>,
    descriptors: Vec<MethodDescriptor>,
}

impl<S: Storage> StorageDispatch<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            descriptors: vec![descriptors::size(), descriptors::read(), descriptors::write()],
        }
    }
}

impl<S: Storage + 'static> Dispatch for StorageDispatch<S> {
    fn descriptors(&self) -> &[MethodDescriptor] {
        &self.descriptors
    }

    fn dispatch<'a>(&'a self, descriptor: &'a MethodDescriptor, arguments: Vec<Value>) -> DispatchFuture<'a> {
        Box::pin(async move {
            let mut it = arguments.into_iter();
            match descriptor.name.as_str() {
                "size" => {
                    let path: Path = next_arg(&mut it)?;
                    encode_arg(&self.inner.size(&path).await?)
                }
                "read" => {
                    let path: Path = next_arg(&mut it)?;
                    let offset: u64 = next_arg(&mut it)?;
                    let length: u64 = next_arg(&mut it)?;
                    encode_arg(&self.inner.read(&path, offset, length).await?)
                }
                "write" => {
                    let path: Path = next_arg(&mut it)?;
                    let offset: u64 = next_arg(&mut it)?;
                    let data: Vec<u8> = next_arg(&mut it)?;
                    self.inner.write(&path, offset, data).await?;
                    encode_arg(&())
                }
                other => Err(Error::rmi(format!("no such method: {}", other))),
            }
        })
    }
}

/// Server-side dispatch table for [`Command`].
pub struct CommandDispatch<C: Command> {
    inner: Arc<C>,
    descriptors: Vec<MethodDescriptor>,
}

impl<C: Command> CommandDispatch<C> {
    pub fn new(inner: Arc<C>) -> Self {
        Self {
            inner,
            descriptors: vec![descriptors::create(), descriptors::delete()],
        }
    }
}

impl<C: Command + 'static> Dispatch for CommandDispatch<C> {
    fn descriptors(&self) -> &[MethodDescriptor] {
        &self.descriptors
    }

    fn dispatch<'a>(&'a self, descriptor: &'a MethodDescriptor, arguments: Vec<Value>) -> DispatchFuture<'a> {
        Box::pin(async move {
            let mut it = arguments.into_iter();
            match descriptor.name.as_str() {
                "create" => {
                    let path: Path = next_arg(&mut it)?;
                    encode_arg(&self.inner.create(&path).await?)
                }
                "delete" => {
                    let path: Path = next_arg(&mut it)?;
                    encode_arg(&self.inner.delete(&path).await?)
                }
                other => Err(Error::rmi(format!("no such method: {}", other))),
            }
        })
    }
}

/// Reference implementation of both [`Storage`] and [`Command`] backed by a root directory on
/// the local filesystem. Not itself part of the specified contract - it exists so the
/// naming-core <-> storage protocol can be exercised end-to-end without a second, independently
/// specified component.
pub struct LocalStorageServer {
    root: PathBuf,
}

impl LocalStorageServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Walks `self.root` with [`Path::list_local`], registers the discovered files with the
    /// naming service through `registration`, and deletes any local copy the naming service
    /// rejected as already claimed by another binding.
    pub async fn register_with(
        &self,
        storage_stub: StorageStub,
        command_stub: CommandStub,
        registration: &RegistrationStub,
    ) -> Result<()> {
        let local_paths = Path::list_local(&self.root)?;
        let to_delete = registration
            .register(storage_stub, command_stub, local_paths)
            .await?;
        for path in to_delete {
            let file = path.to_local_file(&self.root);
            if tokio::fs::metadata(&file).await.is_ok() {
                tokio::fs::remove_file(&file).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorageServer {
    async fn size(&self, path: &Path) -> Result<u64> {
        let file = path.to_local_file(&self.root);
        let meta = tokio::fs::metadata(&file)
            .await
            .map_err(|e| map_not_found(e, &file))?;
        Ok(meta.len())
    }

    async fn read(&self, path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
        let file = path.to_local_file(&self.root);
        let mut handle = tokio::fs::File::open(&file)
            .await
            .map_err(|e| map_not_found(e, &file))?;
        handle.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length as usize];
        handle.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn write(&self, path: &Path, offset: u64, data: Vec<u8>) -> Result<()> {
        let file = path.to_local_file(&self.root);
        let mut handle = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(&file)
            .await?;
        handle.seek(std::io::SeekFrom::Start(offset)).await?;
        handle.write_all(&data).await?;
        Ok(())
    }
}

#[async_trait]
impl Command for LocalStorageServer {
    async fn create(&self, path: &Path) -> Result<bool> {
        let file = path.to_local_file(&self.root);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn delete(&self, path: &Path) -> Result<bool> {
        let file = path.to_local_file(&self.root);
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::from(e)),
        }
    }
}

fn map_not_found(e: std::io::Error, file: &std::path::Path) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::not_found(format!("{} does not exist", file.display()))
    } else {
        Error::from(e)
    }
}
