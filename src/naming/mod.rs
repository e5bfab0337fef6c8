//! The naming core: the single authority mapping paths to storage bindings. Exposes two remote
//! interfaces over two independently addressable skeletons - `Registration` (storage servers
//! announce themselves) and `Service` (clients resolve and mutate the namespace) - both backed
//! by one [`NamingCore`] behind one coarse lock.

use crate::error::{Error, Result};
use crate::path::Path;
use crate::rmi::{decode_value, encode_arg, Dispatch, DispatchFuture, MethodDescriptor, Skeleton, Stub};
use crate::storage::{CommandStub, StorageStub};
use log::*;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use serde_cbor::Value;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Method descriptors for the `Registration` and `Service` interfaces.
pub mod descriptors {
    use super::MethodDescriptor;

    pub fn register() -> MethodDescriptor {
        MethodDescriptor::new(
            "register",
            "Vec<Path>",
            vec!["Stub", "Stub", "Vec<Path>"],
            vec!["IllegalState", "Rmi"],
        )
    }
    pub fn is_directory() -> MethodDescriptor {
        MethodDescriptor::new("is_directory", "bool", vec!["Path"], vec!["NotFound", "Rmi"])
    }
    pub fn list() -> MethodDescriptor {
        MethodDescriptor::new("list", "Vec<String>", vec!["Path"], vec!["NotFound", "Rmi"])
    }
    pub fn create_file() -> MethodDescriptor {
        MethodDescriptor::new(
            "create_file",
            "bool",
            vec!["Path"],
            vec!["NotFound", "IllegalState", "Rmi"],
        )
    }
    pub fn create_directory() -> MethodDescriptor {
        MethodDescriptor::new("create_directory", "bool", vec!["Path"], vec!["NotFound", "Rmi"])
    }
    pub fn delete() -> MethodDescriptor {
        MethodDescriptor::new(
            "delete",
            "bool",
            vec!["Path"],
            vec!["NotFound", "InvalidArgument", "Rmi"],
        )
    }
    pub fn get_storage() -> MethodDescriptor {
        MethodDescriptor::new("get_storage", "Stub", vec!["Path"], vec!["NotFound", "Rmi"])
    }
}

fn next_arg<T: serde::de::DeserializeOwned>(it: &mut std::vec::IntoIter<Value>) -> Result<T> {
    let value = it.next().ok_or_else(|| Error::rmi("missing argument in invocation"))?;
    decode_value(value)
}

/// A storage server's two remote faces, bound together as the unit the naming core assigns
/// paths to and looks registrations up by.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Binding {
    pub storage: StorageStub,
    pub command: CommandStub,
}

struct Namespace {
    directories: HashSet<Path>,
    files: HashMap<Path, Binding>,
    servers: HashMap<Binding, HashSet<Path>>,
}

impl Namespace {
    fn new() -> Self {
        let mut directories = HashSet::new();
        directories.insert(Path::root());
        Self {
            directories,
            files: HashMap::new(),
            servers: HashMap::new(),
        }
    }

    /// Inserts every proper ancestor of `path` into `directories`, stopping as soon as an
    /// ancestor is already present (its own ancestors are then guaranteed present too).
    fn ensure_ancestors(&mut self, path: &Path) -> Result<()> {
        let mut current = path.clone();
        while !current.is_root() {
            current = current.parent()?;
            if !self.directories.insert(current.clone()) {
                break;
            }
        }
        Ok(())
    }
}

/// The authoritative, lock-guarded namespace state shared by the `Registration` and `Service`
/// dispatch tables. Every operation takes the lock once for its whole body and releases it
/// before awaiting any remote storage call, per the concurrency discipline this system follows.
pub struct NamingCore {
    namespace: Mutex<Namespace>,
}

impl NamingCore {
    pub fn new() -> Self {
        Self {
            namespace: Mutex::new(Namespace::new()),
        }
    }

    /// Registration interface. A storage server announces its binding and the files it already
    /// holds locally; the root is silently ignored among those files. Returns the subset the
    /// naming service has already claimed through another binding, which the caller is expected
    /// to delete locally. Fails with `IllegalState` on a duplicate binding.
    pub async fn register(&self, storage: StorageStub, command: CommandStub, paths: Vec<Path>) -> Result<Vec<Path>> {
        let binding = Binding { storage, command };
        let mut namespace = self.namespace.lock().await;

        if namespace.servers.contains_key(&binding) {
            return Err(Error::illegal_state(format!(
                "a storage server is already registered at {}",
                binding.storage.address()
            )));
        }
        namespace.servers.insert(binding.clone(), HashSet::new());

        let mut to_delete = Vec::new();
        for path in paths {
            if path.is_root() {
                continue;
            }
            if namespace.directories.contains(&path) || namespace.files.contains_key(&path) {
                to_delete.push(path);
                continue;
            }
            namespace.ensure_ancestors(&path)?;
            namespace.files.insert(path.clone(), binding.clone());
            namespace
                .servers
                .get_mut(&binding)
                .expect("binding was just inserted")
                .insert(path);
        }

        info!("registered storage server at {}", binding.storage.address());
        Ok(to_delete)
    }

    pub async fn is_directory(&self, path: &Path) -> Result<bool> {
        let namespace = self.namespace.lock().await;
        if namespace.directories.contains(path) {
            Ok(true)
        } else if namespace.files.contains_key(path) {
            Ok(false)
        } else {
            Err(Error::not_found(format!("{} is not registered", path)))
        }
    }

    pub async fn list(&self, path: &Path) -> Result<Vec<String>> {
        let namespace = self.namespace.lock().await;
        if !namespace.directories.contains(path) {
            return Err(Error::not_found(format!("{} is not a directory", path)));
        }

        let mut children = HashSet::new();
        for candidate in namespace.directories.iter().chain(namespace.files.keys()) {
            if candidate == path || candidate.is_root() {
                continue;
            }
            if let Ok(parent) = candidate.parent() {
                if &parent == path {
                    children.insert(candidate.last()?.to_string());
                }
            }
        }
        Ok(children.into_iter().collect())
    }

    pub async fn get_storage(&self, path: &Path) -> Result<StorageStub> {
        let namespace = self.namespace.lock().await;
        namespace
            .files
            .get(path)
            .map(|binding| binding.storage.clone())
            .ok_or_else(|| Error::not_found(format!("{} is not a file", path)))
    }

    pub async fn create_directory(&self, path: &Path) -> Result<bool> {
        if path.is_root() {
            return Ok(false);
        }
        let parent = path.parent()?;

        let mut namespace = self.namespace.lock().await;
        if !namespace.directories.contains(&parent) {
            return Err(Error::not_found(format!("{} is not a directory", parent)));
        }
        if namespace.directories.contains(path) || namespace.files.contains_key(path) {
            return Ok(false);
        }
        namespace.directories.insert(path.clone());
        Ok(true)
    }

    /// Selects a registered storage binding uniformly at random, asks it to create the file over
    /// the wire, and only then commits the path into the namespace. The remote call is made
    /// without the namespace lock held.
    pub async fn create_file(&self, path: &Path) -> Result<bool> {
        if path.is_root() {
            return Err(Error::invalid_argument("the root path cannot be a file"));
        }
        let parent = path.parent()?;

        let binding = {
            let namespace = self.namespace.lock().await;
            if !namespace.directories.contains(&parent) {
                return Err(Error::not_found(format!("{} is not a directory", parent)));
            }
            if namespace.directories.contains(path) || namespace.files.contains_key(path) {
                return Ok(false);
            }
            namespace
                .servers
                .keys()
                .choose(&mut rand::thread_rng())
                .cloned()
                .ok_or_else(|| Error::illegal_state("no storage servers are registered"))?
        };

        binding.command.create(path).await?;

        let mut namespace = self.namespace.lock().await;
        if namespace.directories.contains(path) || namespace.files.contains_key(path) {
            // Lost a race with a concurrent creation of the same path; the remote file now
            // exists twice on different servers but the namespace only tracks the winner.
            return Ok(false);
        }
        namespace.ensure_ancestors(path)?;
        namespace.files.insert(path.clone(), binding.clone());
        namespace
            .servers
            .get_mut(&binding)
            .expect("binding is registered")
            .insert(path.clone());
        Ok(true)
    }

    /// Deletes a file, or a directory and everything beneath it. Namespace-side removal is
    /// performed before the remote storage calls; a storage failure is surfaced to the caller
    /// but does not roll back removal already committed to the namespace.
    pub async fn delete(&self, path: &Path) -> Result<bool> {
        if path.is_root() {
            return Err(Error::invalid_argument("the root path cannot be deleted"));
        }

        let mut namespace = self.namespace.lock().await;
        let is_dir = namespace.directories.contains(path);
        let is_file = namespace.files.contains_key(path);
        if !is_dir && !is_file {
            return Err(Error::not_found(format!("{} is not registered", path)));
        }

        if is_file {
            let binding = namespace.files.remove(path).expect("checked above");
            if let Some(owned) = namespace.servers.get_mut(&binding) {
                owned.remove(path);
            }
            drop(namespace);
            binding.command.delete(path).await?;
            return Ok(true);
        }

        let affected_dirs: Vec<Path> = namespace
            .directories
            .iter()
            .filter(|d| d.is_subpath(path))
            .cloned()
            .collect();
        let affected_files: Vec<(Path, Binding)> = namespace
            .files
            .iter()
            .filter(|(f, _)| f.is_subpath(path))
            .map(|(f, b)| (f.clone(), b.clone()))
            .collect();

        for dir in &affected_dirs {
            namespace.directories.remove(dir);
        }
        for (file, binding) in &affected_files {
            namespace.files.remove(file);
            if let Some(owned) = namespace.servers.get_mut(binding) {
                owned.remove(file);
            }
        }
        drop(namespace);

        let mut first_error = None;
        for (file, binding) in affected_files {
            if let Err(e) = binding.command.delete(&file).await {
                warn!("failed to delete {} from {}: {}", file, binding.storage.address(), e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }
}

impl Default for NamingCore {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-side dispatch table for the `Registration` interface.
pub struct RegistrationDispatch {
    core: Arc<NamingCore>,
    descriptors: Vec<MethodDescriptor>,
}

impl RegistrationDispatch {
    pub fn new(core: Arc<NamingCore>) -> Self {
        Self {
            core,
            descriptors: vec![descriptors::register()],
        }
    }
}

impl Dispatch for RegistrationDispatch {
    fn descriptors(&self) -> &[MethodDescriptor] {
        &self.descriptors
    }

    fn dispatch<'a>(&'a self, descriptor: &'a MethodDescriptor, arguments: Vec<Value>) -> DispatchFuture<'a> {
        Box::pin(async move {
            let mut it = arguments.into_iter();
            match descriptor.name.as_str() {
                "register" => {
                    let storage: StorageStub = next_arg(&mut it)?;
                    let command: CommandStub = next_arg(&mut it)?;
                    let paths: Vec<Path> = next_arg(&mut it)?;
                    encode_arg(&self.core.register(storage, command, paths).await?)
                }
                other => Err(Error::rmi(format!("no such method: {}", other))),
            }
        })
    }
}

/// Server-side dispatch table for the `Service` interface.
pub struct ServiceDispatch {
    core: Arc<NamingCore>,
    descriptors: Vec<MethodDescriptor>,
}

impl ServiceDispatch {
    pub fn new(core: Arc<NamingCore>) -> Self {
        Self {
            core,
            descriptors: vec![
                descriptors::is_directory(),
                descriptors::list(),
                descriptors::create_file(),
                descriptors::create_directory(),
                descriptors::delete(),
                descriptors::get_storage(),
            ],
        }
    }
}

impl Dispatch for ServiceDispatch {
    fn descriptors(&self) -> &[MethodDescriptor] {
        &self.descriptors
    }

    fn dispatch<'a>(&'a self, descriptor: &'a MethodDescriptor, arguments: Vec<Value>) -> DispatchFuture<'a> {
        Box::pin(async move {
            let mut it = arguments.into_iter();
            match descriptor.name.as_str() {
                "is_directory" => {
                    let path: Path = next_arg(&mut it)?;
                    encode_arg(&self.core.is_directory(&path).await?)
                }
                "list" => {
                    let path: Path = next_arg(&mut it)?;
                    encode_arg(&self.core.list(&path).await?)
                }
                "create_file" => {
                    let path: Path = next_arg(&mut it)?;
                    encode_arg(&self.core.create_file(&path).await?)
                }
                "create_directory" => {
                    let path: Path = next_arg(&mut it)?;
                    encode_arg(&self.core.create_directory(&path).await?)
                }
                "delete" => {
                    let path: Path = next_arg(&mut it)?;
                    encode_arg(&self.core.delete(&path).await?)
                }
                "get_storage" => {
                    let path: Path = next_arg(&mut it)?;
                    encode_arg(&self.core.get_storage(&path).await?)
                }
                other => Err(Error::rmi(format!("no such method: {}", other))),
            }
        })
    }
}

/// Client-side typed façade for the `Registration` interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationStub(Stub);

impl RegistrationStub {
    pub fn new(address: SocketAddr) -> Self {
        Self(Stub::new("Registration", address))
    }

    pub async fn bound_to_skeleton(skeleton: &Skeleton<RegistrationDispatch>) -> Result<Self> {
        Ok(Self(Stub::bound_to_skeleton("Registration", skeleton).await?))
    }

    pub fn address(&self) -> SocketAddr {
        self.0.address()
    }

    pub async fn register(&self, storage: StorageStub, command: CommandStub, paths: Vec<Path>) -> Result<Vec<Path>> {
        self.0
            .call(
                &descriptors::register(),
                vec![encode_arg(&storage)?, encode_arg(&command)?, encode_arg(&paths)?],
            )
            .await
    }
}

/// Client-side typed façade for the `Service` interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceStub(Stub);

impl ServiceStub {
    pub fn new(address: SocketAddr) -> Self {
        Self(Stub::new("Service", address))
    }

    pub async fn bound_to_skeleton(skeleton: &Skeleton<ServiceDispatch>) -> Result<Self> {
        Ok(Self(Stub::bound_to_skeleton("Service", skeleton).await?))
    }

    pub fn address(&self) -> SocketAddr {
        self.0.address()
    }

    pub async fn is_directory(&self, path: &Path) -> Result<bool> {
        self.0.call(&descriptors::is_directory(), vec![encode_arg(path)?]).await
    }

    pub async fn list(&self, path: &Path) -> Result<Vec<String>> {
        self.0.call(&descriptors::list(), vec![encode_arg(path)?]).await
    }

    pub async fn create_file(&self, path: &Path) -> Result<bool> {
        self.0.call(&descriptors::create_file(), vec![encode_arg(path)?]).await
    }

    pub async fn create_directory(&self, path: &Path) -> Result<bool> {
        self.0
            .call(&descriptors::create_directory(), vec![encode_arg(path)?])
            .await
    }

    pub async fn delete(&self, path: &Path) -> Result<bool> {
        self.0.call(&descriptors::delete(), vec![encode_arg(path)?]).await
    }

    pub async fn get_storage(&self, path: &Path) -> Result<StorageStub> {
        self.0.call(&descriptors::get_storage(), vec![encode_arg(path)?]).await
    }
}

/// Owns both skeletons that expose one [`NamingCore`]; starts and stops them together and runs
/// the `stopped(cause)` hook once both have fully shut down.
pub struct NamingServer {
    registration_skeleton: Arc<Skeleton<RegistrationDispatch>>,
    service_skeleton: Arc<Skeleton<ServiceDispatch>>,
    started: Mutex<bool>,
    stopped_hook: Mutex<Arc<dyn Fn(Option<&Error>) + Send + Sync>>,
}

impl NamingServer {
    /// Binds to the well-known registration and service ports on every interface.
    pub fn with_default_ports() -> Result<Self> {
        Self::new(
            SocketAddr::from(([0, 0, 0, 0], crate::config::REGISTRATION_PORT)),
            SocketAddr::from(([0, 0, 0, 0], crate::config::SERVICE_PORT)),
        )
    }

    pub fn new(registration_addr: SocketAddr, service_addr: SocketAddr) -> Result<Self> {
        let core = Arc::new(NamingCore::new());
        let registration_skeleton =
            Skeleton::with_bind_addr(RegistrationDispatch::new(Arc::clone(&core)), Some(registration_addr))?;
        let service_skeleton = Skeleton::with_bind_addr(ServiceDispatch::new(core), Some(service_addr))?;
        Ok(Self {
            registration_skeleton,
            service_skeleton,
            started: Mutex::new(false),
            stopped_hook: Mutex::new(Arc::new(|cause| match cause {
                Some(e) => error!("naming core stopped abnormally: {}", e),
                None => info!("naming core stopped"),
            })),
        })
    }

    pub async fn set_stopped_hook(&self, hook: Arc<dyn Fn(Option<&Error>) + Send + Sync>) {
        *self.stopped_hook.lock().await = hook;
    }

    pub fn registration_skeleton(&self) -> &Arc<Skeleton<RegistrationDispatch>> {
        &self.registration_skeleton
    }

    pub fn service_skeleton(&self) -> &Arc<Skeleton<ServiceDispatch>> {
        &self.service_skeleton
    }

    /// Starts both skeletons. The naming core may be started at most once, independent of the
    /// underlying skeletons' own lifecycle guards.
    pub async fn start(&self) -> Result<()> {
        let mut started = self.started.lock().await;
        if *started {
            return Err(Error::illegal_state("the naming core may be started at most once"));
        }
        self.registration_skeleton.start().await?;
        self.service_skeleton.start().await?;
        *started = true;
        Ok(())
    }

    /// Stops both skeletons and invokes the `stopped` hook with `cause`.
    pub async fn stop(&self, cause: Option<Error>) {
        self.registration_skeleton.stop().await;
        self.service_skeleton.stop().await;
        (self.stopped_hook.lock().await)(cause.as_ref());
    }
}
