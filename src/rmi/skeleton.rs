use crate::error::{Error, Result};
use crate::net::{TransportReader, TransportWriter};
use crate::rmi::descriptor::MethodDescriptor;
use crate::rmi::dispatch::{Dispatch, Invocation, Outcome};
use log::*;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Callback invoked when a skeleton observes `listen_error` or `service_error`. Overridable by
/// the host; the default hooks only log.
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// `{Created -> Running -> Stopped}`. `Stopped` is terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkeletonState {
    Created,
    Running,
    Stopped,
}

fn default_listen_error_hook() -> ErrorHook {
    Arc::new(|e| error!("skeleton listener failed: {}", e))
}

fn default_service_error_hook() -> ErrorHook {
    Arc::new(|e| warn!("skeleton worker protocol failure: {}", e))
}

/// Server side of the RMI fabric: accepts TCP connections for one remote interface and, per
/// connection, unmarshals an invocation, dispatches it to `implementation`, and marshals the
/// result or raised failure back.
///
/// Always held behind an `Arc` since the acceptor and every worker task share it.
pub struct Skeleton<D: Dispatch + 'static> {
    implementation: Arc<D>,
    bind_addr: Mutex<Option<SocketAddr>>,
    state: Mutex<SkeletonState>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    listen_error_hook: Mutex<ErrorHook>,
    service_error_hook: Mutex<ErrorHook>,
}

impl<D: Dispatch + 'static> Skeleton<D> {
    /// Builds a skeleton with no preassigned address; `start()` lets the OS pick a port.
    ///
    /// Fails with `InvalidArgument` unless every method `implementation` answers for declares
    /// the RMI failure kind (i.e. unless `implementation` is a remote interface).
    pub fn new(implementation: D) -> Result<Arc<Self>> {
        Self::with_bind_addr(implementation, None)
    }

    /// Builds a skeleton that will bind to `bind_addr` when started.
    pub fn with_bind_addr(implementation: D, bind_addr: Option<SocketAddr>) -> Result<Arc<Self>> {
        if !implementation
            .descriptors()
            .iter()
            .all(MethodDescriptor::is_remote_method)
        {
            return Err(Error::invalid_argument(
                "every method of a remote interface must declare the Rmi failure kind",
            ));
        }

        Ok(Arc::new(Self {
            implementation: Arc::new(implementation),
            bind_addr: Mutex::new(bind_addr),
            state: Mutex::new(SkeletonState::Created),
            accept_handle: Mutex::new(None),
            listen_error_hook: Mutex::new(default_listen_error_hook()),
            service_error_hook: Mutex::new(default_service_error_hook()),
        }))
    }

    /// Overrides the `listen_error` hook. Must be called before `start()`.
    pub async fn set_listen_error_hook(&self, hook: ErrorHook) {
        *self.listen_error_hook.lock().await = hook;
    }

    /// Overrides the `service_error` hook. Must be called before `start()`.
    pub async fn set_service_error_hook(&self, hook: ErrorHook) {
        *self.service_error_hook.lock().await = hook;
    }

    /// The address this skeleton is bound (or preassigned) to, if any.
    pub async fn address(&self) -> Option<SocketAddr> {
        *self.bind_addr.lock().await
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SkeletonState {
        *self.state.lock().await
    }

    /// Binds the listener (assigning a concrete port if none was given) and spawns the acceptor
    /// task. Idempotent while already `Running`; fails with `IllegalState` if previously
    /// `Stopped`.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            SkeletonState::Stopped => {
                return Err(Error::illegal_state(
                    "skeleton has been stopped and cannot be restarted",
                ))
            }
            SkeletonState::Running => return Ok(()),
            SkeletonState::Created => {}
        }

        let requested = *self.bind_addr.lock().await;
        let bind_addr = requested.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        debug!("skeleton bound to {}", local_addr);

        *self.bind_addr.lock().await = Some(local_addr);
        *state = SkeletonState::Running;
        drop(state);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.accept_loop(listener).await });
        *self.accept_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Marks the skeleton stopped and aborts the acceptor task (the moral equivalent of
    /// dropping its listener), then waits for it to fully exit.
    pub async fn stop(&self) {
        let was_running = {
            let mut state = self.state.lock().await;
            let was_running = *state == SkeletonState::Running;
            *state = SkeletonState::Stopped;
            was_running
        };

        if was_running {
            if let Some(handle) = self.accept_handle.lock().await.take() {
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, peer)) => {
                    trace!("skeleton accepted connection from {}", peer);
                    let this = Arc::clone(&self);
                    tokio::spawn(async move { this.handle_connection(socket).await });
                }
                Err(e) => {
                    let mut state = self.state.lock().await;
                    if *state == SkeletonState::Stopped {
                        // Expected: stop() tore down the acceptor out from under us.
                        break;
                    }
                    *state = SkeletonState::Stopped;
                    drop(state);
                    (self.listen_error_hook.lock().await)(&Error::from(e));
                    break;
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, socket: TcpStream) {
        // Write half opened before read half: the receiver of the first frame must be able to
        // make progress on writing its own header without waiting on us to read first.
        let (read_half, write_half) = socket.into_split();
        let mut writer = TransportWriter::new(write_half);
        let mut reader = TransportReader::new(read_half);

        let invocation: Invocation = match reader.receive().await {
            Ok(Some(inv)) => inv,
            Ok(None) => return,
            Err(e) => {
                (self.service_error_hook.lock().await)(&e);
                return;
            }
        };

        trace!("skeleton dispatching {}", invocation.descriptor.name);
        let outcome = match self
            .implementation
            .dispatch(&invocation.descriptor, invocation.arguments)
            .await
        {
            Ok(value) => Outcome::Ok(value),
            Err(e) => Outcome::Raised(e),
        };

        if let Err(e) = writer.send(&outcome).await {
            (self.service_error_hook.lock().await)(&e);
        }
    }
}
