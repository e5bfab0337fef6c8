use crate::error::{Error, Result};
use crate::net::{TransportReader, TransportWriter};
use crate::rmi::descriptor::MethodDescriptor;
use crate::rmi::dispatch::{Dispatch, Invocation, Outcome};
use crate::rmi::skeleton::Skeleton;
use serde::{Deserialize, Serialize};
use serde_cbor::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::TcpStream;

/// Client side of the RMI fabric: a typed façade's low-level transport, carrying just enough
/// identity (the target address and the interface it satisfies) to be a serializable,
/// value-equal stand-in for a remote object.
///
/// Every interface-specific stub (`RegistrationStub`, `ServiceStub`, `StorageStub`,
/// `CommandStub`, ...) wraps one `Stub` and exposes the interface's typed methods by routing
/// each one through [`Stub::call`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stub {
    address: SocketAddr,
    interface: String,
}

impl PartialEq for Stub {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.interface == other.interface
    }
}
impl Eq for Stub {}

impl std::hash::Hash for Stub {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
        self.interface.hash(state);
    }
}

impl std::fmt::Display for Stub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.interface, self.address)
    }
}

impl Stub {
    /// Direct-address bootstrap constructor, e.g. for a client of the naming service that
    /// already knows the well-known naming ports.
    pub fn new(interface: impl Into<String>, address: SocketAddr) -> Self {
        Self {
            address,
            interface: interface.into(),
        }
    }

    /// Snapshots `skeleton`'s current address. If that address is a wildcard bind
    /// (`0.0.0.0`/`::`), it is not independently resolvable from another host, so it is
    /// replaced with the configured default advertised host; fails with `UnknownHost` if that
    /// cannot be resolved either. Fails with `IllegalState` if the skeleton has never been
    /// started and has no preassigned address.
    pub async fn bound_to_skeleton<D: Dispatch>(
        interface: impl Into<String>,
        skeleton: &Skeleton<D>,
    ) -> Result<Self> {
        let address = skeleton.address().await.ok_or_else(|| {
            Error::illegal_state("skeleton has not been started and has no preassigned address")
        })?;
        Ok(Self::new(interface, resolve_bound_address(address, None)?))
    }

    /// Like [`Stub::bound_to_skeleton`], but advertises `hostname` instead of the skeleton's own
    /// bound host, inheriting only its port.
    pub async fn bound_to_skeleton_with_hostname<D: Dispatch>(
        interface: impl Into<String>,
        skeleton: &Skeleton<D>,
        hostname: &str,
    ) -> Result<Self> {
        let address = skeleton.address().await.ok_or_else(|| {
            Error::illegal_state("skeleton has not been started and has no preassigned address")
        })?;
        Ok(Self::new(interface, resolve_bound_address(address, Some(hostname))?))
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Opens a fresh TCP connection, sends `(descriptor, arguments)`, and returns the decoded
    /// response or the error it raised. Never pools or multiplexes connections; one call, one
    /// socket.
    pub async fn call<R: serde::de::DeserializeOwned>(
        &self,
        descriptor: &MethodDescriptor,
        arguments: Vec<Value>,
    ) -> Result<R> {
        let socket = TcpStream::connect(self.address).await.map_err(|e| {
            Error::rmi(format!("failed to connect to {}: {}", self.address, e))
        })?;
        let (read_half, write_half) = socket.into_split();
        let mut writer = TransportWriter::new(write_half);
        let mut reader = TransportReader::new(read_half);

        let invocation = Invocation {
            descriptor: descriptor.clone(),
            arguments,
        };
        writer.send(&invocation).await?;

        let outcome: Outcome = reader
            .receive()
            .await?
            .ok_or_else(|| Error::rmi("connection closed before a response was received"))?;

        match outcome {
            Outcome::Ok(value) => crate::rmi::dispatch::decode_value(value),
            Outcome::Raised(e) => Err(e),
        }
    }
}

/// Turns a skeleton's raw bound address into one a remote peer can actually dial. `hostname`
/// overrides the advertised host outright; with no override, a wildcard bind (`0.0.0.0`/`::`)
/// is replaced by the default advertised host and any other address is kept as-is.
fn resolve_bound_address(address: SocketAddr, hostname: Option<&str>) -> Result<SocketAddr> {
    let host_ip = match hostname {
        Some(hostname) => resolve_advertised_host(hostname)?,
        None if address.ip().is_unspecified() => {
            resolve_advertised_host(crate::config::DEFAULT_ADVERTISED_HOST)?
        }
        None => return Ok(address),
    };
    Ok(SocketAddr::new(host_ip, address.port()))
}

/// Resolves the hostname a wildcard-bound skeleton should advertise. This crate deliberately
/// advertises the loopback address rather than attempting `getLocalHost()`-style reverse-DNS
/// discovery (see DESIGN.md); any other hostname is returned as-is if it parses as an IP, or
/// fails with `UnknownHost` otherwise, since resolving arbitrary DNS names is out of scope.
fn resolve_advertised_host(hostname: &str) -> Result<IpAddr> {
    if hostname.is_empty() || hostname == "0.0.0.0" || hostname == "::" {
        return crate::config::DEFAULT_ADVERTISED_HOST
            .parse()
            .map_err(|_| Error::unknown_host("default advertised host does not parse as an IP"));
    }
    hostname
        .parse::<IpAddr>()
        .map_err(|_| Error::unknown_host(format!("cannot resolve advertised host: {}", hostname)))
}
