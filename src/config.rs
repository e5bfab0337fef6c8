//! Well-known ports and tunables shared by the naming core and its clients.

/// Port the naming server binds its registration skeleton to.
pub const REGISTRATION_PORT: u16 = 7999;

/// Port the naming server binds its service skeleton to.
pub const SERVICE_PORT: u16 = 8000;

/// Loopback address advertised by a skeleton bound to a wildcard address when no explicit
/// hostname override is supplied.
///
/// The source system's own revisions disagree between this and a `getLocalHost()`-style
/// reverse-DNS lookup; this crate picks the loopback address deliberately (see DESIGN.md).
pub const DEFAULT_ADVERTISED_HOST: &str = "127.0.0.1";
