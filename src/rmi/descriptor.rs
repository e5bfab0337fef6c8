use serde::{Deserialize, Serialize};

/// The wire identity of one remote method: never a language-native function pointer.
///
/// Two descriptors are equal iff all four fields are equal as sequences of strings (order
/// matters for `parameter_type_names` and `failure_type_names`). In a language without
/// reflective method handles, each remote interface's descriptors are written by hand, once,
/// next to the trait they describe, and collected into that interface's dispatch table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub return_type_name: String,
    pub parameter_type_names: Vec<String>,
    pub failure_type_names: Vec<String>,
}

/// Failure-type tag every remote method must declare to qualify as part of a "remote
/// interface" - the type-name analogue of Java RMI's `RemoteException`.
pub const RMI_FAILURE_TYPE_NAME: &str = "Rmi";

impl MethodDescriptor {
    pub fn new(
        name: impl Into<String>,
        return_type_name: impl Into<String>,
        parameter_type_names: impl IntoIterator<Item = impl Into<String>>,
        failure_type_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            return_type_name: return_type_name.into(),
            parameter_type_names: parameter_type_names.into_iter().map(Into::into).collect(),
            failure_type_names: failure_type_names.into_iter().map(Into::into).collect(),
        }
    }

    /// `true` iff this method declares the RMI failure kind, making it eligible to appear in a
    /// remote interface.
    pub fn is_remote_method(&self) -> bool {
        self.failure_type_names
            .iter()
            .any(|name| name == RMI_FAILURE_TYPE_NAME)
    }
}

/// Looks up the first table entry whose descriptor equals `descriptor`.
pub fn find_in<'a, T>(table: &'a [(MethodDescriptor, T)], descriptor: &MethodDescriptor) -> Option<&'a T> {
    table
        .iter()
        .find(|(d, _)| d == descriptor)
        .map(|(_, entry)| entry)
}
