use std::fmt::{self, Display};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Resource type of the account endpoints.
pub const ACCOUNTS: &str = "accounts";

/// Canonical permission identifier, `rn:<namespace>:<resource-type>[:<resource-id>]`.
///
/// A permission without the trailing id names the whole collection (used for
/// `create`); with an id it names a single resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Permission(String);

impl Permission {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The actions a permission can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Get,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Get => "get",
            Action::Delete => "delete",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds permission strings for one namespace. This is the only place where
/// permission strings are formatted.
#[derive(Debug, Clone)]
pub struct PermissionNamer {
    namespace: String,
}

impl PermissionNamer {
    const PREFIX: &'static str = "rn";

    /// Creates a namer for one namespace.
    ///
    /// # Arguments
    ///
    /// * `namespace` - Second segment of every permission, e.g. `hydra`
    ///
    /// # Returns
    ///
    /// An error if the namespace is empty or contains `:` or whitespace.
    pub fn new(namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        if namespace.is_empty() {
            bail!("permission namespace cannot be empty");
        }
        if namespace.contains(':') || namespace.chars().any(char::is_whitespace) {
            bail!("permission namespace '{namespace}' must not contain ':' or whitespace");
        }
        Ok(Self { namespace })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Builds the permission for a resource type, or for one instance of it
    /// when `id` is given. Identical inputs always give identical strings.
    ///
    /// # Arguments
    ///
    /// * `resource_type` - The resource type, e.g. [`ACCOUNTS`]
    /// * `id` - The resource id, `None` for the whole collection
    pub fn name(&self, resource_type: &str, id: Option<&str>) -> Permission {
        let mut name = format!("{}:{}:{}", Self::PREFIX, self.namespace, resource_type);
        if let Some(id) = id {
            name.push(':');
            name.push_str(id);
        }
        Permission(name)
    }

    /// `rn:<namespace>:<resource_type>`
    pub fn collection(&self, resource_type: &str) -> Permission {
        self.name(resource_type, None)
    }

    /// `rn:<namespace>:<resource_type>:<id>`
    pub fn instance(&self, resource_type: &str, id: &str) -> Permission {
        self.name(resource_type, Some(id))
    }
}
