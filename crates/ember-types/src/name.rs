//! Scope identity.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Name of a scope.
///
/// Scope names are the registry key and the unit recorded in call stacks, so
/// they are cloned on every cross-scope call. The name is stored as an
/// `Arc<str>`: cloning is a reference-count bump.
///
/// # Example
///
/// ```
/// use ember_types::ScopeName;
/// use std::collections::HashMap;
///
/// let mut owners: HashMap<ScopeName, u32> = HashMap::new();
/// owners.insert(ScopeName::new("device"), 7);
///
/// // Lookups work with plain string slices.
/// assert_eq!(owners.get("device"), Some(&7));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ScopeName(Arc<str>);

impl ScopeName {
    /// Creates a scope name.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ScopeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Borrow<str> for ScopeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ScopeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ScopeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ScopeName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&ScopeName> for ScopeName {
    fn from(name: &ScopeName) -> Self {
        name.clone()
    }
}

impl From<ScopeName> for String {
    fn from(name: ScopeName) -> Self {
        name.0.to_string()
    }
}

impl PartialEq<str> for ScopeName {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ScopeName {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}
