//! Generation naming for versioned cache buckets.
//!
//! A generation is a named bucket of cached entries corresponding to one
//! deployed build. Two generations exist per deployment: a static one
//! (bootstrap assets warmed at install) and a dynamic one (resources
//! picked up at runtime). The names are derived from configuration at
//! construction time so tests can run several versions side by side.

/// The two current generation names for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generations {
    pub static_name: String,
    pub dynamic_name: String,
}

impl Generations {
    /// Derive the generation names for a (prefix, version) pair.
    ///
    /// The naming scheme is `{prefix}-static-{version}` and
    /// `{prefix}-dynamic-{version}`.
    pub fn new(prefix: &str, version: &str) -> Self {
        Self {
            static_name: format!("{prefix}-static-{version}"),
            dynamic_name: format!("{prefix}-dynamic-{version}"),
        }
    }

    /// Whether a stored generation name belongs to this deployment.
    ///
    /// Anything else is stale and gets purged at activation.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }

    /// The two current names, static first (creation order).
    pub fn names(&self) -> [&str; 2] {
        [&self.static_name, &self.dynamic_name]
    }
}
