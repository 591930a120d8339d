mod launchable;
mod system;
mod window;

pub use launchable::LaunchableIndex;
pub use system::SysinfoSampler;
pub use window::X11Windows;

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;

/// Identifies an application by its process/executable name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ApplicationId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ApplicationId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the set of applications currently in the foreground.
///
/// Implementations only report apps that hold user focus and that a user
/// could launch on their own; background processes are filtered out.
pub trait ProcessSampler: Send + 'static {
    fn sample(&mut self) -> Result<HashSet<ApplicationId>>;
}

