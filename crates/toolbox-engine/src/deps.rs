//! Abstractions over the host page the engine runs against.

use std::sync::Arc;

use parking_lot::RwLock;

/// Current page location.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    /// Scheme and host, e.g. `https://n.novelia.cc`.
    pub origin: String,
    /// Path component, e.g. `/workspace/gpt`.
    pub path: String,
}

impl Location {
    /// Location from an origin and a path.
    pub fn new(origin: &str, path: &str) -> Self {
        Self {
            origin: origin.to_string(),
            path: path.to_string(),
        }
    }

    /// Host part of the origin, without scheme or port.
    pub fn host(&self) -> &str {
        let rest = self
            .origin
            .split_once("://")
            .map_or(self.origin.as_str(), |(_, r)| r);
        let rest = rest.split('/').next().unwrap_or(rest);
        rest.split(':').next().unwrap_or(rest)
    }
}

/// Answers "where is the page now" on demand.
pub trait LocationProvider: Send + Sync {
    /// The location right now.
    fn current(&self) -> Location;
}

/// A location the host updates as navigation happens.
#[derive(Clone, Default)]
pub struct SharedLocation {
    inner: Arc<RwLock<Location>>,
}

impl SharedLocation {
    /// Start at `location`.
    pub fn new(location: Location) -> Self {
        Self {
            inner: Arc::new(RwLock::new(location)),
        }
    }

    /// Record a navigation to `path` on the same origin.
    pub fn navigate(&self, path: &str) {
        self.inner.write().path = path.to_string();
    }

    /// Replace origin and path.
    pub fn set(&self, location: Location) {
        *self.inner.write() = location;
    }
}

impl LocationProvider for SharedLocation {
    fn current(&self) -> Location {
        self.inner.read().clone()
    }
}
