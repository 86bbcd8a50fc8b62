//! Named arena of tunnel objects.
//!
//! Objects are owned by the store; packets only hold `Arc` clones of the
//! object's metadata, so removing an object never invalidates a packet that
//! was already tagged by it.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::{TunnelError, TunnelResult};
use crate::object::TunnelObject;

/// Tunnel objects keyed by the name of the rule set entry that owns them.
///
/// Lookups never create entries; creation only happens through
/// [`TunnelObjectStore::insert`].
#[derive(Debug, Default)]
pub struct TunnelObjectStore {
    objects: HashMap<String, TunnelObject>,
}

impl TunnelObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Adds a new object.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::InvalidConfig`] if `name` is already in use.
    pub fn insert(&mut self, name: impl Into<String>, object: TunnelObject) -> TunnelResult<()> {
        let name = name.into();
        if self.objects.contains_key(&name) {
            return Err(TunnelError::invalid_config(
                "name",
                format!("tunnel object {name} already exists"),
            ));
        }

        info!(name = %name, id = %object.info().key().id, "Added tunnel object");
        self.objects.insert(name, object);
        Ok(())
    }

    /// Decodes `buf` and adds the resulting object under `name`.
    pub fn create(&mut self, name: impl Into<String>, buf: &[u8]) -> TunnelResult<&TunnelObject> {
        let name = name.into();
        if self.objects.contains_key(&name) {
            return Err(TunnelError::invalid_config(
                "name",
                format!("tunnel object {name} already exists"),
            ));
        }

        let object = TunnelObject::from_attrs(buf).inspect_err(|e| {
            debug!(name = %name, error = %e, "Rejected tunnel object");
        })?;
        info!(name = %name, id = %object.info().key().id, "Created tunnel object");
        Ok(self.objects.entry(name).or_insert(object))
    }

    pub fn get(&self, name: &str) -> Option<&TunnelObject> {
        self.objects.get(name)
    }

    /// Removes and returns the object registered under `name`.
    pub fn remove(&mut self, name: &str) -> Option<TunnelObject> {
        let removed = self.objects.remove(name);
        if let Some(object) = &removed {
            // Packets tagged earlier still hold references.
            debug!(
                name,
                outstanding = object.ref_count() - 1,
                "Removed tunnel object"
            );
        }
        removed
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}
