use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::error::{BlobError, BlobResult};
use crate::flags::BlobFlags;
use crate::ops::{require_initialized, require_readable, require_writable};
use crate::stream::BlobStream;
use crate::traits::{BlobManager, ManagerKind};

/// Read-only overlay that cascades lookups across borrowed child managers.
///
/// Children are consulted in registration order and the first hit wins.
/// Uninitialized children are skipped. The overlay never owns or deinits its
/// children.
pub struct MultiBlobManager<'a> {
    flags: Option<BlobFlags>,
    managers: Vec<&'a dyn BlobManager>,
}

impl<'a> MultiBlobManager<'a> {
    pub fn new() -> Self {
        Self {
            flags: None,
            managers: Vec::new(),
        }
    }

    /// Initialize the overlay. Writable and create flags are rejected.
    pub fn init(&mut self, flags: BlobFlags) -> BlobResult<()> {
        self.deinit()?;
        if flags.intersects(BlobFlags::WRITABLE | BlobFlags::OPEN_EXISTING_OR_CREATE_NEW)
            || !flags.has_access()
        {
            return Err(BlobError::InvalidFlags(flags));
        }
        self.flags = Some(flags);
        Ok(())
    }

    /// Append a child. Later children have lower priority.
    pub fn add_blob_manager(&mut self, manager: &'a dyn BlobManager) -> BlobResult<()> {
        require_initialized(self)?;
        debug!(kind = %manager.kind(), position = self.managers.len(), "added child manager");
        self.managers.push(manager);
        Ok(())
    }

    /// Remove a child by identity. Returns `false` if it was not registered.
    pub fn remove_blob_manager(&mut self, manager: &dyn BlobManager) -> bool {
        if !self.is_initialized() {
            return false;
        }
        match self
            .managers
            .iter()
            .position(|m| std::ptr::addr_eq(*m, manager))
        {
            Some(index) => {
                self.managers.remove(index);
                true
            }
            None => false,
        }
    }

    /// The children in priority order.
    pub fn blob_managers(&self) -> &[&'a dyn BlobManager] {
        &self.managers
    }

    /// Children that can serve reads, with their registration index.
    fn active(&self) -> impl Iterator<Item = (usize, &'a dyn BlobManager)> + '_ {
        self.managers
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, m)| m.is_initialized() && m.is_readable())
    }
}

impl Default for MultiBlobManager<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobManager for MultiBlobManager<'_> {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Multi
    }

    fn flags(&self) -> BlobFlags {
        self.flags.unwrap_or_default()
    }

    fn is_initialized(&self) -> bool {
        self.flags.is_some()
    }

    fn deinit(&mut self) -> BlobResult<()> {
        self.managers.clear();
        self.flags = None;
        Ok(())
    }

    fn add_buf_using_id(&mut self, _data: &[u8], _id: &str) -> BlobResult<String> {
        require_writable(self, "add")?;
        Err(BlobError::CapabilityDenied {
            op: "add",
            flags: self.flags(),
        })
    }

    fn open(&self, id: &str) -> BlobResult<Option<BlobStream<'_>>> {
        require_readable(self, "open")?;
        for (index, manager) in self.active() {
            match manager.open(id) {
                Ok(Some(stream)) => return Ok(Some(stream.with_origin(index))),
                Ok(None) => {}
                Err(err) => {
                    warn!(id, index, kind = %manager.kind(), %err, "child manager failed opening blob");
                }
            }
        }
        Ok(None)
    }

    fn close(&self, mut stream: BlobStream<'_>) {
        match stream.take_origin().and_then(|i| self.managers.get(i)) {
            Some(manager) => manager.close(stream),
            None => {
                warn!(id = stream.id(), "closing stream with no owning child");
                drop(stream);
            }
        }
    }

    fn does_exist(&self, id: &str) -> bool {
        self.active().any(|(_, m)| m.does_exist(id))
    }

    fn get_size(&self, id: &str) -> u64 {
        self.active()
            .find(|(_, m)| m.does_exist(id))
            .map(|(_, m)| m.get_size(id))
            .unwrap_or(0)
    }

    fn enumerate(&self) -> Vec<String> {
        let ids: BTreeSet<String> = self.active().flat_map(|(_, m)| m.enumerate()).collect();
        ids.into_iter().collect()
    }
}

impl std::fmt::Debug for MultiBlobManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiBlobManager")
            .field("flags", &self.flags())
            .field("children", &self.managers.len())
            .finish()
    }
}
