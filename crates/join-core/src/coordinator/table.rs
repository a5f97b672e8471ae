use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::delegate::JoinDelegate;
use crate::errors::{JoinError, Result};
use crate::types::{JoinId, LegId};

#[derive(Default)]
struct TableInner {
    by_leg: HashMap<LegId, JoinId>,
    delegates: HashMap<JoinId, Arc<JoinDelegate>>,
}

/// Routing table from engaged legs to the join that owns them.
///
/// A leg is owned by at most one join. Claims for all participants of a
/// join are checked and written under one lock, so a rejected claim leaves
/// the table untouched.
#[derive(Default)]
pub struct JoinTable {
    inner: Mutex<TableInner>,
}

impl JoinTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `delegate` as the owner of all its participants
    pub fn claim(&self, delegate: Arc<JoinDelegate>) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(busy) = delegate
            .participants()
            .iter()
            .find(|leg| inner.by_leg.contains_key(*leg))
        {
            return Err(JoinError::LegBusy(busy.clone()));
        }

        let id = delegate.id();
        for leg in delegate.participants() {
            inner.by_leg.insert(leg.clone(), id);
        }
        inner.delegates.insert(id, delegate);
        debug!("Join {} claimed its legs", id);
        Ok(())
    }

    /// Drop the join and free its legs
    pub fn release(&self, id: JoinId) -> Option<Arc<JoinDelegate>> {
        let mut inner = self.inner.lock();
        let delegate = inner.delegates.remove(&id)?;
        inner.by_leg.retain(|_, owner| *owner != id);
        debug!("Join {} released its legs", id);
        Some(delegate)
    }

    pub fn owner(&self, leg: &LegId) -> Option<Arc<JoinDelegate>> {
        let inner = self.inner.lock();
        let id = inner.by_leg.get(leg)?;
        inner.delegates.get(id).cloned()
    }

    pub fn owner_id(&self, leg: &LegId) -> Option<JoinId> {
        self.inner.lock().by_leg.get(leg).copied()
    }

    pub fn get(&self, id: JoinId) -> Option<Arc<JoinDelegate>> {
        self.inner.lock().delegates.get(&id).cloned()
    }

    /// Number of joins in flight
    pub fn len(&self) -> usize {
        self.inner.lock().delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().delegates.is_empty()
    }
}

impl std::fmt::Debug for JoinTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("JoinTable")
            .field("legs", &inner.by_leg)
            .field("joins", &inner.delegates.len())
            .finish()
    }
}
