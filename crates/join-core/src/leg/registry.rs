use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

use super::CallLeg;
use crate::errors::{JoinError, Result};
use crate::types::{CallState, Direction, JoinType, LegId, PeerLink, PeerRef};

/// Registry of call legs and the links between them.
///
/// Links are kept as an index (leg -> peers) rather than as references
/// between legs. A link between two legs is always written or removed on
/// both sides under one lock. Lock order is `legs` then `links`.
#[derive(Debug, Default)]
pub struct LegRegistry {
    legs: RwLock<HashMap<LegId, CallLeg>>,
    links: RwLock<HashMap<LegId, Vec<PeerLink>>>,
}

impl LegRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, leg: CallLeg) -> Result<LegId> {
        let mut legs = self.legs.write();
        if legs.contains_key(&leg.id) {
            return Err(JoinError::invariant(format!("Leg {} is already registered", leg.id)));
        }
        let id = leg.id.clone();
        debug!("Registered {:?} leg {} toward {}", leg.direction, id, leg.remote_target);
        legs.insert(id.clone(), leg);
        Ok(id)
    }

    /// Remove a leg. Refused while the leg still has links.
    pub fn remove(&self, id: &LegId) -> Result<CallLeg> {
        let mut legs = self.legs.write();
        let links = self.links.read();
        if links.get(id).map_or(false, |l| !l.is_empty()) {
            return Err(JoinError::invariant(format!("Leg {} is still linked", id)));
        }
        let leg = legs.remove(id).ok_or_else(|| JoinError::LegNotFound(id.clone()))?;
        debug!("Removed leg {}", id);
        Ok(leg)
    }

    pub fn contains(&self, id: &LegId) -> bool {
        self.legs.read().contains_key(id)
    }

    /// Snapshot of a leg
    pub fn get(&self, id: &LegId) -> Option<CallLeg> {
        self.legs.read().get(id).cloned()
    }

    pub fn state(&self, id: &LegId) -> Result<CallState> {
        self.with_leg(id, |leg| leg.state())
    }

    pub fn with_leg<F, R>(&self, id: &LegId, f: F) -> Result<R>
    where
        F: FnOnce(&CallLeg) -> R,
    {
        let legs = self.legs.read();
        legs.get(id).map(f).ok_or_else(|| JoinError::LegNotFound(id.clone()))
    }

    pub fn with_leg_mut<F, R>(&self, id: &LegId, f: F) -> Result<R>
    where
        F: FnOnce(&mut CallLeg) -> Result<R>,
    {
        let mut legs = self.legs.write();
        match legs.get_mut(id) {
            Some(leg) => f(leg),
            None => Err(JoinError::LegNotFound(id.clone())),
        }
    }

    pub fn set_call_state(&self, id: &LegId, state: CallState) -> Result<CallState> {
        self.with_leg_mut(id, |leg| leg.set_call_state(state))
    }

    /// Force the leg to FAILED and tear down its links. Idempotent.
    /// Returns the links that were removed.
    pub fn fail(&self, id: &LegId) -> Result<Vec<PeerLink>> {
        let mut legs = self.legs.write();
        let leg = legs.get_mut(id).ok_or_else(|| JoinError::LegNotFound(id.clone()))?;
        leg.fail();
        let mut links = self.links.write();
        Ok(Self::unlink_all_locked(&mut links, id))
    }

    /// Mark the leg DISCONNECTED and tear down its links
    pub fn disconnect(&self, id: &LegId) -> Result<Vec<PeerLink>> {
        let mut legs = self.legs.write();
        let leg = legs.get_mut(id).ok_or_else(|| JoinError::LegNotFound(id.clone()))?;
        leg.disconnect();
        let mut links = self.links.write();
        Ok(Self::unlink_all_locked(&mut links, id))
    }

    /// Record a link on both legs, or on neither
    pub fn link_peer(
        &self,
        a: &LegId,
        b: &LegId,
        join_type: JoinType,
        direction: Direction,
    ) -> Result<()> {
        if a == b {
            return Err(JoinError::invariant(format!("Cannot link leg {} to itself", a)));
        }
        let legs = self.legs.read();
        for id in [a, b] {
            let leg = legs.get(id).ok_or_else(|| JoinError::LegNotFound(id.clone()))?;
            if leg.state().is_terminal() {
                return Err(JoinError::invariant(format!(
                    "Cannot link leg {} in state {}",
                    id,
                    leg.state()
                )));
            }
        }

        let mut links = self.links.write();
        upsert(
            links.entry(a.clone()).or_default(),
            PeerLink {
                peer: PeerRef::Leg(b.clone()),
                join_type,
                direction,
            },
        );
        upsert(
            links.entry(b.clone()).or_default(),
            PeerLink {
                peer: PeerRef::Leg(a.clone()),
                join_type,
                direction: direction.reverse(),
            },
        );
        info!("Linked {} <-> {} ({:?}, {:?})", a, b, join_type, direction);
        Ok(())
    }

    /// Record that `id` is bridged through the media resource
    pub fn link_media(&self, id: &LegId, direction: Direction) -> Result<()> {
        let legs = self.legs.read();
        let leg = legs.get(id).ok_or_else(|| JoinError::LegNotFound(id.clone()))?;
        if leg.state().is_terminal() {
            return Err(JoinError::invariant(format!(
                "Cannot bridge leg {} in state {}",
                id,
                leg.state()
            )));
        }
        let mut links = self.links.write();
        upsert(
            links.entry(id.clone()).or_default(),
            PeerLink {
                peer: PeerRef::MediaResource,
                join_type: JoinType::Bridge,
                direction,
            },
        );
        info!("Linked {} <-> media resource ({:?})", id, direction);
        Ok(())
    }

    /// Remove one link (both sides for a leg peer)
    pub fn unlink(&self, id: &LegId, peer: &PeerRef) -> Option<PeerLink> {
        let mut links = self.links.write();
        let removed = remove_peer(&mut links, id, peer)?;
        if let PeerRef::Leg(other) = peer {
            remove_peer(&mut links, other, &PeerRef::Leg(id.clone()));
        }
        debug!("Unlinked {} from {}", id, peer);
        Some(removed)
    }

    /// Remove every link of `id`, including the mirrored entries on its peers
    pub fn unlink_all(&self, id: &LegId) -> Vec<PeerLink> {
        let mut links = self.links.write();
        Self::unlink_all_locked(&mut links, id)
    }

    fn unlink_all_locked(links: &mut HashMap<LegId, Vec<PeerLink>>, id: &LegId) -> Vec<PeerLink> {
        let removed = links.remove(id).unwrap_or_default();
        for link in &removed {
            if let PeerRef::Leg(other) = &link.peer {
                remove_peer(links, other, &PeerRef::Leg(id.clone()));
            }
        }
        removed
    }

    pub fn peers(&self, id: &LegId) -> Vec<PeerLink> {
        self.links.read().get(id).cloned().unwrap_or_default()
    }

    pub fn is_linked_to(&self, id: &LegId, peer: &PeerRef) -> bool {
        self.links
            .read()
            .get(id)
            .map_or(false, |l| l.iter().any(|link| &link.peer == peer))
    }

    pub fn is_media_bridged(&self, id: &LegId) -> bool {
        self.is_linked_to(id, &PeerRef::MediaResource)
    }

    pub fn len(&self) -> usize {
        self.legs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.read().is_empty()
    }
}

fn upsert(list: &mut Vec<PeerLink>, link: PeerLink) {
    match list.iter_mut().find(|l| l.peer == link.peer) {
        Some(existing) => *existing = link,
        None => list.push(link),
    }
}

fn remove_peer(
    links: &mut HashMap<LegId, Vec<PeerLink>>,
    id: &LegId,
    peer: &PeerRef,
) -> Option<PeerLink> {
    let list = links.get_mut(id)?;
    let pos = list.iter().position(|l| &l.peer == peer)?;
    let removed = list.remove(pos);
    if list.is_empty() {
        links.remove(id);
    }
    Some(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_legs(registry: &LegRegistry) -> (LegId, LegId) {
        let a = registry.insert(CallLeg::outgoing("sip:a@example.com")).unwrap();
        let b = registry.insert(CallLeg::outgoing("sip:b@example.com")).unwrap();
        (a, b)
    }

    #[test]
    fn test_link_is_symmetric() {
        let registry = LegRegistry::new();
        let (a, b) = two_legs(&registry);

        registry.link_peer(&a, &b, JoinType::Direct, Direction::Send).unwrap();

        assert_eq!(
            registry.peers(&a),
            vec![PeerLink {
                peer: PeerRef::Leg(b.clone()),
                join_type: JoinType::Direct,
                direction: Direction::Send,
            }]
        );
        assert_eq!(
            registry.peers(&b),
            vec![PeerLink {
                peer: PeerRef::Leg(a.clone()),
                join_type: JoinType::Direct,
                direction: Direction::Recv,
            }]
        );
    }

    #[test]
    fn test_link_both_or_neither() {
        let registry = LegRegistry::new();
        let (a, b) = two_legs(&registry);
        registry.fail(&b).unwrap();

        assert!(registry.link_peer(&a, &b, JoinType::Direct, Direction::Duplex).is_err());
        assert!(registry.peers(&a).is_empty());
        assert!(registry.peers(&b).is_empty());

        let missing = LegId::new();
        assert!(matches!(
            registry.link_peer(&a, &missing, JoinType::Direct, Direction::Duplex),
            Err(JoinError::LegNotFound(_))
        ));
        assert!(registry.peers(&a).is_empty());
    }

    #[test]
    fn test_fail_tears_down_links() {
        let registry = LegRegistry::new();
        let (a, b) = two_legs(&registry);
        registry.link_peer(&a, &b, JoinType::Direct, Direction::Duplex).unwrap();
        registry.link_media(&a, Direction::Duplex).unwrap();

        let removed = registry.fail(&a).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(registry.state(&a).unwrap(), CallState::Failed);
        assert!(registry.peers(&a).is_empty());
        assert!(registry.peers(&b).is_empty());

        // second call is a no-op
        assert!(registry.fail(&a).unwrap().is_empty());
    }

    #[test]
    fn test_remove_refused_while_linked() {
        let registry = LegRegistry::new();
        let (a, b) = two_legs(&registry);
        registry.link_peer(&a, &b, JoinType::Direct, Direction::Duplex).unwrap();

        assert!(registry.remove(&a).is_err());
        registry.unlink(&a, &PeerRef::Leg(b.clone())).unwrap();
        assert!(registry.peers(&b).is_empty());
        assert!(registry.remove(&a).is_ok());
        assert!(!registry.contains(&a));
    }
}
