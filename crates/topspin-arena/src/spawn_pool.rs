//! The spawn point pool.
//!
//! Owned by the authority. Each configured point is either available or
//! allocated to exactly one participant:
//!
//! ```text
//!   available ──allocate(p)──→ allocated to p ──release(p)──→ available
//! ```
//!
//! A participant holds at most one point. Allocating again for a
//! participant that already holds one returns the same point.

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use topspin_protocol::ParticipantId;
use tracing::{debug, warn};

use crate::{AllocationPolicy, ArenaError, SpawnConfig, SpawnPoint};

/// A spawn point handed to a participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    /// Index into the configured point list.
    pub index: usize,
    pub point: SpawnPoint,
}

/// Tracks which spawn points are free.
pub struct SpawnPointPool {
    points: Vec<SpawnPoint>,
    policy: AllocationPolicy,
    available: BTreeSet<usize>,
    allocated: HashMap<ParticipantId, usize>,
    /// Round-robin position: the next index to try.
    cursor: usize,
    rng: StdRng,
}

impl SpawnPointPool {
    /// Creates a pool with every configured point available.
    pub fn new(config: &SpawnConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config.spawn_points.clone(), config.allocation_policy, rng)
    }

    /// Creates a pool with an explicit random source.
    pub fn with_rng(points: Vec<SpawnPoint>, policy: AllocationPolicy, rng: StdRng) -> Self {
        let available = (0..points.len()).collect();
        Self {
            points,
            policy,
            available,
            allocated: HashMap::new(),
            cursor: 0,
            rng,
        }
    }

    /// Allocates a point for `participant`.
    ///
    /// Returns the participant's existing point if it already holds one.
    /// If no point is available, availability is recomputed with
    /// [`refill`](Self::refill) and the allocation retried once. `None`
    /// means the pool is genuinely exhausted; the caller should try again
    /// later.
    pub fn allocate(&mut self, participant: ParticipantId) -> Option<Allocation> {
        if let Some(&index) = self.allocated.get(&participant) {
            return Some(self.allocation(index));
        }
        if self.available.is_empty() {
            self.refill();
        }
        let Some(index) = self.pick() else {
            warn!(
                %participant,
                points = self.points.len(),
                "spawn pool exhausted"
            );
            return None;
        };
        self.available.remove(&index);
        self.allocated.insert(participant, index);
        debug!(%participant, index, "spawn point allocated");
        Some(self.allocation(index))
    }

    /// Returns `participant`'s point to the pool. No-op if it holds none.
    pub fn release(&mut self, participant: ParticipantId) -> Option<usize> {
        let index = self.allocated.remove(&participant)?;
        self.available.insert(index);
        debug!(%participant, index, "spawn point released");
        Some(index)
    }

    /// Recomputes availability from the configured points: every point not
    /// currently allocated becomes available.
    pub fn refill(&mut self) {
        let taken: BTreeSet<usize> = self.allocated.values().copied().collect();
        self.available = (0..self.points.len())
            .filter(|index| !taken.contains(index))
            .collect();
    }

    /// Records that `participant` holds point `index`, as observed from a
    /// live entity. Used when a new authority rebuilds the pool.
    ///
    /// # Errors
    /// [`ArenaError::UnknownSpawnPoint`] for an index outside the
    /// configuration, [`ArenaError::SpawnPointTaken`] if another
    /// participant already holds it.
    pub fn assign(&mut self, participant: ParticipantId, index: usize) -> Result<(), ArenaError> {
        if index >= self.points.len() {
            return Err(ArenaError::UnknownSpawnPoint(index));
        }
        if let Some(owner) = self.owner_of(index) {
            if owner != participant {
                return Err(ArenaError::SpawnPointTaken { index, owner });
            }
            return Ok(());
        }
        self.release(participant);
        self.available.remove(&index);
        self.allocated.insert(participant, index);
        Ok(())
    }

    /// Releases everything.
    pub fn reset(&mut self) {
        self.allocated.clear();
        self.refill();
    }

    /// The point held by `participant`.
    pub fn allocated_to(&self, participant: ParticipantId) -> Option<usize> {
        self.allocated.get(&participant).copied()
    }

    /// The participant holding point `index`.
    pub fn owner_of(&self, index: usize) -> Option<ParticipantId> {
        self.allocated
            .iter()
            .find_map(|(&p, &i)| (i == index).then_some(p))
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn capacity(&self) -> usize {
        self.points.len()
    }

    /// The configured point at `index`.
    pub fn point(&self, index: usize) -> Option<SpawnPoint> {
        self.points.get(index).copied()
    }

    fn allocation(&self, index: usize) -> Allocation {
        Allocation {
            index,
            point: self.points[index],
        }
    }

    fn pick(&mut self) -> Option<usize> {
        if self.available.is_empty() {
            return None;
        }
        let index = match self.policy {
            AllocationPolicy::Random => {
                let nth = self.rng.random_range(0..self.available.len());
                self.available.iter().nth(nth).copied()
            }
            AllocationPolicy::RoundRobin => self
                .available
                .range(self.cursor..)
                .next()
                .or_else(|| self.available.iter().next())
                .copied(),
        }?;
        self.cursor = (index + 1) % self.points.len();
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn pool(points: usize, policy: AllocationPolicy) -> SpawnPointPool {
        SpawnPointPool::with_rng(
            SpawnPoint::ring(points, 5.0),
            policy,
            StdRng::seed_from_u64(7),
        )
    }

    fn p(id: u32) -> ParticipantId {
        ParticipantId(id)
    }

    #[test]
    fn test_allocate_same_participant_returns_same_point() {
        let mut pool = pool(4, AllocationPolicy::Random);
        let first = pool.allocate(p(1)).unwrap();
        let second = pool.allocate(p(1)).unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.available_count(), 3);
    }

    #[test]
    fn test_allocate_exhausted_returns_none() {
        let mut pool = pool(2, AllocationPolicy::Random);
        assert!(pool.allocate(p(1)).is_some());
        assert!(pool.allocate(p(2)).is_some());
        assert!(pool.allocate(p(3)).is_none());
    }

    #[test]
    fn test_release_makes_point_available_again() {
        let mut pool = pool(1, AllocationPolicy::Random);
        let a = pool.allocate(p(1)).unwrap();
        assert_eq!(pool.release(p(1)), Some(a.index));
        let b = pool.allocate(p(2)).unwrap();
        assert_eq!(a.index, b.index);
    }

    #[test]
    fn test_release_unknown_participant_is_noop() {
        let mut pool = pool(3, AllocationPolicy::Random);
        assert_eq!(pool.release(p(9)), None);
        assert_eq!(pool.available_count(), 3);
    }

    #[test]
    fn test_round_robin_cycles_through_points() {
        let mut pool = pool(3, AllocationPolicy::RoundRobin);
        let order: Vec<_> = (1..=3).map(|i| pool.allocate(p(i)).unwrap().index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        pool.release(p(1));
        assert_eq!(pool.allocate(p(4)).unwrap().index, 0);
    }

    #[test]
    fn test_allocation_never_shares_points() {
        let mut pool = pool(6, AllocationPolicy::Random);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let who = p(rng.random_range(1..10));
            if rng.random_bool(0.6) {
                pool.allocate(who);
            } else {
                pool.release(who);
            }
            let held: Vec<usize> = (1..10).filter_map(|i| pool.allocated_to(p(i))).collect();
            let unique: HashSet<usize> = held.iter().copied().collect();
            assert_eq!(held.len(), unique.len(), "a spawn point is shared");
            assert_eq!(pool.available_count() + held.len(), pool.capacity());
        }
    }

    #[test]
    fn test_assign_rejects_taken_point() {
        let mut pool = pool(3, AllocationPolicy::RoundRobin);
        pool.assign(p(1), 2).unwrap();
        assert!(matches!(
            pool.assign(p(2), 2),
            Err(ArenaError::SpawnPointTaken { index: 2, .. })
        ));
        assert!(matches!(pool.assign(p(2), 9), Err(ArenaError::UnknownSpawnPoint(9))));
        assert_eq!(pool.owner_of(2), Some(p(1)));
    }

    #[test]
    fn test_assign_moves_participant_to_new_point() {
        let mut pool = pool(3, AllocationPolicy::RoundRobin);
        pool.assign(p(1), 0).unwrap();
        pool.assign(p(1), 1).unwrap();
        assert_eq!(pool.allocated_to(p(1)), Some(1));
        assert_eq!(pool.available_count(), 2);
    }
}
