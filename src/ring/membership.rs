//! Ring membership and repair
//!
//! The coordinator owns a single [`Ring`]: the ordered list of live workers.
//! Insertion order is ring order and the last member wraps to the first.
//! Workers never see this list; they only learn their successor through
//! topology messages.

use super::WorkerId;

/// Outcome of removing a retiree from the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairResult {
    /// The id was not a member (already removed)
    Stale,

    /// Exactly two members existed; the other one is the sole survivor
    Winner(WorkerId),

    /// The retiree was unlinked and the ring still has two or more members
    Rewired {
        /// Member that pointed at the retiree
        predecessor: WorkerId,

        /// Member the predecessor must point at from now on
        successor: WorkerId,

        /// Head of the ring after removal, where the token is re-injected
        head: WorkerId,
    },

    /// The retiree was the only member
    Emptied,
}

/// Ordered, wrapping membership list of live workers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ring {
    members: Vec<WorkerId>,
}

impl Ring {
    /// Create an empty ring
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member at the tail
    ///
    /// Returns `false` and leaves the ring untouched if `id` is already a member.
    pub fn push(&mut self, id: WorkerId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.members.push(id);
        true
    }

    /// Number of live members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the ring has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in ring order
    pub fn members(&self) -> &[WorkerId] {
        &self.members
    }

    /// First member, where the token is injected
    pub fn head(&self) -> Option<WorkerId> {
        self.members.first().copied()
    }

    /// Check if `id` is a live member
    pub fn contains(&self, id: WorkerId) -> bool {
        self.members.contains(&id)
    }

    /// Index of `id` in ring order
    pub fn position(&self, id: WorkerId) -> Option<usize> {
        self.members.iter().position(|&m| m == id)
    }

    /// Member after `id`, wrapping at the tail
    pub fn successor_of(&self, id: WorkerId) -> Option<WorkerId> {
        let index = self.position(id)?;
        Some(self.members[(index + 1) % self.members.len()])
    }

    /// Every `(member, successor)` pair in ring order
    pub fn links(&self) -> impl Iterator<Item = (WorkerId, WorkerId)> + '_ {
        let len = self.members.len();
        self.members
            .iter()
            .enumerate()
            .map(move |(i, &id)| (id, self.members[(i + 1) % len]))
    }

    /// Check that successor links from every member close a single cycle
    pub fn is_well_formed(&self) -> bool {
        let len = self.members.len();
        if len == 0 {
            return false;
        }

        let mut seen = self.members.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != len {
            return false;
        }

        self.members.iter().all(|&start| {
            let mut current = start;
            for _ in 0..len {
                match self.successor_of(current) {
                    Some(next) => current = next,
                    None => return false,
                }
            }
            current == start
        })
    }

    /// Remove `retiree`, preserving the order of the remaining members
    ///
    /// Neighbours are computed before removal. When they coincide the ring
    /// had two members and the remaining one has won.
    pub fn remove(&mut self, retiree: WorkerId) -> RepairResult {
        let Some(index) = self.position(retiree) else {
            return RepairResult::Stale;
        };

        let len = self.members.len();
        if len == 1 {
            self.members.clear();
            return RepairResult::Emptied;
        }

        let predecessor = self.members[(index + len - 1) % len];
        let successor = self.members[(index + 1) % len];
        self.members.remove(index);

        if predecessor == successor {
            return RepairResult::Winner(predecessor);
        }

        RepairResult::Rewired {
            predecessor,
            successor,
            head: self.members[0],
        }
    }
}

impl FromIterator<WorkerId> for Ring {
    fn from_iter<I: IntoIterator<Item = WorkerId>>(iter: I) -> Self {
        let mut ring = Ring::new();
        for id in iter {
            ring.push(id);
        }
        ring
    }
}
