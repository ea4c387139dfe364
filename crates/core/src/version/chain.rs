use alloc::collections::VecDeque;

use super::{Version, VersionArena, VersionId, VersionStatus};

/// Versions of one key, newest first.
///
/// Writes are ingested in global start order, so prepending keeps the chain
/// sorted by start time descending.
#[derive(Debug, Default, Clone)]
pub struct VersionChain {
    members: VecDeque<VersionId>,
}

impl VersionChain {
    pub fn push_newest(&mut self, id: VersionId) {
        self.members.push_front(id);
    }

    /// Unlinks `id`, returning whether it was present.
    pub fn remove(&mut self, id: VersionId) -> bool {
        if let Some(at) = self.members.iter().position(|member| *member == id) {
            self.members.remove(at);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn ids(&self) -> &VecDeque<VersionId> {
        &self.members
    }

    /// Newest to oldest.
    pub fn iter<'a>(&'a self, arena: &'a VersionArena) -> impl Iterator<Item = &'a Version> + 'a {
        self.members.iter().filter_map(|id| arena.get(*id))
    }

    /// Oldest to newest.
    pub fn iter_oldest<'a>(
        &'a self,
        arena: &'a VersionArena,
    ) -> impl Iterator<Item = &'a Version> + 'a {
        self.members.iter().rev().filter_map(|id| arena.get(*id))
    }

    /// Newest to oldest, committed and initial versions only.
    pub fn committed<'a>(
        &'a self,
        arena: &'a VersionArena,
    ) -> impl Iterator<Item = &'a Version> + 'a {
        self.iter(arena).filter(|version| version.is_committed())
    }

    /// The initial version, which is always the oldest member.
    #[must_use]
    pub fn initial(&self) -> Option<VersionId> {
        self.members.back().copied()
    }

    /// Newest version owned by a given status.
    pub fn newest_with<'a>(
        &'a self,
        arena: &'a VersionArena,
        status: VersionStatus,
    ) -> Option<&'a Version> {
        self.iter(arena).find(|version| version.status == status)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
