use std::collections::HashMap;

use crate::routing_key::RoutingKey;

struct Node {
    priority: usize,
    prev: Option<RoutingKey>,
    next: Option<RoutingKey>,
}

#[derive(Default)]
struct Level {
    head: Option<RoutingKey>,
    tail: Option<RoutingKey>,
}

/// Orders [`RoutingKey`]s into priority levels `0..=max_priority` with
/// round-robin fairness within a level, via an intrusive doubly-linked
/// list keyed by an arena map rather than storing pointers. Inserting,
/// removing, and re-leveling a key are all O(1), which is what lets
/// `QueueManager::set_priority` avoid re-sorting every queued key when a
/// single routing key's priority changes.
pub struct PriorityScheduler {
    levels: Vec<Level>,
    nodes: HashMap<RoutingKey, Node>,
    /// Per-level round-robin cursor: the key that was scheduled last, so
    /// `next_at` can resume after it on the next call.
    cursors: Vec<Option<RoutingKey>>,
}

impl PriorityScheduler {
    pub fn new(max_priority: usize) -> Self {
        let levels = (0..=max_priority).map(|_| Level::default()).collect();
        let cursors = vec![None; max_priority + 1];
        Self {
            levels,
            nodes: HashMap::new(),
            cursors,
        }
    }

    pub fn max_priority(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn contains(&self, key: RoutingKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Inserts `key` at `priority`, clamped to `max_priority`. No-op if
    /// already present at that exact priority.
    pub fn insert(&mut self, key: RoutingKey, priority: usize) {
        let priority = priority.min(self.max_priority());
        if let Some(existing) = self.nodes.get(&key) {
            if existing.priority == priority {
                return;
            }
        }
        self.remove(key);
        self.push_back(key, priority);
    }

    /// Moves `key` to `new_priority` in O(1): unlink from its current
    /// level's list, relink at the tail of the new level.
    pub fn set_priority(&mut self, key: RoutingKey, new_priority: usize) {
        self.insert(key, new_priority);
    }

    pub fn remove(&mut self, key: RoutingKey) {
        let Some(node) = self.nodes.remove(&key) else {
            return;
        };
        let level = &mut self.levels[node.priority];
        match node.prev {
            Some(prev) => self.nodes.get_mut(&prev).unwrap().next = node.next,
            None => level.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes.get_mut(&next).unwrap().prev = node.prev,
            None => level.tail = node.prev,
        }
        if self.cursors[node.priority] == Some(key) {
            self.cursors[node.priority] = None;
        }
    }

    fn push_back(&mut self, key: RoutingKey, priority: usize) {
        let level = &mut self.levels[priority];
        let old_tail = level.tail;
        let node = Node {
            priority,
            prev: old_tail,
            next: None,
        };
        self.nodes.insert(key, node);
        match old_tail {
            Some(tail) => self.nodes.get_mut(&tail).unwrap().next = Some(key),
            None => level.head = Some(key),
        }
        level.tail = Some(key);
    }

    /// Returns the next key to service, visiting priority levels from
    /// highest to lowest (index `max_priority` down to `0`) and applying
    /// round-robin fairness within a level: each call resumes after the
    /// previously returned key in that level, wrapping around.
    pub fn next(&mut self) -> Option<RoutingKey> {
        for priority in (0..=self.max_priority()).rev() {
            if self.levels[priority].head.is_none() {
                continue;
            }
            let start_after = self.cursors[priority];
            let candidate = match start_after {
                Some(after) => self
                    .nodes
                    .get(&after)
                    .and_then(|n| n.next)
                    .or(self.levels[priority].head),
                None => self.levels[priority].head,
            };
            if let Some(key) = candidate {
                self.cursors[priority] = Some(key);
                return Some(key);
            }
        }
        None
    }

    pub fn priority_of(&self, key: RoutingKey) -> Option<usize> {
        self.nodes.get(&key).map(|n| n.priority)
    }

    #[cfg(test)]
    pub(crate) fn level_members(&self, priority: usize) -> Vec<RoutingKey> {
        let mut out = Vec::new();
        let mut cur = self.levels[priority].head;
        while let Some(key) = cur {
            out.push(key);
            cur = self.nodes.get(&key).unwrap().next;
        }
        out
    }
}
