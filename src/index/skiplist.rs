//! Probabilistic skip list for ordered numeric keys.
//!
//! Keeps (key, value) pairs sorted with expected O(log n) insert,
//! search, and delete. Nodes live in an arena and carry forward links
//! per level; the head and tail are sentinels drawn from the key
//! domain's extremes and are never compared against directly.

use rand::Rng;
use std::cmp::Ordering;

use crate::index::skipindex::KeyEncoding;

/// Maximum number of levels a node can reach.
const MAX_LEVEL: usize = 16;

/// Probability of promoting a node one level higher.
const P: f64 = 0.5;

/// Arena index of the head sentinel.
const HEAD: usize = 0;

/// Arena index of the tail sentinel.
const TAIL: usize = 1;

/// Key domain for a [`SkipList`]: ordering plus the sentinel extremes
/// and the raw serialization form.
pub trait SkipKey: Copy {
    /// Sentinel smaller than every real key.
    const MIN: Self;
    /// Sentinel at the top of the key domain.
    const MAX: Self;

    /// Total order over keys.
    fn compare(&self, other: &Self) -> Ordering;

    /// Fixed 64-bit on-disk form of the key.
    fn raw_bits(&self) -> u64;

    /// How the raw bits are interpreted on disk.
    fn encoding() -> KeyEncoding;
}

impl SkipKey for u64 {
    const MIN: Self = 0;
    const MAX: Self = u64::MAX;

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn raw_bits(&self) -> u64 {
        *self
    }

    fn encoding() -> KeyEncoding {
        KeyEncoding::Unsigned
    }
}

impl SkipKey for f64 {
    const MIN: Self = f64::NEG_INFINITY;
    const MAX: Self = f64::INFINITY;

    // NaN collapses to Equal and would match every key. The segment
    // writer rejects non-finite values before they reach a list.
    fn compare(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }

    fn raw_bits(&self) -> u64 {
        self.to_bits()
    }

    fn encoding() -> KeyEncoding {
        KeyEncoding::Float
    }
}

struct SkipNode<K, V> {
    key: K,
    /// `None` only for the two sentinels.
    value: Option<V>,
    /// Forward links, one per level the node participates in.
    forward: Vec<usize>,
}

/// A probabilistic skip list from keys to values.
pub struct SkipList<K: SkipKey, V> {
    nodes: Vec<SkipNode<K, V>>,
    /// Number of levels currently in use.
    level: usize,
    len: usize,
}

impl<K: SkipKey, V> SkipList<K, V> {
    /// Create an empty list.
    pub fn new() -> Self {
        let head = SkipNode {
            key: K::MIN,
            value: None,
            forward: vec![TAIL; MAX_LEVEL],
        };
        let tail = SkipNode {
            key: K::MAX,
            value: None,
            forward: Vec::new(),
        };
        SkipList {
            nodes: vec![head, tail],
            level: 1,
            len: 0,
        }
    }

    /// Number of keys in the list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a key, or overwrite the value of an existing key.
    pub fn insert(&mut self, key: K, value: V) {
        self.insert_or_update(key, value, |existing, value| *existing = value);
    }

    /// Insert a key, or resolve a collision through `on_update`, which
    /// receives the existing value and the incoming one.
    pub fn insert_or_update<F>(&mut self, key: K, value: V, on_update: F)
    where
        F: FnOnce(&mut V, V),
    {
        let mut update = [HEAD; MAX_LEVEL];
        let mut node = HEAD;
        for level in (0..self.level).rev() {
            loop {
                let next = self.nodes[node].forward[level];
                if next == TAIL || self.nodes[next].key.compare(&key) != Ordering::Less {
                    break;
                }
                node = next;
            }
            update[level] = node;
        }

        let candidate = self.nodes[node].forward[0];
        if candidate != TAIL && self.nodes[candidate].key.compare(&key) == Ordering::Equal {
            if let Some(existing) = self.nodes[candidate].value.as_mut() {
                on_update(existing, value);
            }
            return;
        }

        // update[] is pre-filled with HEAD, so newly activated levels
        // splice directly off the head sentinel
        let node_level = random_level();
        if node_level > self.level {
            self.level = node_level;
        }

        let new_node = self.nodes.len();
        self.nodes.push(SkipNode {
            key,
            value: Some(value),
            forward: vec![TAIL; node_level],
        });
        for level in 0..node_level {
            self.nodes[new_node].forward[level] = self.nodes[update[level]].forward[level];
            self.nodes[update[level]].forward[level] = new_node;
        }
        self.len += 1;
    }

    /// Find the value of an exact key.
    pub fn search(&self, key: &K) -> Option<&V> {
        let mut node = HEAD;
        for level in (0..self.level).rev() {
            loop {
                let next = self.nodes[node].forward[level];
                if next == TAIL || self.nodes[next].key.compare(key) != Ordering::Less {
                    break;
                }
                node = next;
            }
        }

        let candidate = self.nodes[node].forward[0];
        if candidate != TAIL && self.nodes[candidate].key.compare(key) == Ordering::Equal {
            self.nodes[candidate].value.as_ref()
        } else {
            None
        }
    }

    /// Remove a key. Returns true if the key was present.
    ///
    /// The node's links are unspliced level by level, stopping at the
    /// first level that no longer points at it; empty top levels shrink
    /// the active level count.
    pub fn delete(&mut self, key: &K) -> bool {
        let mut update = [HEAD; MAX_LEVEL];
        let mut node = HEAD;
        for level in (0..self.level).rev() {
            loop {
                let next = self.nodes[node].forward[level];
                if next == TAIL || self.nodes[next].key.compare(key) != Ordering::Less {
                    break;
                }
                node = next;
            }
            update[level] = node;
        }

        let target = self.nodes[node].forward[0];
        if target == TAIL || self.nodes[target].key.compare(key) != Ordering::Equal {
            return false;
        }

        for level in 0..self.level {
            if self.nodes[update[level]].forward[level] != target {
                break;
            }
            self.nodes[update[level]].forward[level] = self.nodes[target].forward[level];
        }
        while self.level > 1 && self.nodes[HEAD].forward[self.level - 1] == TAIL {
            self.level -= 1;
        }
        self.len -= 1;
        true
    }

    /// Iterate (key, value) pairs in key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            node: self.nodes[HEAD].forward[0],
        }
    }
}

impl<K: SkipKey, V> Default for SkipList<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Level-0 iterator over a [`SkipList`].
pub struct Iter<'a, K: SkipKey, V> {
    list: &'a SkipList<K, V>,
    node: usize,
}

impl<'a, K: SkipKey, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.node != TAIL {
            let node = &self.list.nodes[self.node];
            self.node = node.forward[0];
            if let Some(value) = node.value.as_ref() {
                return Some((&node.key, value));
            }
        }
        None
    }
}

/// Draw a level from a geometric distribution capped at [`MAX_LEVEL`].
fn random_level() -> usize {
    let mut rng = rand::rng();
    let mut level = 1;
    while level < MAX_LEVEL && rng.random::<f64>() < P {
        level += 1;
    }
    level
}
