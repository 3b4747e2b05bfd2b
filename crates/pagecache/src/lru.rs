//! LRU (Least Recently Used) cache implementation
//!
//! Nodes live in an arena and link to each other by index, so promotion and
//! eviction are O(1) without holding references into the map. Capacity is a
//! byte budget: every value reports its own weight.

use ahash::RandomState;
use bytes::Bytes;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Size of a cached value in bytes
pub trait Weighted {
    /// Number of bytes this value counts against the cache capacity
    fn weight(&self) -> usize;
}

impl Weighted for Bytes {
    fn weight(&self) -> usize {
        self.len()
    }
}

impl Weighted for Vec<u8> {
    fn weight(&self) -> usize {
        self.len()
    }
}

impl Weighted for String {
    fn weight(&self) -> usize {
        self.len()
    }
}

/// Node in the LRU doubly-linked list
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU cache bounded by the total weight of its values
pub struct LruCache<K, V> {
    map: HashMap<K, usize, RandomState>,
    nodes: Vec<Option<Node<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free_list: Vec<usize>,
    max_bytes: usize,
    current_bytes: usize,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Weighted,
{
    /// Create a new LRU cache holding at most `max_bytes` of values
    pub fn new(max_bytes: usize) -> Self {
        Self {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            head: None,
            tail: None,
            free_list: Vec::new(),
            max_bytes,
            current_bytes: 0,
        }
    }

    /// Get a value and mark it most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.move_to_front(idx);
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Get a value without touching recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    /// Check whether a key is cached without touching recency
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Insert or replace a value, then evict from the tail until the byte
    /// budget holds again.
    ///
    /// The entry written by this call is never evicted by it, so a single
    /// value larger than the budget stays cached as the sole entry until the
    /// next `put`.
    ///
    /// Returns the number of entries evicted.
    pub fn put(&mut self, key: K, value: V) -> usize {
        let weight = value.weight();

        let idx = if let Some(&idx) = self.map.get(&key) {
            if let Some(node) = &mut self.nodes[idx] {
                self.current_bytes = self.current_bytes - node.value.weight() + weight;
                node.value = value;
            }
            self.move_to_front(idx);
            idx
        } else {
            let idx = self.alloc_node();
            self.nodes[idx] = Some(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.push_front(idx);
            self.map.insert(key, idx);
            self.current_bytes += weight;
            idx
        };

        let mut evicted = 0;
        while self.current_bytes > self.max_bytes && self.tail != Some(idx) {
            if !self.evict_tail() {
                break;
            }
            evicted += 1;
        }
        evicted
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Total weight of all cached values
    pub fn size_bytes(&self) -> usize {
        self.current_bytes
    }

    /// Configured byte budget
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;

        if let Some(node) = &mut self.nodes[idx] {
            node.prev = None;
            node.next = old_head;
        }

        if let Some(head_idx) = old_head {
            if let Some(head) = &mut self.nodes[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);
        self.push_front(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.nodes[idx] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_node) = &mut self.nodes[prev_idx] {
                    prev_node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_node) = &mut self.nodes[next_idx] {
                    next_node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn evict_tail(&mut self) -> bool {
        let Some(tail_idx) = self.tail else {
            return false;
        };

        self.unlink(tail_idx);
        match self.nodes[tail_idx].take() {
            Some(node) => {
                self.map.remove(&node.key);
                self.current_bytes -= node.value.weight();
                self.free_node(tail_idx);
                true
            }
            None => false,
        }
    }

    fn alloc_node(&mut self) -> usize {
        if let Some(idx) = self.free_list.pop() {
            idx
        } else {
            let idx = self.nodes.len();
            self.nodes.push(None);
            idx
        }
    }

    fn free_node(&mut self, idx: usize) {
        self.free_list.push(idx);
    }
}
