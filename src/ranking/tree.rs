//! Order-statistics tree
//!
//! A treap over an index arena where every node tracks its subtree size, so
//! insert, remove, rank and select all run in expected O(log n).

use std::cmp::Ordering;

#[derive(Debug, Clone)]
struct Node<K> {
    key: K,
    priority: u64,
    left: Option<usize>,
    right: Option<usize>,
    size: usize,
}

#[derive(Debug, Clone)]
pub struct OrderTree<K> {
    nodes: Vec<Node<K>>,
    free: Vec<usize>,
    root: Option<usize>,
}

impl<K: Ord + Clone> Default for OrderTree<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone> OrderTree<K> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
        }
    }

    pub fn len(&self) -> usize {
        self.size(self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert a key. Keys are expected to be unique; inserting a key that is
    /// already present leaves the tree unchanged and returns false.
    pub fn insert(&mut self, key: K) -> bool {
        if self.rank(&key).is_some() {
            return false;
        }
        let node = self.alloc(key.clone());
        let (left, right) = self.split(self.root, &key, false);
        let merged = self.merge(left, Some(node));
        self.root = self.merge(merged, right);
        true
    }

    /// Remove a key, returning whether it was present
    pub fn remove(&mut self, key: &K) -> bool {
        let (left, rest) = self.split(self.root, key, false);
        let (found, right) = self.split(rest, key, true);
        if let Some(i) = found {
            self.free.push(i);
        }
        self.root = self.merge(left, right);
        found.is_some()
    }

    /// Zero-based position of `key` in ascending order
    pub fn rank(&self, key: &K) -> Option<usize> {
        let mut current = self.root;
        let mut before = 0;
        while let Some(i) = current {
            let node = &self.nodes[i];
            match key.cmp(&node.key) {
                Ordering::Less => current = node.left,
                Ordering::Greater => {
                    before += self.size(node.left) + 1;
                    current = node.right;
                }
                Ordering::Equal => return Some(before + self.size(node.left)),
            }
        }
        None
    }

    /// Key at zero-based position `index` in ascending order
    pub fn select(&self, mut index: usize) -> Option<&K> {
        let mut current = self.root;
        while let Some(i) = current {
            let node = &self.nodes[i];
            let left = self.size(node.left);
            match index.cmp(&left) {
                Ordering::Less => current = node.left,
                Ordering::Equal => return Some(&node.key),
                Ordering::Greater => {
                    index -= left + 1;
                    current = node.right;
                }
            }
        }
        None
    }

    /// Up to `count` keys starting at position `start`
    pub fn range(&self, start: usize, count: usize) -> Vec<&K> {
        let end = start.saturating_add(count).min(self.len());
        (start..end).filter_map(|i| self.select(i)).collect()
    }

    fn alloc(&mut self, key: K) -> usize {
        let node = Node {
            key,
            priority: rand::random(),
            left: None,
            right: None,
            size: 1,
        };
        match self.free.pop() {
            Some(i) => {
                self.nodes[i] = node;
                i
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn size(&self, t: Option<usize>) -> usize {
        t.map(|i| self.nodes[i].size).unwrap_or(0)
    }

    fn update(&mut self, i: usize) {
        self.nodes[i].size = 1 + self.size(self.nodes[i].left) + self.size(self.nodes[i].right);
    }

    /// Split into keys below `key` (or at most `key` when `inclusive`) and the rest
    fn split(
        &mut self,
        t: Option<usize>,
        key: &K,
        inclusive: bool,
    ) -> (Option<usize>, Option<usize>) {
        let Some(i) = t else {
            return (None, None);
        };
        let goes_left = match self.nodes[i].key.cmp(key) {
            Ordering::Less => true,
            Ordering::Equal => inclusive,
            Ordering::Greater => false,
        };
        if goes_left {
            let (left, right) = self.split(self.nodes[i].right, key, inclusive);
            self.nodes[i].right = left;
            self.update(i);
            (Some(i), right)
        } else {
            let (left, right) = self.split(self.nodes[i].left, key, inclusive);
            self.nodes[i].left = right;
            self.update(i);
            (left, Some(i))
        }
    }

    /// Merge two trees where every key of `a` sorts before every key of `b`
    fn merge(&mut self, a: Option<usize>, b: Option<usize>) -> Option<usize> {
        match (a, b) {
            (None, b) => b,
            (a, None) => a,
            (Some(x), Some(y)) => {
                if self.nodes[x].priority > self.nodes[y].priority {
                    let right = self.nodes[x].right;
                    self.nodes[x].right = self.merge(right, Some(y));
                    self.update(x);
                    Some(x)
                } else {
                    let left = self.nodes[y].left;
                    self.nodes[y].left = self.merge(Some(x), left);
                    self.update(y);
                    Some(y)
                }
            }
        }
    }
}
