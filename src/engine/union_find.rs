use std::collections::HashMap;
use std::hash::Hash;

/// Disjoint-set forest with path compression and union by rank
#[derive(Debug, Clone)]
pub struct UnionFind<K> {
    parent: HashMap<K, K>,
    rank: HashMap<K, u32>,
}

impl<K: Clone + Eq + Hash> UnionFind<K> {
    /// Creates one singleton set per key
    pub fn new<I: IntoIterator<Item = K>>(keys: I) -> Self {
        let mut parent = HashMap::new();
        let mut rank = HashMap::new();
        for key in keys {
            parent.insert(key.clone(), key.clone());
            rank.insert(key, 0);
        }
        Self { parent, rank }
    }

    /// Returns the representative of `key`'s set, or `None` for an unknown key.
    /// Every node visited on the way is re-pointed at the root.
    pub fn find(&mut self, key: &K) -> Option<K> {
        let mut root = key.clone();
        loop {
            let parent = self.parent.get(&root)?;
            if *parent == root {
                break;
            }
            root = parent.clone();
        }

        let mut current = key.clone();
        while current != root {
            let next = self.parent.insert(current, root.clone())?;
            current = next;
        }
        Some(root)
    }

    /// Merges the sets of `a` and `b`. Returns false if they were already joined
    /// (or either key is unknown).
    pub fn union(&mut self, a: &K, b: &K) -> bool {
        let (Some(root_a), Some(root_b)) = (self.find(a), self.find(b)) else {
            return false;
        };
        if root_a == root_b {
            return false;
        }

        let rank_a = self.rank.get(&root_a).copied().unwrap_or(0);
        let rank_b = self.rank.get(&root_b).copied().unwrap_or(0);
        if rank_a < rank_b {
            self.parent.insert(root_a, root_b);
        } else if rank_a > rank_b {
            self.parent.insert(root_b, root_a);
        } else {
            self.parent.insert(root_b, root_a.clone());
            self.rank.insert(root_a, rank_a + 1);
        }
        true
    }

    #[cfg(test)]
    pub fn connected(&mut self, a: &K, b: &K) -> bool {
        match (self.find(a), self.find(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.parent.len()
    }
}
