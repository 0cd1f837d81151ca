//! Order-statistic index over sorted set entries.
//!
//! A treap whose nodes carry subtree sizes, so the rank of a key and the key
//! at a given rank are both found in expected O(log n).

use std::cmp::Ordering;

type Link<K> = Option<Box<Node<K>>>;

#[derive(Debug, Clone)]
struct Node<K> {
    key: K,
    priority: u64,
    size: usize,
    left: Link<K>,
    right: Link<K>,
}

impl<K> Node<K> {
    fn new(key: K) -> Box<Self> {
        Box::new(Node {
            key,
            priority: rand::random(),
            size: 1,
            left: None,
            right: None,
        })
    }

    fn update_size(&mut self) {
        self.size = 1 + size(&self.left) + size(&self.right);
    }
}

fn size<K>(link: &Link<K>) -> usize {
    link.as_ref().map_or(0, |node| node.size)
}

/// Splits `link` into the keys for which `goes_left` holds and the rest.
/// `goes_left` must be monotone over the key order.
fn split<K>(link: Link<K>, goes_left: &impl Fn(&K) -> bool) -> (Link<K>, Link<K>) {
    let Some(mut node) = link else {
        return (None, None);
    };
    if goes_left(&node.key) {
        let (middle, right) = split(node.right.take(), goes_left);
        node.right = middle;
        node.update_size();
        (Some(node), right)
    } else {
        let (left, middle) = split(node.left.take(), goes_left);
        node.left = middle;
        node.update_size();
        (left, Some(node))
    }
}

/// Joins two treaps where every key in `left` sorts before every key in
/// `right`.
fn merge<K>(left: Link<K>, right: Link<K>) -> Link<K> {
    match (left, right) {
        (None, right) => right,
        (left, None) => left,
        (Some(mut left), Some(mut right)) => {
            if left.priority >= right.priority {
                left.right = merge(left.right.take(), Some(right));
                left.update_size();
                Some(left)
            } else {
                right.left = merge(Some(left), right.left.take());
                right.update_size();
                Some(right)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankTree<K> {
    root: Link<K>,
}

impl<K> Default for RankTree<K> {
    fn default() -> Self {
        RankTree { root: None }
    }
}

impl<K: Ord> RankTree<K> {
    pub fn len(&self) -> usize {
        size(&self.root)
    }

    /// Inserts `key`, which must not already be present.
    pub fn insert(&mut self, key: K) {
        let (left, right) = split(self.root.take(), &|other: &K| *other < key);
        self.root = merge(merge(left, Some(Node::new(key))), right);
    }

    pub fn remove(&mut self, key: &K) -> bool {
        let (left, rest) = split(self.root.take(), &|other: &K| other < key);
        let (found, right) = split(rest, &|other: &K| other <= key);
        self.root = merge(left, right);
        found.is_some()
    }

    /// Number of keys strictly less than `key`.
    pub fn rank(&self, key: &K) -> usize {
        let mut rank = 0;
        let mut link = &self.root;
        while let Some(node) = link {
            match key.cmp(&node.key) {
                Ordering::Less => link = &node.left,
                Ordering::Equal => return rank + size(&node.left),
                Ordering::Greater => {
                    rank += size(&node.left) + 1;
                    link = &node.right;
                }
            }
        }
        rank
    }

    /// The key at 0-based position `index`.
    pub fn select(&self, mut index: usize) -> Option<&K> {
        let mut link = &self.root;
        while let Some(node) = link {
            let left = size(&node.left);
            match index.cmp(&left) {
                Ordering::Less => link = &node.left,
                Ordering::Equal => return Some(&node.key),
                Ordering::Greater => {
                    index -= left + 1;
                    link = &node.right;
                }
            }
        }
        None
    }
}
