//! Ordered string-keyed radix tree.
//!
//! Nodes hold a list of labelled edges rather than a map: edge order is part
//! of the contract. Traversal visits edges in insertion order, and splitting
//! an edge keeps the existing suffix ahead of the newly inserted key, so the
//! traversal order of terminals is stable insertion order.

/// A radix tree mapping string keys to values of type `V`.
#[derive(Debug, Default)]
pub struct Radix<V> {
    root: Node<V>,
}

#[derive(Debug)]
struct Node<V> {
    /// `Some` marks a terminal node.
    value: Option<V>,
    edges: Vec<Edge<V>>,
}

#[derive(Debug)]
struct Edge<V> {
    label: String,
    node: Box<Node<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            value: None,
            edges: Vec::new(),
        }
    }
}

impl<V> Node<V> {
    fn terminal(value: V) -> Self {
        Self {
            value: Some(value),
            edges: Vec::new(),
        }
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

impl<V> Radix<V> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            root: Node::default(),
        }
    }

    /// Insert a value under `key`, replacing any existing value.
    pub fn insert(&mut self, key: &str, value: V) {
        self.root.insert(key, value);
    }

    /// Look up the value stored under exactly `key`.
    pub fn find(&self, key: &str) -> Option<&V> {
        self.root.find(key)
    }

    /// All values whose key starts with `prefix`, in traversal order. An
    /// empty prefix matches every key, the root value included.
    pub fn find_all(&self, prefix: &str) -> Vec<&V> {
        let mut out = Vec::new();
        self.root.find_all(prefix, &mut out);
        out
    }

    /// All `(key, value)` pairs in traversal order.
    pub fn entries(&self) -> Vec<(String, &V)> {
        let mut out = Vec::new();
        self.root.walk(String::new(), &mut out);
        out
    }

    /// The first terminal in traversal order.
    pub fn get_first(&self) -> Option<(String, &V)> {
        self.root.first(String::new())
    }

    /// The last terminal in traversal order.
    pub fn get_last(&self) -> Option<(String, &V)> {
        self.root.last(String::new())
    }

    /// The successor of `key` in traversal order.
    ///
    /// If `key` names a terminal, the next terminal encountered after it is
    /// the answer. Otherwise the first terminal whose key is strictly
    /// greater than `key`.
    pub fn get_next(&self, key: &str) -> Option<(String, &V)> {
        let entries = self.entries();
        if let Some(at) = entries.iter().position(|(k, _)| k == key) {
            return entries.into_iter().nth(at + 1);
        }
        entries.into_iter().find(|(k, _)| k.as_str() > key)
    }

    /// Remove the value stored under `key`, compacting pass-through nodes
    /// left with a single child.
    pub fn delete(&mut self, key: &str) {
        self.root.delete(key);
    }

    /// Number of terminals in the tree.
    pub fn len(&self) -> usize {
        self.root.count()
    }

    /// Returns true if the tree holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> Node<V> {
    fn insert(&mut self, key: &str, value: V) {
        if key.is_empty() {
            self.value = Some(value);
            return;
        }

        for i in 0..self.edges.len() {
            let cpl = common_prefix_len(key, &self.edges[i].label);
            if cpl == 0 {
                continue;
            }
            if cpl == self.edges[i].label.len() {
                self.edges[i].node.insert(&key[cpl..], value);
                return;
            }

            // The key diverges inside this label: split the edge. The old
            // suffix edge is attached first so traversal order stays
            // insertion order.
            let suffix = self.edges[i].label.split_off(cpl);
            let old_child = std::mem::take(&mut self.edges[i].node);
            let mut mid = Box::new(Node::default());
            mid.edges.push(Edge {
                label: suffix,
                node: old_child,
            });
            if cpl == key.len() {
                mid.value = Some(value);
            } else {
                mid.insert(&key[cpl..], value);
            }
            self.edges[i].node = mid;
            return;
        }

        self.edges.push(Edge {
            label: key.to_string(),
            node: Box::new(Node::terminal(value)),
        });
    }

    fn find(&self, key: &str) -> Option<&V> {
        if key.is_empty() {
            return self.value.as_ref();
        }
        for edge in &self.edges {
            let cpl = common_prefix_len(key, &edge.label);
            if cpl == 0 {
                continue;
            }
            if cpl == edge.label.len() {
                return edge.node.find(&key[cpl..]);
            }
            return None;
        }
        None
    }

    fn find_all<'a>(&'a self, prefix: &str, out: &mut Vec<&'a V>) {
        if prefix.is_empty() {
            self.collect(out);
            return;
        }
        for edge in &self.edges {
            let cpl = common_prefix_len(prefix, &edge.label);
            if cpl == 0 {
                continue;
            }
            if cpl == prefix.len() {
                edge.node.collect(out);
            } else if cpl == edge.label.len() {
                edge.node.find_all(&prefix[cpl..], out);
            }
        }
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a V>) {
        if let Some(v) = &self.value {
            out.push(v);
        }
        for edge in &self.edges {
            edge.node.collect(out);
        }
    }

    fn walk<'a>(&'a self, path: String, out: &mut Vec<(String, &'a V)>) {
        if let Some(v) = &self.value {
            out.push((path.clone(), v));
        }
        for edge in &self.edges {
            let mut child_path = path.clone();
            child_path.push_str(&edge.label);
            edge.node.walk(child_path, out);
        }
    }

    fn first(&self, path: String) -> Option<(String, &V)> {
        if let Some(v) = &self.value {
            return Some((path, v));
        }
        for edge in &self.edges {
            let mut child_path = path.clone();
            child_path.push_str(&edge.label);
            if let Some(hit) = edge.node.first(child_path) {
                return Some(hit);
            }
        }
        None
    }

    fn last(&self, path: String) -> Option<(String, &V)> {
        for edge in self.edges.iter().rev() {
            let mut child_path = path.clone();
            child_path.push_str(&edge.label);
            if let Some(hit) = edge.node.last(child_path) {
                return Some(hit);
            }
        }
        self.value.as_ref().map(|v| (path, v))
    }

    fn count(&self) -> usize {
        let own = usize::from(self.value.is_some());
        own + self.edges.iter().map(|e| e.node.count()).sum::<usize>()
    }

    fn delete(&mut self, key: &str) {
        if key.is_empty() {
            self.value = None;
            return;
        }

        let mut at = None;
        for (i, edge) in self.edges.iter().enumerate() {
            let cpl = common_prefix_len(key, &edge.label);
            if cpl == 0 {
                continue;
            }
            if cpl == edge.label.len() {
                at = Some(i);
            }
            break;
        }
        let Some(i) = at else { return };

        let label_len = self.edges[i].label.len();
        self.edges[i].node.delete(&key[label_len..]);

        // Compact: drop empty leaves, merge pass-through nodes.
        if self.edges[i].node.value.is_none() {
            match self.edges[i].node.edges.len() {
                0 => {
                    self.edges.remove(i);
                }
                1 => {
                    let grand = self.edges[i].node.edges.remove(0);
                    self.edges[i].label.push_str(&grand.label);
                    self.edges[i].node = grand.node;
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Radix<i32> {
        let mut tree = Radix::new();
        tree.insert("0-0", 0);
        tree.insert("1-1", 11);
        tree.insert("1-2", 12);
        tree.insert("2-1", 21);
        tree
    }

    #[test]
    fn insert_and_find() {
        let tree = sample();
        assert_eq!(tree.find("1-1"), Some(&11));
        assert_eq!(tree.find("2-1"), Some(&21));
        assert_eq!(tree.find("1-"), None);
        assert_eq!(tree.find("missing"), None);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn insert_replaces_existing() {
        let mut tree = sample();
        tree.insert("1-1", 99);
        assert_eq!(tree.find("1-1"), Some(&99));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn split_keeps_suffix_order() {
        let mut tree = Radix::new();
        tree.insert("1-1", 1);
        tree.insert("1-2", 3);
        tree.insert("10-0", 2);

        // The split puts the pre-existing suffix ahead of the new one.
        let keys: Vec<String> = tree.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["1-1", "1-2", "10-0"]);
    }

    #[test]
    fn find_all_by_prefix() {
        let tree = sample();
        let ones = tree.find_all("1-");
        assert_eq!(ones, vec![&11, &12]);

        // Empty prefix matches everything, in traversal order.
        let all = tree.find_all("");
        assert_eq!(all, vec![&0, &11, &12, &21]);

        assert!(tree.find_all("9").is_empty());
    }

    #[test]
    fn find_all_prefix_inside_label() {
        let mut tree = Radix::new();
        tree.insert("stream", 1);
        tree.insert("streams", 2);
        tree.insert("stride", 3);

        assert_eq!(tree.find_all("str"), vec![&1, &2, &3]);
        assert_eq!(tree.find_all("stream"), vec![&1, &2]);
        assert_eq!(tree.find_all("streams"), vec![&2]);
    }

    #[test]
    fn first_and_last_follow_traversal_order() {
        let tree = sample();
        assert_eq!(tree.get_first().unwrap().0, "0-0");
        assert_eq!(tree.get_last().unwrap().0, "2-1");
    }

    #[test]
    fn get_next_after_existing_key() {
        let tree = sample();
        assert_eq!(tree.get_next("0-0").unwrap().0, "1-1");
        assert_eq!(tree.get_next("1-1").unwrap().0, "1-2");
        assert_eq!(tree.get_next("1-2").unwrap().0, "2-1");
        assert!(tree.get_next("2-1").is_none());
    }

    #[test]
    fn get_next_of_absent_key_is_strict_successor() {
        let mut tree = Radix::new();
        for key in ["a", "c", "e"] {
            tree.insert(key, ());
        }
        assert_eq!(tree.get_next("b").unwrap().0, "c");
        assert_eq!(tree.get_next("").unwrap().0, "a");
        assert!(tree.get_next("f").is_none());
    }

    #[test]
    fn delete_removes_and_compacts() {
        let mut tree = sample();
        tree.delete("1-1");
        assert_eq!(tree.find("1-1"), None);
        assert_eq!(tree.find("1-2"), Some(&12));
        assert_eq!(tree.len(), 3);

        tree.delete("1-2");
        assert_eq!(tree.find("1-2"), None);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.find("0-0"), Some(&0));
        assert_eq!(tree.find("2-1"), Some(&21));
    }

    #[test]
    fn delete_absent_key_is_noop() {
        let mut tree = sample();
        tree.delete("9-9");
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn root_value_via_empty_key() {
        let mut tree = Radix::new();
        tree.insert("", 7);
        assert_eq!(tree.find(""), Some(&7));
        assert_eq!(tree.find_all(""), vec![&7]);
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// get_next returns the successor in traversal order; with sorted
        /// unique insertions, that is the smallest key strictly greater.
        #[test]
        fn next_is_strict_successor(
            keys in proptest::collection::btree_set("[a-z]{1,6}", 1..24),
            probe in "[a-z]{1,6}",
        ) {
            let keys: Vec<String> = keys.iter().cloned().collect();
            let mut tree = Radix::new();
            for (i, k) in keys.iter().enumerate() {
                tree.insert(k, i);
            }

            let expected = keys.iter().find(|k| k.as_str() > probe.as_str());
            let got = tree.get_next(&probe).map(|(k, _)| k);
            prop_assert_eq!(got, expected.cloned());
        }

        /// Every inserted key is findable and entries() is in insertion
        /// order when insertions are already sorted.
        #[test]
        fn entries_match_sorted_insertions(
            keys in proptest::collection::btree_set("[a-z]{1,6}", 1..24),
        ) {
            let keys: Vec<String> = keys.iter().cloned().collect();
            let mut tree = Radix::new();
            for (i, k) in keys.iter().enumerate() {
                tree.insert(k, i);
            }
            let walked: Vec<String> = tree.entries().into_iter().map(|(k, _)| k).collect();
            prop_assert_eq!(walked, keys.clone());
            for k in &keys {
                prop_assert!(tree.find(k).is_some());
            }
        }
    }
}
