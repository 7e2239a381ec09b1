//! Case-insensitive prefix index over item names.

use std::collections::{BTreeMap, HashMap};

use crate::models::BasicItem;

/// An item name folded to upper case. Folding uses Unicode case mapping, which does
/// not depend on the host locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaseFoldedName(String);

impl CaseFoldedName {
    pub fn new(name: &str) -> Self {
        Self(name.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Default)]
struct TrieNode {
    is_word: bool,
    children: BTreeMap<char, TrieNode>,
}

/// Trie of folded names plus the items behind them. Both are always updated
/// together, so every complete word in the trie has an item in `items`.
#[derive(Debug, Default)]
pub struct AutocompleteIndex {
    root: TrieNode,
    items: HashMap<CaseFoldedName, BasicItem>,
}

impl AutocompleteIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&BasicItem> {
        self.items.get(&CaseFoldedName::new(name))
    }

    pub fn items(&self) -> impl Iterator<Item = &BasicItem> {
        self.items.values()
    }

    /// Adds `item` unless an item with the same name (ignoring case) exists.
    pub fn insert(&mut self, item: BasicItem) -> bool {
        let key = CaseFoldedName::new(&item.name);
        if self.items.contains_key(&key) {
            return false;
        }

        let mut node = &mut self.root;
        for ch in key.as_str().chars() {
            node = node.children.entry(ch).or_default();
        }
        node.is_word = true;
        self.items.insert(key, item);
        true
    }

    /// Replaces the item stored under `item.name`. The trie path is shared with the
    /// precursor, so only the item map changes. Returns the replaced item.
    pub fn insert_successor(&mut self, item: BasicItem) -> Option<BasicItem> {
        let key = CaseFoldedName::new(&item.name);
        if !self.items.contains_key(&key) {
            self.insert(item);
            return None;
        }
        self.items.insert(key, item)
    }

    /// Items whose name starts with `prefix`, ignoring case, in name order.
    /// A `limit` of zero means no limit.
    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<BasicItem> {
        let prefix = CaseFoldedName::new(prefix);
        let mut node = &self.root;
        for ch in prefix.as_str().chars() {
            match node.children.get(&ch) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }

        let limit = if limit == 0 { usize::MAX } else { limit };
        Words::new(node, prefix.0)
            .take(limit)
            .filter_map(|name| self.items.get(&CaseFoldedName(name)).cloned())
            .collect()
    }
}

/// Depth-first walk yielding complete words below a node. Children are visited in
/// character order, so words come out sorted and consumption can stop at any point.
struct Words<'a> {
    stack: Vec<(&'a TrieNode, String)>,
}

impl<'a> Words<'a> {
    fn new(start: &'a TrieNode, prefix: String) -> Self {
        Self {
            stack: vec![(start, prefix)],
        }
    }
}

impl Iterator for Words<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while let Some((node, path)) = self.stack.pop() {
            for (ch, child) in node.children.iter().rev() {
                let mut child_path = path.clone();
                child_path.push(*ch);
                self.stack.push((child, child_path));
            }
            if node.is_word {
                return Some(path);
            }
        }
        None
    }
}
