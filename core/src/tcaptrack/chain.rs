//! Role indices.
//!
//! Each role (BEGIN, CONTINUE, END, ANSI) keeps its own table from key to a chain of dialogues that
//! used that key. Transaction ids are reused over time, so a chain may hold several unrelated
//! dialogues, ordered by the frame that opened them. The first node of a chain is its "father".

use super::context::SessionId;

use std::fmt;
use std::hash::Hash;

use hashlink::LinkedHashMap;

/// One dialogue's entry in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChainNode {
    /// Dialogue this entry represents.
    pub(crate) session_id: SessionId,
    /// Frame that opened the dialogue. Chains are sorted on this value.
    pub(crate) first_frame: u32,
    /// `true` for the head of the chain.
    pub(crate) father: bool,
}

/// Dialogues sharing one key, oldest first.
#[derive(Debug, Default)]
pub(crate) struct Chain {
    nodes: Vec<ChainNode>,
    /// Most recently matched dialogue.
    last_matched: Option<SessionId>,
}

impl Chain {
    fn single(node: ChainNode) -> Self {
        Chain {
            nodes: vec![ChainNode {
                father: true,
                ..node
            }],
            last_matched: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn head(&self) -> Option<&ChainNode> {
        self.nodes.first()
    }

    #[inline]
    pub(crate) fn tail(&self) -> Option<&ChainNode> {
        self.nodes.last()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &ChainNode> {
        self.nodes.iter()
    }

    /// Returns the node whose dialogue was opened at exactly `frame`.
    pub(crate) fn find_first_frame(&self, frame: u32) -> Option<&ChainNode> {
        self.nodes.iter().find(|node| node.first_frame == frame)
    }

    fn contains(&self, session_id: SessionId) -> bool {
        self.nodes.iter().any(|node| node.session_id == session_id)
    }
}

/// Key to chain table for one message role.
pub(crate) struct RoleIndex<K> {
    /// Role name, for diagnostics.
    role: &'static str,
    /// Chains in order of key discovery.
    table: LinkedHashMap<K, Chain>,
}

impl<K> RoleIndex<K>
where
    K: Hash + Eq + Clone + fmt::Display,
{
    pub(crate) fn new(role: &'static str) -> Self {
        RoleIndex {
            role,
            table: LinkedHashMap::new(),
        }
    }

    /// Returns the chain stored under `key`.
    #[inline]
    pub(crate) fn lookup_chain(&self, key: &K) -> Option<&Chain> {
        self.table.get(key)
    }

    /// Adds dialogue `session_id`, opened at `first_frame`, to the chain of `key`.
    ///
    /// The node is appended at the tail unless it is older than the tail, in which case it is
    /// inserted at its sorted position. A node inserted at the head becomes the father.
    pub(crate) fn insert(&mut self, key: K, session_id: SessionId, first_frame: u32) {
        let node = ChainNode {
            session_id,
            first_frame,
            father: false,
        };
        match self.table.get_mut(&key) {
            None => {
                log::debug!("{}: new chain for {}", self.role, key);
                self.table.insert(key, Chain::single(node));
            }
            Some(chain) => {
                if chain.contains(session_id) {
                    log::debug!("{}: session {} already in chain", self.role, session_id);
                    return;
                }
                let pos = chain
                    .nodes
                    .iter()
                    .rposition(|n| n.first_frame <= first_frame)
                    .map_or(0, |p| p + 1);
                if pos == 0 {
                    chain.nodes[0].father = false;
                    chain.nodes.insert(0, ChainNode { father: true, ..node });
                } else {
                    chain.nodes.insert(pos, node);
                }
                log::debug!(
                    "{}: session {} at position {} of {} for {}",
                    self.role,
                    session_id,
                    pos,
                    chain.nodes.len(),
                    key
                );
            }
        }
    }

    /// Unlinks dialogue `session_id` from the chain of `key`.
    ///
    /// Removing the sole node drops the table slot. Removing the head promotes the next node to
    /// father. Returns `false` if the node was not found.
    pub(crate) fn remove(&mut self, key: &K, session_id: SessionId) -> bool {
        let chain = match self.table.get_mut(key) {
            Some(chain) => chain,
            None => {
                log::warn!("{}: no chain for {} on removal", self.role, key);
                return false;
            }
        };
        let pos = match chain.nodes.iter().position(|n| n.session_id == session_id) {
            Some(pos) => pos,
            None => {
                log::warn!(
                    "{}: session {} not in chain for {} on removal",
                    self.role,
                    session_id,
                    key
                );
                return false;
            }
        };
        if chain.nodes.len() == 1 {
            self.table.remove(key);
            return true;
        }
        let removed = chain.nodes.remove(pos);
        if removed.father {
            chain.nodes[0].father = true;
        }
        if chain.last_matched == Some(session_id) {
            chain.last_matched = None;
        }
        true
    }

    /// Returns the dialogue of `key` that frame `frame` belongs to.
    ///
    /// The last matched dialogue wins if its frame range still covers `frame` and no later
    /// dialogue of the chain was opened by `frame`. Otherwise the dialogue with the largest first
    /// frame not after `frame` is chosen. `range` resolves a session id to its
    /// `(first_frame, last_frame)`.
    pub(crate) fn find_by_time<F>(&mut self, key: &K, frame: u32, range: F) -> Option<SessionId>
    where
        F: Fn(SessionId) -> Option<(u32, Option<u32>)>,
    {
        let chain = self.table.get_mut(key)?;
        if let Some(hint) = chain.last_matched {
            let superseded = chain
                .nodes
                .iter()
                .skip_while(|n| n.session_id != hint)
                .nth(1)
                .map_or(false, |next| next.first_frame <= frame);
            if !superseded {
                if let Some((first, last)) = range(hint) {
                    if first <= frame && last.map_or(true, |last| frame <= last) {
                        return Some(hint);
                    }
                }
            }
        }
        let found = chain
            .nodes
            .iter()
            .rev()
            .find(|n| n.first_frame <= frame)
            .map(|n| n.session_id);
        if found.is_some() {
            chain.last_matched = found;
        }
        found
    }

    /// Number of keys in the index.
    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    /// Number of nodes across all chains.
    pub(crate) fn nb_nodes(&self) -> usize {
        self.table.values().map(Chain::len).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.table.clear();
    }
}
