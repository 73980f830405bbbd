//! Id-addressed storage for every tab's pane tree.

use super::tree::{PaneTree, clamp_ratio};
use super::{NodeId, Pane, PaneId, PaneState, SplitDirection, TabId};
use blockterm_terminal::SessionId;
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Node {
    Leaf(Pane),
    Split {
        direction: SplitDirection,
        ratio: f32,
        first: NodeId,
        second: NodeId,
    },
}

#[derive(Debug, Clone)]
struct Slot {
    parent: Option<NodeId>,
    tab: TabId,
    node: Node,
}

/// A tab: a title and the root of its pane tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub id: TabId,
    pub title: String,
    pub root: NodeId,
    pub active_pane: PaneId,
    /// Tab this one was opened from, if it is still open.
    pub parent: Option<TabId>,
}

/// Outcome of [`LayoutArena::remove_pane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneRemoval {
    /// The pane's sibling took the place of their split.
    Collapsed(Pane),
    /// It was the tab's only pane; the tab is gone too.
    ClosedTab { tab: TabId, pane: Pane },
}

/// All tabs and their pane trees.
#[derive(Debug, Default)]
pub struct LayoutArena {
    nodes: HashMap<NodeId, Slot>,
    pane_nodes: HashMap<PaneId, NodeId>,
    /// In display order
    tabs: Vec<Tab>,
    active_tab: Option<TabId>,
    next_id: u64,
}

impl LayoutArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Add a tab holding `tree`. It is placed right after `parent` (if that
    /// tab exists) and becomes the active tab. Returns the new pane ids in
    /// leaf order.
    pub fn insert_tab(
        &mut self,
        parent: Option<TabId>,
        title: Option<String>,
        tree: PaneTree<PaneState>,
        active_leaf: usize,
    ) -> (TabId, Vec<PaneId>) {
        let id = TabId(self.alloc());
        let mut panes = Vec::with_capacity(tree.leaf_count());
        let root = self.insert_tree(id, None, tree, &mut panes);
        // A tree has at least one leaf.
        let active_pane = panes[active_leaf.min(panes.len() - 1)];

        let parent_index = parent.and_then(|p| self.tabs.iter().position(|t| t.id == p));
        let title = title.unwrap_or_else(|| format!("Tab {}", self.tabs.len() + 1));
        let tab = Tab {
            id,
            title,
            root,
            active_pane,
            parent: parent_index.map(|i| self.tabs[i].id),
        };
        match parent_index {
            Some(i) => self.tabs.insert(i + 1, tab),
            None => self.tabs.push(tab),
        }
        self.active_tab = Some(id);

        log::info!(
            "Created {} with {} pane(s) (total tabs: {})",
            id,
            panes.len(),
            self.tabs.len()
        );
        (id, panes)
    }

    fn insert_tree(
        &mut self,
        tab: TabId,
        parent: Option<NodeId>,
        tree: PaneTree<PaneState>,
        panes: &mut Vec<PaneId>,
    ) -> NodeId {
        let node_id = NodeId(self.alloc());
        let node = match tree {
            PaneTree::Leaf(state) => {
                let pane = PaneId(self.alloc());
                panes.push(pane);
                self.pane_nodes.insert(pane, node_id);
                Node::Leaf(Pane { id: pane, state })
            }
            PaneTree::Split {
                direction,
                ratio,
                first,
                second,
            } => {
                let first = self.insert_tree(tab, Some(node_id), *first, panes);
                let second = self.insert_tree(tab, Some(node_id), *second, panes);
                Node::Split {
                    direction,
                    ratio: clamp_ratio(ratio),
                    first,
                    second,
                }
            }
        };
        self.nodes.insert(node_id, Slot { parent, tab, node });
        node_id
    }

    /// Remove a tab and its whole tree. Returns its panes in leaf order.
    pub fn remove_tab(&mut self, id: TabId) -> Option<Vec<Pane>> {
        let index = self.tabs.iter().position(|t| t.id == id)?;
        let tab = self.tabs.remove(index);

        let mut panes = Vec::new();
        self.remove_subtree(tab.root, &mut panes);

        for other in &mut self.tabs {
            if other.parent == Some(id) {
                other.parent = None;
            }
        }

        // If we closed the active tab, prefer the tab at the same index (or
        // the previous one if it was last).
        if self.active_tab == Some(id) {
            self.active_tab = if self.tabs.is_empty() {
                None
            } else {
                Some(self.tabs[index.min(self.tabs.len() - 1)].id)
            };
        }

        log::info!("Removed {} ({} pane(s))", id, panes.len());
        Some(panes)
    }

    fn remove_subtree(&mut self, node: NodeId, panes: &mut Vec<Pane>) {
        let Some(slot) = self.nodes.remove(&node) else {
            return;
        };
        match slot.node {
            Node::Leaf(pane) => {
                self.pane_nodes.remove(&pane.id);
                panes.push(pane);
            }
            Node::Split { first, second, .. } => {
                self.remove_subtree(first, panes);
                self.remove_subtree(second, panes);
            }
        }
    }

    /// Split `pane` in two; the new pane goes second (right/bottom) and
    /// becomes the tab's active pane.
    pub fn split_pane(
        &mut self,
        pane: PaneId,
        direction: SplitDirection,
        state: PaneState,
    ) -> Option<PaneId> {
        let node_id = *self.pane_nodes.get(&pane)?;
        let Slot { parent, tab, node } = self.nodes.remove(&node_id)?;
        let existing = match node {
            Node::Leaf(existing) => existing,
            other => {
                self.nodes.insert(node_id, Slot { parent, tab, node: other });
                return None;
            }
        };

        let first = NodeId(self.alloc());
        let second = NodeId(self.alloc());
        let new_pane = PaneId(self.alloc());

        self.nodes.insert(
            first,
            Slot {
                parent: Some(node_id),
                tab,
                node: Node::Leaf(existing),
            },
        );
        self.nodes.insert(
            second,
            Slot {
                parent: Some(node_id),
                tab,
                node: Node::Leaf(Pane {
                    id: new_pane,
                    state,
                }),
            },
        );
        // The split keeps the leaf's slot id, so the grandparent's link stays valid.
        self.nodes.insert(
            node_id,
            Slot {
                parent,
                tab,
                node: Node::Split {
                    direction,
                    ratio: 0.5,
                    first,
                    second,
                },
            },
        );
        self.pane_nodes.insert(pane, first);
        self.pane_nodes.insert(new_pane, second);

        if let Some(tab) = self.tab_mut(tab) {
            tab.active_pane = new_pane;
        }
        log::info!("Split {} {:?}, created {}", pane, direction, new_pane);
        Some(new_pane)
    }

    /// Remove a pane. Its sibling takes the place of their split; removing a
    /// tab's only pane removes the tab.
    pub fn remove_pane(&mut self, pane: PaneId) -> Option<PaneRemoval> {
        let node_id = *self.pane_nodes.get(&pane)?;
        let slot = self.nodes.get(&node_id)?;
        if !matches!(slot.node, Node::Leaf(_)) {
            return None;
        }
        let (tab, parent) = (slot.tab, slot.parent);

        let Some(parent_id) = parent else {
            let mut panes = self.remove_tab(tab)?;
            let pane = panes.pop()?;
            return Some(PaneRemoval::ClosedTab { tab, pane });
        };

        let removed = match self.nodes.remove(&node_id).map(|s| s.node) {
            Some(Node::Leaf(removed)) => removed,
            _ => return None,
        };
        self.pane_nodes.remove(&pane);

        let parent_slot = self.nodes.remove(&parent_id)?;
        let sibling = match parent_slot.node {
            Node::Split { first, second, .. } if first == node_id => second,
            Node::Split { first, .. } => first,
            Node::Leaf(_) => return None,
        };

        if let Some(slot) = self.nodes.get_mut(&sibling) {
            slot.parent = parent_slot.parent;
        }
        match parent_slot.parent {
            Some(grandparent) => {
                if let Some(Slot {
                    node: Node::Split { first, second, .. },
                    ..
                }) = self.nodes.get_mut(&grandparent)
                {
                    if *first == parent_id {
                        *first = sibling;
                    } else if *second == parent_id {
                        *second = sibling;
                    }
                }
            }
            None => {
                if let Some(tab) = self.tab_mut(tab) {
                    tab.root = sibling;
                }
            }
        }

        let refocus = self.first_leaf(sibling);
        if let Some(tab) = self.tab_mut(tab)
            && tab.active_pane == pane
            && let Some(next) = refocus
        {
            tab.active_pane = next;
        }

        log::info!("Removed {} from {}", pane, tab);
        Some(PaneRemoval::Collapsed(removed))
    }

    fn first_leaf(&self, mut node: NodeId) -> Option<PaneId> {
        loop {
            match &self.nodes.get(&node)?.node {
                Node::Leaf(pane) => return Some(pane.id),
                Node::Split { first, .. } => node = *first,
            }
        }
    }

    fn collect_leaves(&self, node: NodeId, out: &mut Vec<PaneId>) {
        match self.nodes.get(&node).map(|s| &s.node) {
            Some(Node::Leaf(pane)) => out.push(pane.id),
            Some(Node::Split { first, second, .. }) => {
                self.collect_leaves(*first, out);
                self.collect_leaves(*second, out);
            }
            None => {}
        }
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    fn tab_mut(&mut self, id: TabId) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.id == id)
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.active_tab
    }

    pub fn set_active_tab(&mut self, id: TabId) -> bool {
        if self.tab(id).is_some() {
            self.active_tab = Some(id);
            true
        } else {
            false
        }
    }

    /// Make `pane` the active pane of its tab, and that tab the active tab.
    pub fn focus_pane(&mut self, pane: PaneId) -> bool {
        let Some(tab_id) = self.tab_of_pane(pane) else {
            return false;
        };
        if let Some(tab) = self.tab_mut(tab_id) {
            tab.active_pane = pane;
        }
        self.active_tab = Some(tab_id);
        true
    }

    pub fn pane(&self, id: PaneId) -> Option<&Pane> {
        let node = self.pane_nodes.get(&id)?;
        match &self.nodes.get(node)?.node {
            Node::Leaf(pane) => Some(pane),
            Node::Split { .. } => None,
        }
    }

    pub fn pane_mut(&mut self, id: PaneId) -> Option<&mut Pane> {
        let node = self.pane_nodes.get(&id)?;
        match &mut self.nodes.get_mut(node)?.node {
            Node::Leaf(pane) => Some(pane),
            Node::Split { .. } => None,
        }
    }

    pub fn pane_count(&self) -> usize {
        self.pane_nodes.len()
    }

    pub fn tab_of_pane(&self, pane: PaneId) -> Option<TabId> {
        let node = self.pane_nodes.get(&pane)?;
        self.nodes.get(node).map(|s| s.tab)
    }

    /// Pane ids of a tab in leaf order.
    pub fn panes_in_tab(&self, tab: TabId) -> Vec<PaneId> {
        let mut out = Vec::new();
        if let Some(tab) = self.tab(tab) {
            self.collect_leaves(tab.root, &mut out);
        }
        out
    }

    /// Sessions owned by a tab's panes.
    pub fn sessions_in_tab(&self, tab: TabId) -> Vec<SessionId> {
        self.panes_in_tab(tab)
            .into_iter()
            .filter_map(|p| self.pane(p).and_then(|pane| pane.state.session))
            .collect()
    }

    pub fn pane_for_session(&self, session: SessionId) -> Option<PaneId> {
        self.nodes.values().find_map(|slot| match &slot.node {
            Node::Leaf(pane) if pane.state.session == Some(session) => Some(pane.id),
            _ => None,
        })
    }

    /// Position of the tab's active pane in leaf order.
    pub fn active_leaf_index(&self, tab: TabId) -> usize {
        let Some(active) = self.tab(tab).map(|t| t.active_pane) else {
            return 0;
        };
        self.panes_in_tab(tab)
            .iter()
            .position(|p| *p == active)
            .unwrap_or(0)
    }

    /// Copy of a tab's tree.
    pub fn export_tab(&self, tab: TabId) -> Option<PaneTree<Pane>> {
        let root = self.tab(tab)?.root;
        self.export_node(root)
    }

    fn export_node(&self, node: NodeId) -> Option<PaneTree<Pane>> {
        match &self.nodes.get(&node)?.node {
            Node::Leaf(pane) => Some(PaneTree::Leaf(pane.clone())),
            Node::Split {
                direction,
                ratio,
                first,
                second,
            } => Some(PaneTree::Split {
                direction: *direction,
                ratio: *ratio,
                first: Box::new(self.export_node(*first)?),
                second: Box::new(self.export_node(*second)?),
            }),
        }
    }

    /// Check that every parent link matches its parent's child links and that
    /// every tab's root has no parent.
    #[cfg(test)]
    fn assert_consistent(&self) {
        for (id, slot) in &self.nodes {
            if let Node::Split { first, second, .. } = slot.node {
                assert_eq!(self.nodes[&first].parent, Some(*id));
                assert_eq!(self.nodes[&second].parent, Some(*id));
            }
            if let Some(parent) = slot.parent {
                match self.nodes[&parent].node {
                    Node::Split { first, second, .. } => assert!(first == *id || second == *id),
                    Node::Leaf(_) => panic!("parent of {id:?} is a leaf"),
                }
            }
        }
        for tab in &self.tabs {
            assert_eq!(self.nodes[&tab.root].parent, None);
            assert!(self.panes_in_tab(tab.id).contains(&tab.active_pane));
        }
        for (pane, node) in &self.pane_nodes {
            assert!(matches!(&self.nodes[node].node, Node::Leaf(p) if p.id == *pane));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(cwd: &str) -> PaneState {
        PaneState {
            session: None,
            cwd: Some(cwd.to_string()),
            cols: 80,
            rows: 24,
            shell: "/bin/sh".to_string(),
            args: Vec::new(),
            history: Vec::new(),
        }
    }

    fn single(arena: &mut LayoutArena, cwd: &str) -> (TabId, PaneId) {
        let (tab, panes) = arena.insert_tab(None, None, PaneTree::leaf(state(cwd)), 0);
        (tab, panes[0])
    }

    #[test]
    fn test_insert_tab_activates_it() {
        let mut arena = LayoutArena::new();
        let (first, _) = single(&mut arena, "/a");
        let (second, _) = single(&mut arena, "/b");
        assert_eq!(arena.active_tab(), Some(second));
        assert_eq!(arena.tab(first).unwrap().title, "Tab 1");
        assert_eq!(arena.tab(second).unwrap().title, "Tab 2");
        arena.assert_consistent();
    }

    #[test]
    fn test_child_tab_is_placed_after_parent() {
        let mut arena = LayoutArena::new();
        let (a, _) = single(&mut arena, "/a");
        let (b, _) = single(&mut arena, "/b");
        let (child, _) = arena.insert_tab(Some(a), Some("child".into()), PaneTree::leaf(state("/c")), 0);

        let order: Vec<TabId> = arena.tabs().iter().map(|t| t.id).collect();
        assert_eq!(order, vec![a, child, b]);
        assert_eq!(arena.tab(child).unwrap().parent, Some(a));

        arena.remove_tab(a);
        assert_eq!(arena.tab(child).unwrap().parent, None);
    }

    #[test]
    fn test_split_and_collapse() {
        let mut arena = LayoutArena::new();
        let (tab, first) = single(&mut arena, "/a");

        let second = arena
            .split_pane(first, SplitDirection::Vertical, state("/b"))
            .unwrap();
        let third = arena
            .split_pane(second, SplitDirection::Horizontal, state("/c"))
            .unwrap();
        arena.assert_consistent();
        assert_eq!(arena.panes_in_tab(tab), vec![first, second, third]);
        assert_eq!(arena.tab(tab).unwrap().active_pane, third);

        // Removing the middle pane lets its sibling take the split's place.
        let removed = arena.remove_pane(second).unwrap();
        assert!(matches!(removed, PaneRemoval::Collapsed(p) if p.id == second));
        arena.assert_consistent();
        assert_eq!(arena.panes_in_tab(tab), vec![first, third]);

        // Removing the active pane refocuses its sibling.
        arena.remove_pane(third).unwrap();
        arena.assert_consistent();
        assert_eq!(arena.tab(tab).unwrap().active_pane, first);
        assert!(matches!(arena.export_tab(tab), Some(PaneTree::Leaf(p)) if p.id == first));

        let last = arena.remove_pane(first).unwrap();
        assert!(matches!(last, PaneRemoval::ClosedTab { tab: t, .. } if t == tab));
        assert_eq!(arena.tab_count(), 0);
        assert_eq!(arena.pane_count(), 0);
        assert_eq!(arena.active_tab(), None);
    }

    #[test]
    fn test_remove_tab_returns_all_panes_and_reselects() {
        let mut arena = LayoutArena::new();
        let (a, _) = single(&mut arena, "/a");
        let tree = PaneTree::split(
            SplitDirection::Vertical,
            0.5,
            PaneTree::leaf(state("/1")),
            PaneTree::split(
                SplitDirection::Horizontal,
                0.5,
                PaneTree::leaf(state("/2")),
                PaneTree::leaf(state("/3")),
            ),
        );
        let (b, panes) = arena.insert_tab(None, None, tree, 2);
        assert_eq!(arena.tab(b).unwrap().active_pane, panes[2]);
        let (c, _) = single(&mut arena, "/c");
        arena.set_active_tab(b);

        let removed = arena.remove_tab(b).unwrap();
        let cwds: Vec<_> = removed.iter().map(|p| p.state.cwd.clone().unwrap()).collect();
        assert_eq!(cwds, vec!["/1", "/2", "/3"]);
        assert_eq!(arena.pane_count(), 2);
        // Same index: the tab that followed.
        assert_eq!(arena.active_tab(), Some(c));
        assert!(arena.tab(a).is_some());
        arena.assert_consistent();
    }

    #[test]
    fn test_export_round_trips_shape() {
        let mut arena = LayoutArena::new();
        let (tab, first) = single(&mut arena, "/a");
        arena
            .split_pane(first, SplitDirection::Horizontal, state("/b"))
            .unwrap();

        let tree = arena.export_tab(tab).unwrap();
        match tree {
            PaneTree::Split {
                direction,
                first,
                second,
                ..
            } => {
                assert_eq!(direction, SplitDirection::Horizontal);
                assert!(matches!(*first, PaneTree::Leaf(ref p) if p.state.cwd.as_deref() == Some("/a")));
                assert!(matches!(*second, PaneTree::Leaf(ref p) if p.state.cwd.as_deref() == Some("/b")));
            }
            PaneTree::Leaf(_) => panic!("expected a split"),
        }
        assert_eq!(arena.active_leaf_index(tab), 1);
    }

    #[test]
    fn test_focus_and_session_lookup() {
        let mut arena = LayoutArena::new();
        let (a, pane_a) = single(&mut arena, "/a");
        let (_b, _) = single(&mut arena, "/b");

        let session = SessionId::next();
        arena.pane_mut(pane_a).unwrap().state.session = Some(session);
        assert_eq!(arena.pane_for_session(session), Some(pane_a));
        assert_eq!(arena.sessions_in_tab(a), vec![session]);

        assert!(arena.focus_pane(pane_a));
        assert_eq!(arena.active_tab(), Some(a));
        assert!(!arena.focus_pane(PaneId(999)));
        assert!(arena.remove_pane(PaneId(999)).is_none());
    }
}
