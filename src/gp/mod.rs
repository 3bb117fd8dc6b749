pub mod build;

use std::collections::BTreeSet;
use std::fmt;

/// Handle to a node inside its owning `GpTree`'s arena.
///
/// Node identity is the handle: two ids are the same node exactly when they
/// are equal and come from the same tree. All the identity-based operations
/// (`contains`, `clone_replacing`, `replace_with`) work on these handles
/// rather than on structural equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The closed set of node kinds a genetic program is built from.
///
/// `ReadRegister` and `WriteRegister` are the two explicitly tagged register
/// shapes: a write is excluded from non-terminal counting and a read is
/// counted as its own category. Everything else is classified structurally,
/// by child count.
#[derive(Debug, Clone, PartialEq)]
pub enum GpNodeKind {
    Const(f64),
    Input(usize),
    ReadRegister(usize),
    WriteRegister(usize),
    Add,
    Sub,
    Mul,
    Div,
}

impl GpNodeKind {
    /// The arity contract for this kind. `None` would mean the arity is
    /// variable; every kind in the current set is fixed.
    pub fn expected_children(&self) -> Option<usize> {
        match self {
            Self::Const(_) | Self::Input(_) | Self::ReadRegister(_) => Some(0),
            Self::WriteRegister(_) => Some(1),
            Self::Add | Self::Sub | Self::Mul | Self::Div => Some(2),
        }
    }

    pub fn is_read_register(&self) -> bool {
        matches!(self, Self::ReadRegister(_))
    }

    pub fn is_write_register(&self) -> bool {
        matches!(self, Self::WriteRegister(_))
    }

    fn symbol(&self) -> String {
        match self {
            Self::Const(v) => format!("{v}"),
            Self::Input(i) => format!("x{i}"),
            Self::ReadRegister(r) => format!("r{r}"),
            Self::WriteRegister(r) => format!("r{r}:="),
            Self::Add => "+".to_string(),
            Self::Sub => "-".to_string(),
            Self::Mul => "*".to_string(),
            Self::Div => "/".to_string(),
        }
    }
}

/// Node categories for the counting and positional searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSearch {
    All,
    /// Nodes with no child slots.
    Terminals,
    /// Nodes with child slots, excluding register writes.
    Nonterminals,
    /// Leaves that are not register reads.
    Constants,
    ReadRegisters,
    /// Unfilled child slots, counted during construction.
    NullSlots,
}

#[derive(Debug, Clone)]
pub struct GpNode {
    pub kind: GpNodeKind,
    /// Child slots; `None` marks a slot not yet filled. The slot count is
    /// fixed by the kind's arity contract at construction.
    pub children: Vec<Option<NodeId>>,
    pub parent: Option<NodeId>,
    pub argposition: usize,
}

impl GpNode {
    pub fn new(kind: GpNodeKind) -> Self {
        let slots = kind.expected_children().unwrap_or(0);
        Self {
            kind,
            children: vec![None; slots],
            parent: None,
            argposition: 0,
        }
    }

    /// Shallow duplicate: copies the payload, leaves every child slot unset
    /// and resets parent/argposition. The clone never shares a mutable child
    /// slot vector with the original.
    fn light_clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            children: vec![None; self.children.len()],
            parent: None,
            argposition: 0,
        }
    }
}

/// One genetic-program expression tree.
///
/// The tree owns its nodes in an arena; structural surgery and clone/replace
/// operations manipulate `NodeId` handles. A tree is plain owned data, so
/// cloning an individual can never alias mutable node state with another
/// individual.
#[derive(Debug, Clone, Default)]
pub struct GpTree {
    nodes: Vec<GpNode>,
    root: Option<NodeId>,
}

impl GpTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a detached node into the arena and returns its handle.
    pub fn push(&mut self, node: GpNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &GpNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut GpNode {
        &mut self.nodes[id.0]
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Makes `id` the root. The root's parent link is cleared, upholding the
    /// invariant that only non-root nodes have parents.
    pub fn set_root(&mut self, id: NodeId) {
        self.nodes[id.0].parent = None;
        self.nodes[id.0].argposition = 0;
        self.root = Some(id);
    }

    /// Fills `parent`'s child slot `pos` with `child` and fixes the child's
    /// back-references.
    pub fn attach(&mut self, parent: NodeId, pos: usize, child: NodeId) {
        self.nodes[parent.0].children[pos] = Some(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[child.0].argposition = pos;
    }

    /// Depth of the subtree rooted at `id`; a leaf has depth 1.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut d = 0;
        for slot in &self.nodes[id.0].children {
            if let Some(child) = slot {
                d = d.max(self.depth(*child));
            }
        }
        d + 1
    }

    /// Number of ancestors above `id`; the root sits at depth 0.
    pub fn at_depth(&self, id: NodeId) -> usize {
        let mut count = 0;
        let mut cursor = self.nodes[id.0].parent;
        while let Some(p) = cursor {
            count += 1;
            cursor = self.nodes[p.0].parent;
        }
        count
    }

    fn matches(&self, id: NodeId, search: NodeSearch) -> bool {
        let node = &self.nodes[id.0];
        match search {
            NodeSearch::All => true,
            NodeSearch::Terminals => node.children.is_empty(),
            NodeSearch::Nonterminals => {
                !node.children.is_empty() && !node.kind.is_write_register()
            }
            NodeSearch::Constants => {
                node.children.is_empty() && !node.kind.is_read_register()
            }
            NodeSearch::ReadRegisters => node.kind.is_read_register(),
            // Null slots are counted in num_nodes, never matched as nodes.
            NodeSearch::NullSlots => false,
        }
    }

    /// Counts nodes of the given category in the subtree rooted at `id`.
    /// `NodeSearch::NullSlots` counts unfilled child slots instead.
    pub fn num_nodes(&self, id: NodeId, search: NodeSearch) -> usize {
        let mut s = 0;
        for slot in &self.nodes[id.0].children {
            match slot {
                Some(child) => s += self.num_nodes(*child, search),
                None => {
                    if search == NodeSearch::NullSlots {
                        s += 1;
                    }
                }
            }
        }
        s + usize::from(self.matches(id, search))
    }

    /// Pre-order search for the `p`-th node of the given category below
    /// `id`. Returns `Err(remaining)` when fewer than `p + 1` matches exist,
    /// so a caller walking several trees can carry the count across them.
    pub fn node_in_position(
        &self,
        id: NodeId,
        p: usize,
        search: NodeSearch,
    ) -> Result<NodeId, usize> {
        let mut p = p;
        if self.matches(id, search) {
            if p == 0 {
                return Ok(id);
            }
            p -= 1;
        }
        for slot in &self.nodes[id.0].children {
            if let Some(child) = slot {
                match self.node_in_position(*child, p, search) {
                    Ok(found) => return Ok(found),
                    Err(remaining) => p = remaining,
                }
            }
        }
        Err(p)
    }

    /// Identity-based reachability: is `target` the node `ancestor` or one of
    /// its descendants?
    pub fn contains(&self, ancestor: NodeId, target: NodeId) -> bool {
        if ancestor == target {
            return true;
        }
        self.nodes[ancestor.0]
            .children
            .iter()
            .flatten()
            .any(|child| self.contains(*child, target))
    }

    /// Recursively copies the subtree rooted at `src` into `dest`, fixing
    /// parent/argposition links on the new nodes. Unset slots stay unset.
    fn copy_subtree_into(&self, src: NodeId, dest: &mut GpTree) -> NodeId {
        let new_id = dest.push(self.nodes[src.0].light_clone());
        for pos in 0..self.nodes[src.0].children.len() {
            if let Some(child) = self.nodes[src.0].children[pos] {
                let new_child = self.copy_subtree_into(child, dest);
                dest.attach(new_id, pos, new_child);
            }
        }
        new_id
    }

    /// Full deep copy. The returned tree shares no node handles with the
    /// source; orphaned arena entries are not carried over.
    pub fn deep_clone(&self) -> GpTree {
        let mut out = GpTree::new();
        if let Some(root) = self.root {
            let new_root = self.copy_subtree_into(root, &mut out);
            out.set_root(new_root);
        }
        out
    }

    fn copy_replacing(
        &self,
        cur: NodeId,
        old: NodeId,
        donor: &GpTree,
        donor_root: NodeId,
        dest: &mut GpTree,
    ) -> NodeId {
        if cur == old {
            return donor.copy_subtree_into(donor_root, dest);
        }
        let new_id = dest.push(self.nodes[cur.0].light_clone());
        for pos in 0..self.nodes[cur.0].children.len() {
            if let Some(child) = self.nodes[cur.0].children[pos] {
                let new_child = self.copy_replacing(child, old, donor, donor_root, dest);
                dest.attach(new_id, pos, new_child);
            }
        }
        new_id
    }

    /// Deep-clones the whole tree, except that the subtree at `old` is
    /// replaced with a deep clone of the donor subtree. Neither this tree nor
    /// the donor is touched, which is what lets breeding operators read
    /// parents without mutating them.
    pub fn clone_replacing(
        &self,
        donor: &GpTree,
        donor_root: NodeId,
        old: NodeId,
    ) -> GpTree {
        let mut out = GpTree::new();
        if let Some(root) = self.root {
            let new_root = self.copy_replacing(root, old, donor, donor_root, &mut out);
            out.set_root(new_root);
        }
        out
    }

    /// Moves every node of `subtree` into this arena, renumbering handles by
    /// offset, and returns the new handle of `subtree`'s root.
    fn splice_owned(&mut self, subtree: GpTree) -> Option<NodeId> {
        let offset = self.nodes.len();
        let root = subtree.root?;
        for mut node in subtree.nodes {
            node.parent = node.parent.map(|p| NodeId(p.0 + offset));
            for slot in node.children.iter_mut() {
                *slot = slot.map(|c| NodeId(c.0 + offset));
            }
            self.nodes.push(node);
        }
        Some(NodeId(root.0 + offset))
    }

    /// Like `clone_replacing`, but splices in the freshly built `subtree` by
    /// move instead of cloning it. Taking it by value is what guarantees the
    /// caller held it exclusively. If `old` is not reachable from the root
    /// the graft is dropped and a plain clone comes back.
    pub fn clone_replacing_owned(&self, subtree: GpTree, old: NodeId) -> GpTree {
        let mut out = self.clone_replacing_skipping(old);
        match out.hole {
            Hole::Slot(parent, pos) => {
                if let Some(spliced_root) = out.tree.splice_owned(subtree) {
                    out.tree.attach(parent, pos, spliced_root);
                }
            }
            Hole::Root => {
                if let Some(spliced_root) = out.tree.splice_owned(subtree) {
                    out.tree.set_root(spliced_root);
                }
            }
            Hole::None => {}
        }
        out.tree
    }

    /// Deep-clones the tree leaving a hole where `old` was; records where the
    /// hole is so a replacement can be attached.
    fn clone_replacing_skipping(&self, old: NodeId) -> CloneWithHole {
        let mut out = CloneWithHole {
            tree: GpTree::new(),
            hole: Hole::None,
        };
        if let Some(root) = self.root {
            if root == old {
                out.hole = Hole::Root;
                return out;
            }
            let new_root = self.copy_skipping(root, old, &mut out);
            out.tree.set_root(new_root);
        }
        out
    }

    fn copy_skipping(&self, cur: NodeId, old: NodeId, out: &mut CloneWithHole) -> NodeId {
        let new_id = out.tree.push(self.nodes[cur.0].light_clone());
        for pos in 0..self.nodes[cur.0].children.len() {
            match self.nodes[cur.0].children[pos] {
                Some(child) if child == old => {
                    out.hole = Hole::Slot(new_id, pos);
                }
                Some(child) => {
                    let new_child = self.copy_skipping(child, old, out);
                    out.tree.attach(new_id, pos, new_child);
                }
                None => {}
            }
        }
        new_id
    }

    /// Structural surgery: `new` (a detached node in this arena) takes over
    /// the exact slot `old` occupied, whether that slot is a parent's child
    /// slot or the tree's root, and inherits `old`'s children with their
    /// argpositions renumbered from 0.
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) {
        let parent = self.nodes[old.0].parent;
        let pos = self.nodes[old.0].argposition;

        self.nodes[new.0].parent = parent;
        self.nodes[new.0].argposition = pos;
        match parent {
            Some(p) => self.nodes[p.0].children[pos] = Some(new),
            None => {
                if self.root == Some(old) {
                    self.root = Some(new);
                }
            }
        }

        let kids = std::mem::take(&mut self.nodes[old.0].children);
        for (i, slot) in kids.iter().enumerate() {
            if let Some(child) = slot {
                self.nodes[child.0].parent = Some(new);
                self.nodes[child.0].argposition = i;
            }
        }
        self.nodes[new.0].children = kids;
        self.nodes[old.0].parent = None;
    }

    /// Structural equality of two rooted subtrees: same kind and same arity
    /// at every aligned position, recursively.
    pub fn rooted_tree_equals(&self, a: NodeId, other: &GpTree, b: NodeId) -> bool {
        let na = &self.nodes[a.0];
        let nb = &other.nodes[b.0];
        if na.kind != nb.kind || na.children.len() != nb.children.len() {
            return false;
        }
        na.children
            .iter()
            .zip(&nb.children)
            .all(|pair| match pair {
                (Some(ca), Some(cb)) => self.rooted_tree_equals(*ca, other, *cb),
                (None, None) => true,
                _ => false,
            })
    }

    /// Whole-tree structural equality.
    pub fn tree_equals(&self, other: &GpTree) -> bool {
        match (self.root, other.root) {
            (Some(a), Some(b)) => self.rooted_tree_equals(a, other, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Checks the ownership invariants for every node reachable from the
    /// root: back-references consistent with child slots, arity matching the
    /// kind's contract. Violations are programmer errors, so this runs at
    /// setup time and in tests, not on the breeding hot path.
    pub fn validate(&self) -> Result<(), String> {
        let Some(root) = self.root else {
            return Ok(());
        };
        if self.nodes[root.0].parent.is_some() {
            return Err("root node has a parent link".to_string());
        }
        self.validate_from(root)
    }

    fn validate_from(&self, id: NodeId) -> Result<(), String> {
        let node = &self.nodes[id.0];
        if let Some(expected) = node.kind.expected_children() {
            if node.children.len() != expected {
                return Err(format!(
                    "node {:?} has {} child slots, its kind expects {}",
                    node.kind,
                    node.children.len(),
                    expected
                ));
            }
        }
        for (pos, slot) in node.children.iter().enumerate() {
            if let Some(child) = slot {
                let c = &self.nodes[child.0];
                if c.parent != Some(id) || c.argposition != pos {
                    return Err(format!(
                        "child at slot {pos} of {:?} has stale back-references",
                        node.kind
                    ));
                }
                self.validate_from(*child)?;
            }
        }
        Ok(())
    }

    fn eval_child(&self, id: NodeId, n: usize, inputs: &[f64], registers: &mut [f64]) -> f64 {
        match self.nodes[id.0].children.get(n).copied().flatten() {
            Some(child) => self.execute_from(child, inputs, registers),
            None => 0.0,
        }
    }

    /// Evaluates the subtree at `id` over the given inputs and register
    /// file. Division is protected: a near-zero divisor yields 1.0.
    pub fn execute_from(&self, id: NodeId, inputs: &[f64], registers: &mut [f64]) -> f64 {
        let kind = self.nodes[id.0].kind.clone();
        match kind {
            GpNodeKind::Const(v) => v,
            GpNodeKind::Input(i) => inputs.get(i).copied().unwrap_or(0.0),
            GpNodeKind::ReadRegister(r) => registers.get(r).copied().unwrap_or(0.0),
            GpNodeKind::WriteRegister(r) => {
                let v = self.eval_child(id, 0, inputs, registers);
                if let Some(cell) = registers.get_mut(r) {
                    *cell = v;
                }
                v
            }
            GpNodeKind::Add => {
                self.eval_child(id, 0, inputs, registers) + self.eval_child(id, 1, inputs, registers)
            }
            GpNodeKind::Sub => {
                self.eval_child(id, 0, inputs, registers) - self.eval_child(id, 1, inputs, registers)
            }
            GpNodeKind::Mul => {
                self.eval_child(id, 0, inputs, registers) * self.eval_child(id, 1, inputs, registers)
            }
            GpNodeKind::Div => {
                let a = self.eval_child(id, 0, inputs, registers);
                let b = self.eval_child(id, 1, inputs, registers);
                if b.abs() < 1e-9 { 1.0 } else { a / b }
            }
        }
    }

    /// Evaluates the whole tree; an unbuilt tree yields 0.0.
    pub fn execute(&self, inputs: &[f64], registers: &mut [f64]) -> f64 {
        match self.root {
            Some(root) => self.execute_from(root, inputs, registers),
            None => 0.0,
        }
    }

    /// Collects the indices of every register read below `id`.
    pub fn collect_read_registers(&self, id: NodeId, out: &mut BTreeSet<usize>) {
        if let GpNodeKind::ReadRegister(r) = self.nodes[id.0].kind {
            out.insert(r);
        }
        for slot in &self.nodes[id.0].children {
            if let Some(child) = slot {
                self.collect_read_registers(*child, out);
            }
        }
    }

    fn render(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        if node.children.is_empty() {
            out.push_str(&node.kind.symbol());
            return;
        }
        out.push('(');
        out.push_str(&node.kind.symbol());
        for slot in &node.children {
            out.push(' ');
            match slot {
                Some(child) => self.render(*child, out),
                None => out.push('?'),
            }
        }
        out.push(')');
    }
}

impl fmt::Display for GpTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => {
                let mut out = String::new();
                self.render(root, &mut out);
                write!(f, "{out}")
            }
            None => write!(f, "<unbuilt>"),
        }
    }
}

struct CloneWithHole {
    tree: GpTree,
    hole: Hole,
}

/// Where the skipped node sat in the clone, if it sat anywhere at all.
enum Hole {
    None,
    Root,
    Slot(NodeId, usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// (+ x0 3.0)
    fn small_tree() -> (GpTree, NodeId, NodeId, NodeId) {
        let mut t = GpTree::new();
        let root = t.push(GpNode::new(GpNodeKind::Add));
        let left = t.push(GpNode::new(GpNodeKind::Input(0)));
        let right = t.push(GpNode::new(GpNodeKind::Const(3.0)));
        t.attach(root, 0, left);
        t.attach(root, 1, right);
        t.set_root(root);
        (t, root, left, right)
    }

    /// (r0:= (* (+ x0 r0) 2.0))
    fn register_tree() -> GpTree {
        let mut t = GpTree::new();
        let write = t.push(GpNode::new(GpNodeKind::WriteRegister(0)));
        let mul = t.push(GpNode::new(GpNodeKind::Mul));
        let add = t.push(GpNode::new(GpNodeKind::Add));
        let x = t.push(GpNode::new(GpNodeKind::Input(0)));
        let r = t.push(GpNode::new(GpNodeKind::ReadRegister(0)));
        let two = t.push(GpNode::new(GpNodeKind::Const(2.0)));
        t.attach(write, 0, mul);
        t.attach(mul, 0, add);
        t.attach(mul, 1, two);
        t.attach(add, 0, x);
        t.attach(add, 1, r);
        t.set_root(write);
        t
    }

    #[test]
    fn test_depth_and_counts_on_arity_two_root() {
        let (t, root, _, _) = small_tree();
        assert_eq!(t.depth(root), 2);
        assert_eq!(t.num_nodes(root, NodeSearch::All), 3);
        assert_eq!(t.num_nodes(root, NodeSearch::Terminals), 2);
        assert_eq!(t.num_nodes(root, NodeSearch::Nonterminals), 1);
    }

    #[test]
    fn test_register_shapes_classified_by_tag_not_arity() {
        let t = register_tree();
        let root = t.root().unwrap();
        assert_eq!(t.num_nodes(root, NodeSearch::All), 6);
        // The write-register root has children but is not a non-terminal.
        assert_eq!(t.num_nodes(root, NodeSearch::Nonterminals), 2);
        assert_eq!(t.num_nodes(root, NodeSearch::ReadRegisters), 1);
        // The register read is a leaf but not a constant.
        assert_eq!(t.num_nodes(root, NodeSearch::Constants), 2);
    }

    #[test]
    fn test_null_slots_counted_separately() {
        let mut t = GpTree::new();
        let root = t.push(GpNode::new(GpNodeKind::Add));
        let left = t.push(GpNode::new(GpNodeKind::Input(0)));
        t.attach(root, 0, left);
        t.set_root(root);
        assert_eq!(t.num_nodes(root, NodeSearch::NullSlots), 1);
        assert_eq!(t.num_nodes(root, NodeSearch::All), 2);
    }

    #[test]
    fn test_node_in_position_preorder_and_sentinel() {
        let (t, root, left, right) = small_tree();
        assert_eq!(t.node_in_position(root, 0, NodeSearch::All), Ok(root));
        assert_eq!(t.node_in_position(root, 1, NodeSearch::All), Ok(left));
        assert_eq!(t.node_in_position(root, 2, NodeSearch::All), Ok(right));
        assert_eq!(t.node_in_position(root, 0, NodeSearch::Terminals), Ok(left));
        // Two terminals exist, so asking for the fifth leaves three over.
        assert_eq!(t.node_in_position(root, 4, NodeSearch::Terminals), Err(2));
    }

    #[test]
    fn test_contains_is_identity_based() {
        let (t, root, left, _) = small_tree();
        let (t2, _, left2, _) = small_tree();
        assert!(t.contains(root, left));
        assert!(!t.contains(left, root));
        // A structurally identical node from another tree is a different id
        // space entirely; within this tree, a detached node is unreachable.
        let mut t3 = t.clone();
        let stray = t3.push(GpNode::new(GpNodeKind::Input(0)));
        assert!(!t3.contains(root, stray));
        assert!(t2.contains(t2.root().unwrap(), left2));
    }

    #[test]
    fn test_deep_clone_is_isolated_and_structurally_equal() {
        let t = register_tree();
        let mut c = t.deep_clone();
        assert!(t.tree_equals(&c));
        assert!(c.validate().is_ok());

        // Mutating the clone must never be observable in the original.
        let c_root = c.root().unwrap();
        c.node_mut(c_root).kind = GpNodeKind::WriteRegister(7);
        assert!(!t.tree_equals(&c));
        assert!(matches!(
            t.node(t.root().unwrap()).kind,
            GpNodeKind::WriteRegister(0)
        ));
    }

    #[test]
    fn test_clone_replacing_splices_donor_copy() {
        let (t, _, left, _) = small_tree();
        let donor = register_tree();
        let out = t.clone_replacing(&donor, donor.root().unwrap(), left);

        assert!(out.validate().is_ok());
        let out_root = out.root().unwrap();
        // (+ (r0:= ...) 3.0): original x0 replaced by the donor subtree.
        assert_eq!(out.num_nodes(out_root, NodeSearch::All), 8);
        assert_eq!(out.num_nodes(out_root, NodeSearch::ReadRegisters), 1);
        // Parents untouched.
        assert_eq!(t.num_nodes(t.root().unwrap(), NodeSearch::All), 3);
        assert_eq!(donor.num_nodes(donor.root().unwrap(), NodeSearch::All), 6);
    }

    #[test]
    fn test_clone_replacing_at_root_yields_donor_clone() {
        let (t, root, _, _) = small_tree();
        let donor = register_tree();
        let out = t.clone_replacing(&donor, donor.root().unwrap(), root);
        assert!(out.tree_equals(&donor));
    }

    #[test]
    fn test_clone_replacing_owned_moves_subtree() {
        let (t, _, _, right) = small_tree();
        let fresh = register_tree();
        let out = t.clone_replacing_owned(fresh, right);

        assert!(out.validate().is_ok());
        let out_root = out.root().unwrap();
        assert_eq!(out.num_nodes(out_root, NodeSearch::All), 8);
        assert_eq!(out.depth(out_root), 5);
    }

    #[test]
    fn test_clone_replacing_owned_at_root() {
        let (t, root, _, _) = small_tree();
        let fresh = register_tree();
        let expected = fresh.deep_clone();
        let out = t.clone_replacing_owned(fresh, root);
        assert!(out.tree_equals(&expected));
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_clone_replacing_owned_unreachable_target_drops_graft() {
        let (mut t, _, _, _) = small_tree();
        let stray = t.push(GpNode::new(GpNodeKind::Input(0)));
        let fresh = register_tree();
        let out = t.clone_replacing_owned(fresh, stray);
        // The detached node was never part of the tree, so the graft is
        // discarded and the result is just a clone.
        assert!(out.tree_equals(&t));
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_replace_with_reparents_and_rehomes_children() {
        let (mut t, root, left, right) = small_tree();
        let new = t.push(GpNode::new(GpNodeKind::Mul));
        t.replace_with(root, new);

        assert_eq!(t.root(), Some(new));
        assert_eq!(t.node(new).children[0], Some(left));
        assert_eq!(t.node(new).children[1], Some(right));
        assert_eq!(t.node(left).parent, Some(new));
        assert_eq!(t.node(left).argposition, 0);
        assert_eq!(t.node(right).parent, Some(new));
        assert_eq!(t.node(right).argposition, 1);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_replace_with_under_a_parent() {
        let (mut t, root, left, _) = small_tree();
        let new = t.push(GpNode::new(GpNodeKind::ReadRegister(1)));
        t.replace_with(left, new);

        assert_eq!(t.node(root).children[0], Some(new));
        assert_eq!(t.node(new).parent, Some(root));
        assert_eq!(t.node(new).argposition, 0);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_rooted_tree_equals_compares_kind_and_arity() {
        let (a, _, _, _) = small_tree();
        let (b, _, _, _) = small_tree();
        assert!(a.tree_equals(&b));

        let mut c = b.clone();
        let c_root = c.root().unwrap();
        c.node_mut(c_root).kind = GpNodeKind::Sub;
        assert!(!a.tree_equals(&c));

        let mut d = b.clone();
        let d_left = d.node(d.root().unwrap()).children[0].unwrap();
        d.node_mut(d_left).kind = GpNodeKind::Input(1);
        assert!(!a.tree_equals(&d));
    }

    #[test]
    fn test_execute_arithmetic_and_registers() {
        let (t, _, _, _) = small_tree();
        let mut regs = [0.0];
        assert_eq!(t.execute(&[2.0], &mut regs), 5.0);

        let rt = register_tree();
        let mut regs = [10.0];
        // (x0 + r0) * 2 = (2 + 10) * 2 = 24, written back to r0.
        assert_eq!(rt.execute(&[2.0], &mut regs), 24.0);
        assert_eq!(regs[0], 24.0);
    }

    #[test]
    fn test_protected_division() {
        let mut t = GpTree::new();
        let root = t.push(GpNode::new(GpNodeKind::Div));
        let a = t.push(GpNode::new(GpNodeKind::Const(4.0)));
        let b = t.push(GpNode::new(GpNodeKind::Const(0.0)));
        t.attach(root, 0, a);
        t.attach(root, 1, b);
        t.set_root(root);
        let mut regs: [f64; 0] = [];
        assert_eq!(t.execute(&[], &mut regs), 1.0);
    }

    #[test]
    fn test_collect_read_registers() {
        let t = register_tree();
        let mut set = BTreeSet::new();
        t.collect_read_registers(t.root().unwrap(), &mut set);
        assert_eq!(set.into_iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_at_depth() {
        let t = register_tree();
        let root = t.root().unwrap();
        let mul = t.node(root).children[0].unwrap();
        let add = t.node(mul).children[0].unwrap();
        let x = t.node(add).children[0].unwrap();
        assert_eq!(t.at_depth(root), 0);
        assert_eq!(t.at_depth(x), 3);
    }

    #[test]
    fn test_display_renders_lisp_style() {
        let (t, _, _, _) = small_tree();
        assert_eq!(t.to_string(), "(+ x0 3)");
    }
}
