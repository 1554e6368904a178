//! Schedule trees.
//!
//! A schedule tree is stored as an arena of nodes addressed by [`NodeId`].
//! Nodes only know their children. Every editing primitive keeps the id of
//! the subtree root it rewrites stable, so a caller walking the tree never
//! has to patch a parent's child list. Rewrites leave unreachable nodes
//! behind in the arena; [`ScheduleTree::compact`] drops them.

use crate::ir::scop::StmtId;
use crate::polyhedral::{IntegerSet, QuasiAffine};
use crate::utils::errors::{TransformError, TransformErrorKind, TransformResult};
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Index of a node in the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-member properties of a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BandMember {
    /// The member may be interchanged with the other permutable members
    pub permutable: bool,
    /// No dependence is carried by this member
    pub coincident: bool,
}

impl BandMember {
    pub fn new(permutable: bool, coincident: bool) -> Self {
        Self { permutable, coincident }
    }

    /// A permutable member.
    pub fn permutable(coincident: bool) -> Self {
        Self::new(true, coincident)
    }
}

/// Annotation attached to a band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mark {
    /// Outer band produced by tiling
    Tiles(String),
    /// Inner band produced by tiling
    Points(String),
    /// Trivially vectorizable loop
    Simd,
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::Tiles(id) => write!(f, "{} - Tiles", id),
            Mark::Points(id) => write!(f, "{} - Points", id),
            Mark::Simd => write!(f, "SIMD"),
        }
    }
}

/// Loop generation hint for code generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopOption {
    #[default]
    Default,
    /// Fully unroll, no residual loop
    Unroll,
    /// Never unroll
    NoUnroll,
}

/// A band: a group of schedule dimensions with a partial schedule per
/// statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub members: Vec<BandMember>,
    /// One expression per member, over the statement's iterators and the
    /// parameters.
    pub schedule: BTreeMap<StmtId, Vec<QuasiAffine>>,
    pub marks: Vec<Mark>,
    pub loop_option: LoopOption,
}

impl Band {
    pub fn new(members: Vec<BandMember>, schedule: BTreeMap<StmtId, Vec<QuasiAffine>>) -> Self {
        Self {
            members,
            schedule,
            marks: Vec::new(),
            loop_option: LoopOption::Default,
        }
    }

    /// Band whose member `m` is iterator `m` of every statement.
    pub fn identity(domains: &BTreeMap<StmtId, IntegerSet>, members: Vec<BandMember>) -> Self {
        let schedule = domains.iter()
            .map(|(&stmt, domain)| {
                let exprs = (0..members.len())
                    .map(|m| {
                        if m < domain.n_dim {
                            QuasiAffine::var(m, domain.n_dim, domain.n_param)
                        } else {
                            QuasiAffine::constant(0, domain.n_dim, domain.n_param)
                        }
                    })
                    .collect();
                (stmt, exprs)
            })
            .collect();
        Self::new(members, schedule)
    }

    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    /// True if the band has members and all of them are permutable.
    pub fn is_permutable(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.permutable)
    }

    pub fn statements(&self) -> impl Iterator<Item = StmtId> + '_ {
        self.schedule.keys().copied()
    }

    pub fn member_expr(&self, stmt: StmtId, member: usize) -> Option<&QuasiAffine> {
        self.schedule.get(&stmt).and_then(|exprs| exprs.get(member))
    }

    pub fn has_mark(&self, mark: &Mark) -> bool {
        self.marks.contains(mark)
    }

    /// The given members, in the given order, without marks.
    fn select(&self, members: &[usize]) -> Band {
        Band {
            members: members.iter().map(|&m| self.members[m]).collect(),
            schedule: self.schedule.iter()
                .map(|(&s, exprs)| (s, members.iter().map(|&m| exprs[m].clone()).collect()))
                .collect(),
            marks: Vec::new(),
            loop_option: self.loop_option,
        }
    }

    /// The band restricted to a set of statements.
    fn restrict(&self, stmts: &BTreeSet<StmtId>) -> Band {
        Band {
            schedule: self.schedule.iter()
                .filter(|(s, _)| stmts.contains(s))
                .map(|(&s, exprs)| (s, exprs.clone()))
                .collect(),
            ..self.clone()
        }
    }
}

/// Which side of a full/partial tile split a filter selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    Full,
    Partial,
}

/// Filter produced by full/partial tile isolation.
///
/// An instance of statement `S` is in a full tile iff `guards[S]` is
/// `Some(g)` and every expression of `g` is non-negative at the instance.
/// Statements whose guard is `None` never form full tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileFilter {
    pub kind: TileKind,
    pub width: i64,
    pub guards: BTreeMap<StmtId, Option<Vec<QuasiAffine>>>,
}

impl TileFilter {
    pub fn in_full_tile(&self, stmt: StmtId, point: &[i64], params: &[i64]) -> bool {
        match self.guards.get(&stmt) {
            Some(Some(guard)) => guard.iter().all(|e| e.evaluate(point, params) >= 0),
            _ => false,
        }
    }
}

/// Restriction of the instances flowing below a filter node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Statements(BTreeSet<StmtId>),
    Tiles(TileFilter),
}

impl Filter {
    /// True if the instance passes the filter.
    pub fn admits(&self, stmt: StmtId, point: &[i64], params: &[i64]) -> bool {
        match self {
            Filter::Statements(stmts) => stmts.contains(&stmt),
            Filter::Tiles(tiles) => match tiles.kind {
                TileKind::Full => tiles.in_full_tile(stmt, point, params),
                TileKind::Partial => !tiles.in_full_tile(stmt, point, params),
            },
        }
    }

    /// True if some instance of `stmt` may pass the filter.
    pub fn may_admit(&self, stmt: StmtId) -> bool {
        match self {
            Filter::Statements(stmts) => stmts.contains(&stmt),
            Filter::Tiles(tiles) => match tiles.kind {
                TileKind::Full => matches!(tiles.guards.get(&stmt), Some(Some(_))),
                TileKind::Partial => true,
            },
        }
    }
}

/// Kind of a schedule tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Root: iteration domain of every statement
    Domain(BTreeMap<StmtId, IntegerSet>),
    Band(Band),
    /// Ordered children, each a filter
    Sequence,
    /// Unordered children, each a filter
    Set,
    Filter(Filter),
    Leaf,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Domain(_) => "domain",
            NodeKind::Band(_) => "band",
            NodeKind::Sequence => "sequence",
            NodeKind::Set => "set",
            NodeKind::Filter(_) => "filter",
            NodeKind::Leaf => "leaf",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
}

/// A schedule tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl ScheduleTree {
    /// A domain node with a single leaf below it.
    pub fn from_domain(domains: BTreeMap<StmtId, IntegerSet>) -> Self {
        let nodes = vec![
            Node { kind: NodeKind::Domain(domains), children: vec![NodeId(1)] },
            Node { kind: NodeKind::Leaf, children: Vec::new() },
        ];
        Self { nodes, root: NodeId(0) }
    }

    /// Domain, one identity band over all statements, leaf.
    pub fn single_band(domains: BTreeMap<StmtId, IntegerSet>, members: Vec<BandMember>) -> Self {
        let band = Band::identity(&domains, members);
        let nodes = vec![
            Node { kind: NodeKind::Domain(domains), children: vec![NodeId(1)] },
            Node { kind: NodeKind::Band(band), children: vec![NodeId(2)] },
            Node { kind: NodeKind::Leaf, children: Vec::new() },
        ];
        Self { nodes, root: NodeId(0) }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of arena slots, including unreachable ones.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|n| &n.kind)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn band(&self, id: NodeId) -> Option<&Band> {
        match self.kind(id) {
            Some(NodeKind::Band(band)) => Some(band),
            _ => None,
        }
    }

    pub fn band_mut(&mut self, id: NodeId) -> Option<&mut Band> {
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Band(band)) => Some(band),
            _ => None,
        }
    }

    /// Statement domains bound by the root.
    pub fn domains(&self) -> Option<&BTreeMap<StmtId, IntegerSet>> {
        match self.kind(self.root) {
            Some(NodeKind::Domain(domains)) => Some(domains),
            _ => None,
        }
    }

    /// True if every reachable id is in range and reached exactly once.
    pub fn is_well_formed(&self) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if id.0 >= self.nodes.len() || !seen.insert(id) {
                return false;
            }
            stack.extend(self.nodes[id.0].children.iter().copied());
        }
        true
    }

    /// Reachable nodes below and including `id`, in pre-order.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.node(current) {
                order.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// All reachable band nodes in pre-order.
    pub fn bands(&self) -> Vec<NodeId> {
        self.subtree(self.root)
            .into_iter()
            .filter(|&id| self.band(id).is_some())
            .collect()
    }

    /// True if a band occurs strictly below `id`.
    pub fn has_band_below(&self, id: NodeId) -> bool {
        self.subtree(id).into_iter().skip(1).any(|n| self.band(n).is_some())
    }

    /// Path from the root to `id`, both included.
    pub fn path_to(&self, id: NodeId) -> Option<Vec<NodeId>> {
        fn walk(tree: &ScheduleTree, current: NodeId, target: NodeId, path: &mut Vec<NodeId>) -> bool {
            path.push(current);
            if current == target {
                return true;
            }
            for &child in tree.children(current) {
                if walk(tree, child, target, path) {
                    return true;
                }
            }
            path.pop();
            false
        }
        let mut path = Vec::new();
        if walk(self, self.root, id, &mut path) { Some(path) } else { None }
    }

    /// Statements that may have instances reaching `id`.
    pub fn reaching_statements(&self, id: NodeId) -> BTreeSet<StmtId> {
        let mut stmts: BTreeSet<StmtId> = self.domains()
            .map(|d| d.keys().copied().collect())
            .unwrap_or_default();
        let path = self.path_to(id).unwrap_or_default();
        for ancestor in &path {
            if let Some(NodeKind::Filter(filter)) = self.kind(*ancestor) {
                stmts.retain(|&s| filter.may_admit(s));
            }
        }
        stmts
    }

    fn push(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        self.nodes.push(Node { kind, children });
        NodeId(self.nodes.len() - 1)
    }

    fn node_checked(&self, id: NodeId, transform: &str) -> TransformResult<&Node> {
        self.node(id).ok_or_else(|| {
            TransformError::new(
                format!("node {} does not exist", id),
                TransformErrorKind::InvalidNode,
                transform,
            )
        })
    }

    fn band_checked(&self, id: NodeId, transform: &str) -> TransformResult<&Band> {
        match &self.node_checked(id, transform)?.kind {
            NodeKind::Band(band) => Ok(band),
            other => Err(TransformError::new(
                format!("expected a band at {}, found a {} node", id, other.name()),
                TransformErrorKind::NotABand,
                transform,
            )),
        }
    }

    /// Insert a node of `kind` at `id`, moving the old content of `id` to a
    /// fresh slot that becomes its only child. Returns the fresh slot.
    pub fn insert_above(&mut self, id: NodeId, kind: NodeKind) -> TransformResult<NodeId> {
        self.node_checked(id, "insert_above")?;
        let moved = std::mem::replace(
            &mut self.nodes[id.0],
            Node { kind, children: Vec::new() },
        );
        let moved_id = self.push(moved.kind, moved.children);
        self.nodes[id.0].children = vec![moved_id];
        Ok(moved_id)
    }

    /// Split the band at `id` after `pos` members. The first `pos` members
    /// stay at `id`, the rest move to a new child band whose id is returned.
    pub fn band_split(&mut self, id: NodeId, pos: usize) -> TransformResult<NodeId> {
        let band = self.band_checked(id, "band_split")?;
        let n = band.n_members();
        if pos == 0 || pos >= n {
            return Err(TransformError::new(
                format!("cannot split a band of {} members at {}", n, pos),
                TransformErrorKind::DimensionOutOfRange,
                "band_split",
            ));
        }
        let outer: Vec<usize> = (0..pos).collect();
        let inner: Vec<usize> = (pos..n).collect();
        let mut outer_band = band.select(&outer);
        outer_band.marks = band.marks.clone();
        let inner_band = band.select(&inner);

        let children = std::mem::take(&mut self.nodes[id.0].children);
        let inner_id = self.push(NodeKind::Band(inner_band), children);
        self.nodes[id.0] = Node { kind: NodeKind::Band(outer_band), children: vec![inner_id] };
        Ok(inner_id)
    }

    /// Tile the band at `id`: member `d` with expression `e` becomes
    /// `floor(e / sizes[d])` at `id` and `e mod sizes[d]` in a new child
    /// point band whose id is returned. Flags are copied to both bands.
    pub fn band_tile(&mut self, id: NodeId, sizes: &[i64]) -> TransformResult<NodeId> {
        let band = self.band_checked(id, "band_tile")?;
        if sizes.len() != band.n_members() {
            return Err(TransformError::new(
                format!("{} tile sizes for a band of {} members", sizes.len(), band.n_members()),
                TransformErrorKind::DimensionOutOfRange,
                "band_tile",
            ));
        }
        if let Some(bad) = sizes.iter().find(|&&s| s < 1) {
            return Err(TransformError::new(
                format!("tile size {} is not positive", bad),
                TransformErrorKind::InvalidTileSize,
                "band_tile",
            ));
        }
        let mut tile = band.clone();
        let mut point = Band::new(band.members.clone(), BTreeMap::new());
        for (stmt, exprs) in &band.schedule {
            let tiles = exprs.iter().zip(sizes).map(|(e, &t)| e.floor_div(t)).collect();
            let points = exprs.iter().zip(sizes).map(|(e, &t)| e.modulo(t)).collect();
            tile.schedule.insert(*stmt, tiles);
            point.schedule.insert(*stmt, points);
        }

        let children = std::mem::take(&mut self.nodes[id.0].children);
        let point_id = self.push(NodeKind::Band(point), children);
        self.nodes[id.0] = Node { kind: NodeKind::Band(tile), children: vec![point_id] };
        Ok(point_id)
    }

    /// Reorder the members of the band at `id`: new member `i` is old member
    /// `perm[i]`.
    pub fn band_permute(&mut self, id: NodeId, perm: &[usize]) -> TransformResult<()> {
        let band = self.band_checked(id, "band_permute")?;
        let n = band.n_members();
        let mut seen = vec![false; n];
        for &p in perm {
            if p >= n || std::mem::replace(&mut seen[p], true) {
                return Err(TransformError::new(
                    format!("{:?} is not a permutation of {} members", perm, n),
                    TransformErrorKind::DimensionOutOfRange,
                    "band_permute",
                ));
            }
        }
        if perm.len() != n {
            return Err(TransformError::new(
                format!("{:?} is not a permutation of {} members", perm, n),
                TransformErrorKind::DimensionOutOfRange,
                "band_permute",
            ));
        }
        let mut permuted = band.select(perm);
        permuted.marks = band.marks.clone();
        if let Some(slot) = self.band_mut(id) {
            *slot = permuted;
        }
        Ok(())
    }

    /// Sink the band at `id` to just above every leaf of its subtree. Each
    /// copy is restricted to the statements reaching that leaf. The band's
    /// child takes over `id`. Returns the ids of the sunk copies.
    pub fn band_sink(&mut self, id: NodeId) -> TransformResult<Vec<NodeId>> {
        let band = self.band_checked(id, "band_sink")?.clone();
        let child = match self.children(id) {
            [child] => *child,
            other => {
                return Err(TransformError::new(
                    format!("band {} has {} children", id, other.len()),
                    TransformErrorKind::InvalidNode,
                    "band_sink",
                ))
            }
        };
        self.nodes[id.0] = self.nodes[child.0].clone();

        let mut leaves = Vec::new();
        let stmts: BTreeSet<StmtId> = band.statements().collect();
        self.collect_leaves(id, stmts, &mut leaves);

        let mut sunk = Vec::new();
        for (leaf, stmts) in leaves {
            if stmts.is_empty() {
                continue;
            }
            self.insert_above(leaf, NodeKind::Band(band.restrict(&stmts)))?;
            sunk.push(leaf);
        }
        Ok(sunk)
    }

    fn collect_leaves(
        &self,
        id: NodeId,
        stmts: BTreeSet<StmtId>,
        leaves: &mut Vec<(NodeId, BTreeSet<StmtId>)>,
    ) {
        let node = &self.nodes[id.0];
        let stmts = match &node.kind {
            NodeKind::Filter(filter) => stmts.into_iter().filter(|&s| filter.may_admit(s)).collect(),
            NodeKind::Leaf => {
                leaves.push((id, stmts));
                return;
            }
            _ => stmts,
        };
        for &child in &node.children {
            self.collect_leaves(child, stmts.clone(), leaves);
        }
    }

    /// Replace the subtree at `id` by a sequence with one filter per entry
    /// of `filters`, each owning a copy of the subtree. Returns the roots of
    /// the copies.
    pub fn insert_sequence(&mut self, id: NodeId, filters: Vec<Filter>) -> TransformResult<Vec<NodeId>> {
        self.node_checked(id, "insert_sequence")?;
        let mut copies = Vec::with_capacity(filters.len());
        let mut branches = Vec::with_capacity(filters.len());
        for filter in filters {
            let copy = self.copy_subtree(id)?;
            branches.push(self.push(NodeKind::Filter(filter), vec![copy]));
            copies.push(copy);
        }
        self.nodes[id.0] = Node { kind: NodeKind::Sequence, children: branches };
        Ok(copies)
    }

    /// Deep copy of the subtree at `id` into fresh slots.
    pub fn copy_subtree(&mut self, id: NodeId) -> TransformResult<NodeId> {
        let node = self.node_checked(id, "copy_subtree")?.clone();
        let children = node.children.iter()
            .map(|&c| self.copy_subtree(c))
            .collect::<TransformResult<Vec<_>>>()?;
        Ok(self.push(node.kind, children))
    }

    /// Rebuild the arena with only the reachable nodes, numbered in
    /// pre-order from the root.
    pub fn compact(&self) -> ScheduleTree {
        fn copy(from: &ScheduleTree, id: NodeId, into: &mut Vec<Node>) -> NodeId {
            let slot = into.len();
            into.push(Node { kind: from.nodes[id.0].kind.clone(), children: Vec::new() });
            let children = from.nodes[id.0].children.iter().map(|&c| copy(from, c, into)).collect();
            into[slot].children = children;
            NodeId(slot)
        }
        let mut nodes = Vec::new();
        let root = copy(self, self.root, &mut nodes);
        ScheduleTree { nodes, root }
    }

    fn structurally_equal(&self, a: NodeId, other: &ScheduleTree, b: NodeId) -> bool {
        match (self.node(a), other.node(b)) {
            (Some(x), Some(y)) => {
                x.kind == y.kind
                    && x.children.len() == y.children.len()
                    && x.children.iter().zip(&y.children)
                        .all(|(&ca, &cb)| self.structurally_equal(ca, other, cb))
            }
            (None, None) => true,
            _ => false,
        }
    }
}

/// Trees compare by reachable structure, independent of arena numbering.
impl PartialEq for ScheduleTree {
    fn eq(&self, other: &Self) -> bool {
        self.structurally_equal(self.root, other, other.root)
    }
}

/// An owned handle on a tree positioned at one node.
///
/// Transformations consume a handle and return a new one; the tree moves
/// with the handle.
#[derive(Debug, Clone)]
pub struct ScheduleNode {
    tree: ScheduleTree,
    id: NodeId,
}

impl ScheduleNode {
    pub fn new(tree: ScheduleTree, id: NodeId) -> Self {
        Self { tree, id }
    }

    /// Handle positioned at the root.
    pub fn root(tree: ScheduleTree) -> Self {
        let id = tree.root();
        Self { tree, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &ScheduleTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ScheduleTree {
        &mut self.tree
    }

    pub fn kind(&self) -> Option<&NodeKind> {
        self.tree.kind(self.id)
    }

    pub fn band(&self) -> Option<&Band> {
        self.tree.band(self.id)
    }

    pub fn children(&self) -> &[NodeId] {
        self.tree.children(self.id)
    }

    /// Move the handle to child `pos`.
    pub fn child(self, pos: usize) -> TransformResult<Self> {
        match self.tree.children(self.id).get(pos) {
            Some(&child) => Ok(Self { tree: self.tree, id: child }),
            None => Err(TransformError::new(
                format!("node {} has no child {}", self.id, pos),
                TransformErrorKind::InvalidNode,
                "child",
            )),
        }
    }

    /// Move the handle to another node of the same tree.
    pub fn at(self, id: NodeId) -> Self {
        Self { tree: self.tree, id }
    }

    pub fn into_tree(self) -> ScheduleTree {
        self.tree
    }
}
