//! Pretty printing of schedule trees.
//!
//! Trees print as nested blocks in the spirit of isl's YAML form, one node
//! per line, children indented below their parent:
//! ```text
//! domain:
//!   S0 "gemm": [i, j, k] : i >= 0 and -i + N - 1 >= 0 and ...
//!   mark: "1st level tiling - Tiles"
//!   band: permutable: 1, coincident: [1, 1, 0]
//!     S0 -> [floor((i)/32), floor((j)/32), floor((k)/32)]
//! ```

use crate::ir::scop::{Scop, StmtId};
use crate::ir::tree::{Band, Filter, LoopOption, NodeId, NodeKind, ScheduleTree, TileKind};
use pretty::{BoxAllocator, DocAllocator, DocBuilder};

/// Default line width for pretty printing.
pub const DEFAULT_WIDTH: usize = 80;

const INDENT: isize = 2;

/// A pretty-printable value.
pub trait PrettyPrint {
    /// Convert to a pretty document.
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D>;

    /// Pretty print to a string with the given width.
    fn pretty_print(&self, width: usize) -> String {
        let allocator = BoxAllocator;
        let doc = self.to_doc(&allocator).into_doc();
        doc.pretty(width).to_string()
    }

    /// Pretty print with default width.
    fn pretty(&self) -> String {
        self.pretty_print(DEFAULT_WIDTH)
    }
}

/// A schedule tree printed with the iterator, parameter and statement
/// names of its scop. Without a scop, iterators print as `i0, i1, ...`.
#[derive(Debug, Clone, Copy)]
pub struct NamedTree<'t> {
    pub tree: &'t ScheduleTree,
    pub scop: Option<&'t Scop>,
}

impl<'t> NamedTree<'t> {
    pub fn new(tree: &'t ScheduleTree, scop: &'t Scop) -> Self {
        Self { tree, scop: Some(scop) }
    }

    pub fn unnamed(tree: &'t ScheduleTree) -> Self {
        Self { tree, scop: None }
    }

    fn iterators(&self, stmt: StmtId) -> Vec<String> {
        self.scop
            .and_then(|scop| scop.get_stmt(stmt))
            .map(|s| s.iterators.clone())
            .unwrap_or_default()
    }

    fn parameters(&self) -> Vec<String> {
        self.scop.map(|scop| scop.parameters.clone()).unwrap_or_default()
    }

    fn statement_label(&self, stmt: StmtId) -> String {
        match self.scop.and_then(|scop| scop.get_stmt(stmt)) {
            Some(s) => format!("{} \"{}\"", stmt, s.name),
            None => stmt.to_string(),
        }
    }

    fn node_doc<'a, D: DocAllocator<'a>>(&self, alloc: &'a D, id: NodeId) -> DocBuilder<'a, D> {
        let Some(kind) = self.tree.kind(id) else {
            return alloc.text(format!("<missing node {}>", id));
        };
        let params = self.parameters();
        let header = match kind {
            NodeKind::Domain(domains) => {
                let lines = domains.iter().map(|(&stmt, set)| {
                    let text = format!(
                        "{}: {}",
                        self.statement_label(stmt),
                        set.to_string_with_names(&self.iterators(stmt), &params)
                    );
                    alloc.hardline().append(alloc.text(text))
                });
                alloc.text("domain:").append(alloc.concat(lines).nest(INDENT))
            }
            NodeKind::Band(band) => self.band_doc(alloc, band, &params),
            NodeKind::Sequence => alloc.text("sequence:"),
            NodeKind::Set => alloc.text("set:"),
            NodeKind::Filter(filter) => self.filter_doc(alloc, filter, &params),
            NodeKind::Leaf => alloc.text("leaf"),
        };
        let children = self.tree.children(id).iter()
            .map(|&child| alloc.hardline().append(self.node_doc(alloc, child)));
        header.append(alloc.concat(children).nest(INDENT))
    }

    fn band_doc<'a, D: DocAllocator<'a>>(
        &self,
        alloc: &'a D,
        band: &Band,
        params: &[String],
    ) -> DocBuilder<'a, D> {
        let marks = band.marks.iter()
            .map(|mark| alloc.text(format!("mark: \"{}\"", mark)).append(alloc.hardline()));

        let flag = |b: bool| if b { "1" } else { "0" };
        let coincident: Vec<&str> = band.members.iter().map(|m| flag(m.coincident)).collect();
        let mut line = format!(
            "band: permutable: {}, coincident: [{}]",
            flag(band.is_permutable()),
            coincident.join(", ")
        );
        match band.loop_option {
            LoopOption::Default => {}
            LoopOption::Unroll => line.push_str(", options: unroll"),
            LoopOption::NoUnroll => line.push_str(", options: no-unroll"),
        }

        let schedule = band.schedule.iter().map(|(&stmt, exprs)| {
            let names = self.iterators(stmt);
            let exprs: Vec<String> = exprs.iter()
                .map(|e| e.to_string_with_names(&names, params))
                .collect();
            alloc.hardline().append(alloc.text(format!("{} -> [{}]", stmt, exprs.join(", "))))
        });

        alloc.concat(marks)
            .append(alloc.text(line))
            .append(alloc.concat(schedule).nest(INDENT))
    }

    fn filter_doc<'a, D: DocAllocator<'a>>(
        &self,
        alloc: &'a D,
        filter: &Filter,
        params: &[String],
    ) -> DocBuilder<'a, D> {
        match filter {
            Filter::Statements(stmts) => {
                let names: Vec<String> = stmts.iter().map(|s| s.to_string()).collect();
                alloc.text(format!("filter: {{ {} }}", names.join(", ")))
            }
            Filter::Tiles(tiles) => {
                let kind = match tiles.kind {
                    TileKind::Full => "full",
                    TileKind::Partial => "partial",
                };
                let guards = tiles.guards.iter().map(|(&stmt, guard)| {
                    let text = match guard {
                        Some(exprs) => {
                            let names = self.iterators(stmt);
                            let conds: Vec<String> = exprs.iter()
                                .map(|e| format!("{} >= 0", e.to_string_with_names(&names, params)))
                                .collect();
                            format!("{}: {}", stmt, conds.join(" and "))
                        }
                        None => format!("{}: no full tiles", stmt),
                    };
                    alloc.hardline().append(alloc.text(text))
                });
                alloc.text(format!("filter: {} tiles of width {}", kind, tiles.width))
                    .append(alloc.concat(guards).nest(INDENT))
            }
        }
    }
}

impl PrettyPrint for NamedTree<'_> {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        self.node_doc(allocator, self.tree.root())
    }
}

impl PrettyPrint for ScheduleTree {
    fn to_doc<'a, D: DocAllocator<'a>>(&self, allocator: &'a D) -> DocBuilder<'a, D> {
        NamedTree::unnamed(self).to_doc(allocator)
    }
}
