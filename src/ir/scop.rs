//! Static control parts (SCoPs) as consumed by the schedule optimizer.
//!
//! A SCoP bundles:
//! - Statements with iteration domains
//! - Access relations for memory references
//! - The schedule tree computed by the upstream scheduler

use crate::ir::tree::ScheduleTree;
use crate::polyhedral::{AffineMap, IntegerSet};
use crate::utils::errors::SchedOptError;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// A unique identifier for statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StmtId(pub u64);

impl StmtId {
    pub fn new(id: u64) -> Self { Self(id) }
}

impl std::fmt::Display for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Kind of memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessKind {
    Read,
    Write,
}

/// An access relation maps iteration points to memory locations.
/// `{ [i,j] -> A[i][j+1] }` means at iteration (i,j), we access A[i,j+1].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAccess {
    /// Array being accessed
    pub array: String,
    /// Access type (read or write)
    pub kind: AccessKind,
    /// The access map: iterators and parameters -> array indices
    pub relation: AffineMap,
}

impl MemoryAccess {
    pub fn new(array: impl Into<String>, kind: AccessKind, relation: AffineMap) -> Self {
        Self { array: array.into(), kind, relation }
    }

    pub fn read(array: impl Into<String>, relation: AffineMap) -> Self {
        Self::new(array, AccessKind::Read, relation)
    }

    pub fn write(array: impl Into<String>, relation: AffineMap) -> Self {
        Self::new(array, AccessKind::Write, relation)
    }

    pub fn is_read(&self) -> bool {
        self.kind == AccessKind::Read
    }

    pub fn is_write(&self) -> bool {
        self.kind == AccessKind::Write
    }
}

/// A statement of the SCoP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Unique identifier
    pub id: StmtId,
    /// Human-readable name
    pub name: String,
    /// Iterator names, outermost first
    pub iterators: Vec<String>,
    /// Iteration domain: { [i,j,...] : constraints }
    pub domain: IntegerSet,
    /// Memory accesses in program order
    pub accesses: Vec<MemoryAccess>,
}

impl Statement {
    /// Get the dimensionality of the iteration space.
    pub fn depth(&self) -> usize {
        self.domain.n_dim
    }

    pub fn reads(&self) -> impl Iterator<Item = &MemoryAccess> {
        self.accesses.iter().filter(|a| a.is_read())
    }

    pub fn writes(&self) -> impl Iterator<Item = &MemoryAccess> {
        self.accesses.iter().filter(|a| a.is_write())
    }
}

/// A static control part together with its schedule tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scop {
    /// Name of the region/function
    pub name: String,
    /// Symbolic parameters (N, M, K, etc.)
    pub parameters: Vec<String>,
    /// Context constraints on the parameters (e.g., N > 0)
    pub context: IntegerSet,
    /// Statements in the region
    pub statements: Vec<Statement>,
    /// Schedule tree produced by the upstream scheduler
    pub schedule: ScheduleTree,
}

impl Scop {
    /// Get a statement by ID.
    pub fn get_stmt(&self, id: StmtId) -> Option<&Statement> {
        self.statements.iter().find(|s| s.id == id)
    }

    pub fn n_param(&self) -> usize {
        self.parameters.len()
    }

    /// Iteration domains keyed by statement.
    pub fn domains(&self) -> BTreeMap<StmtId, IntegerSet> {
        self.statements.iter().map(|s| (s.id, s.domain.clone())).collect()
    }

    /// Check that the statements, domains and schedule agree.
    pub fn validate(&self) -> Result<(), SchedOptError> {
        let n_param = self.n_param();
        for stmt in &self.statements {
            if stmt.domain.n_param != n_param {
                return Err(SchedOptError::InvalidScop(format!(
                    "statement {} has {} parameters, scop has {}",
                    stmt.name, stmt.domain.n_param, n_param
                )));
            }
            if stmt.iterators.len() != stmt.depth() {
                return Err(SchedOptError::InvalidScop(format!(
                    "statement {} names {} iterators for a {}-dimensional domain",
                    stmt.name, stmt.iterators.len(), stmt.depth()
                )));
            }
            if let Some(access) = stmt.accesses.iter().find(|a| a.relation.n_in != stmt.depth()) {
                return Err(SchedOptError::InvalidScop(format!(
                    "access to {} in statement {} has {} inputs",
                    access.array, stmt.name, access.relation.n_in
                )));
            }
        }
        if !self.schedule.is_well_formed() {
            return Err(SchedOptError::InvalidScop(
                "schedule tree is malformed".to_string(),
            ));
        }
        let bound = self.schedule.domains().ok_or_else(|| {
            SchedOptError::InvalidScop("schedule tree has no domain root".to_string())
        })?;
        for stmt in &self.statements {
            if !bound.contains_key(&stmt.id) {
                return Err(SchedOptError::InvalidScop(format!(
                    "statement {} is not bound by the schedule tree",
                    stmt.name
                )));
            }
        }
        for id in self.schedule.bands() {
            let Some(band) = self.schedule.band(id) else { continue };
            for (stmt, exprs) in &band.schedule {
                let domain = bound.get(stmt).ok_or_else(|| {
                    SchedOptError::InvalidScop(format!("band {} schedules unbound statement {}", id, stmt))
                })?;
                if exprs.len() != band.members.len() {
                    return Err(SchedOptError::InvalidScop(format!(
                        "band {} has {} members but {} expressions for {}",
                        id, band.members.len(), exprs.len(), stmt
                    )));
                }
                if let Some(e) = exprs.iter().find(|e| e.n_dim() != domain.n_dim || e.n_param() != n_param) {
                    return Err(SchedOptError::InvalidScop(format!(
                        "band {} maps {} from {} dimensions and {} parameters, domain has {} and {}",
                        id, stmt, e.n_dim(), e.n_param(), domain.n_dim, n_param
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Statement ID generator.
#[derive(Debug, Default)]
pub struct StmtIdGen {
    next: u64,
}

impl StmtIdGen {
    pub fn new() -> Self { Self { next: 0 } }

    pub fn next(&mut self) -> StmtId {
        let id = StmtId(self.next);
        self.next += 1;
        id
    }
}

/// Builder for constructing statements.
#[derive(Debug)]
pub struct StatementBuilder {
    id: StmtId,
    name: String,
    iterators: Vec<String>,
    domain: Option<IntegerSet>,
    accesses: Vec<MemoryAccess>,
}

impl StatementBuilder {
    pub fn new(id: StmtId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            iterators: Vec::new(),
            domain: None,
            accesses: Vec::new(),
        }
    }

    pub fn iterators(mut self, names: &[&str]) -> Self {
        self.iterators = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn domain(mut self, domain: IntegerSet) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn read(mut self, array: &str, relation: AffineMap) -> Self {
        self.accesses.push(MemoryAccess::read(array, relation));
        self
    }

    pub fn write(mut self, array: &str, relation: AffineMap) -> Self {
        self.accesses.push(MemoryAccess::write(array, relation));
        self
    }

    pub fn build(self) -> Option<Statement> {
        let domain = self.domain?;
        let iterators = if self.iterators.len() == domain.n_dim {
            self.iterators
        } else {
            (0..domain.n_dim).map(|d| format!("i{}", d)).collect()
        };
        Some(Statement {
            id: self.id,
            name: self.name,
            iterators,
            domain,
            accesses: self.accesses,
        })
    }
}

/// Builder for a SCoP. The schedule tree is given explicitly or built by
/// the caller from the statement domains.
#[derive(Debug)]
pub struct ScopBuilder {
    name: String,
    parameters: Vec<String>,
    context: Option<IntegerSet>,
    statements: Vec<Statement>,
}

impl ScopBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            context: None,
            statements: Vec::new(),
        }
    }

    pub fn parameters(mut self, names: &[&str]) -> Self {
        self.parameters = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn context(mut self, context: IntegerSet) -> Self {
        self.context = Some(context);
        self
    }

    pub fn statement(mut self, stmt: Statement) -> Self {
        self.statements.push(stmt);
        self
    }

    /// Domains of the statements added so far.
    pub fn domains(&self) -> BTreeMap<StmtId, IntegerSet> {
        self.statements.iter().map(|s| (s.id, s.domain.clone())).collect()
    }

    pub fn build(self, schedule: ScheduleTree) -> Result<Scop, SchedOptError> {
        let n_param = self.parameters.len();
        let scop = Scop {
            name: self.name,
            context: self.context.unwrap_or_else(|| IntegerSet::universe(0, n_param)),
            parameters: self.parameters,
            statements: self.statements,
            schedule,
        };
        scop.validate()?;
        Ok(scop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::tree::{BandMember, NodeId, ScheduleTree};
    use crate::polyhedral::QuasiAffine;

    #[test]
    fn test_stmt_id() {
        let mut gen = StmtIdGen::new();
        assert_eq!(gen.next().to_string(), "S0");
        assert_eq!(gen.next().to_string(), "S1");
    }

    #[test]
    fn test_builder_validates() {
        let stmt = StatementBuilder::new(StmtId(0), "S")
            .iterators(&["i"])
            .domain(IntegerSet::rectangular(&[8]))
            .write("A", AffineMap::identity(1, 0))
            .build()
            .unwrap();
        let builder = ScopBuilder::new("copy").statement(stmt);
        let tree = ScheduleTree::single_band(builder.domains(), vec![BandMember::permutable(true)]);
        let scop = builder.build(tree).unwrap();
        assert_eq!(scop.statements.len(), 1);
        assert_eq!(scop.get_stmt(StmtId(0)).unwrap().writes().count(), 1);
    }

    #[test]
    fn test_band_arity_mismatch() {
        let stmt = StatementBuilder::new(StmtId(0), "S")
            .iterators(&["i", "j"])
            .domain(IntegerSet::rectangular(&[4, 4]))
            .build()
            .unwrap();
        let builder = ScopBuilder::new("square").statement(stmt);
        let tree = ScheduleTree::single_band(builder.domains(), vec![BandMember::permutable(true); 2]);
        let mut scop = builder.build(tree).unwrap();
        let band = scop.schedule.children(scop.schedule.root())[0];
        fn exprs(scop: &mut Scop, band: NodeId) -> &mut Vec<QuasiAffine> {
            scop.schedule.band_mut(band).unwrap().schedule.get_mut(&StmtId(0)).unwrap()
        }

        // two members, one expression
        exprs(&mut scop, band).pop();
        assert!(matches!(scop.validate(), Err(SchedOptError::InvalidScop(_))));

        // right count, wrong input space
        exprs(&mut scop, band).push(QuasiAffine::var(0, 3, 0));
        assert!(matches!(scop.validate(), Err(SchedOptError::InvalidScop(_))));

        exprs(&mut scop, band)[1] = QuasiAffine::var(1, 2, 0);
        assert!(scop.validate().is_ok());
    }

    #[test]
    fn test_parameter_mismatch() {
        let stmt = StatementBuilder::new(StmtId(0), "S")
            .domain(IntegerSet::parametric_box(&[0], 1))
            .build()
            .unwrap();
        let builder = ScopBuilder::new("bad").statement(stmt);
        let tree = ScheduleTree::single_band(builder.domains(), vec![BandMember::default()]);
        assert!(matches!(builder.build(tree), Err(SchedOptError::InvalidScop(_))));
    }
}
