//! Cost-guided extraction.
//!
//! Costs are computed by repeated bottom-up passes over the classes until nothing
//! improves. A class takes the cheapest admissible member whose children all have a
//! cost. Among equal costs the member added to the graph first wins.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use snafu::ensure;
use tracing::debug;

use crate::error::{NoAdmissibleTermSnafu, NotRebuiltSnafu, Result};
use crate::{EClass, EGraph, Id, Language, RecExpr};

pub trait CostFunction<L: Language> {
    type Cost: PartialOrd + Debug + Clone;

    /// Cost of `enode` given the best cost of each child class.
    fn cost<C>(&mut self, enode: &L, costs: C) -> Self::Cost
    where
        C: FnMut(Id) -> Self::Cost;
}

/// Number of nodes in the extracted term.
#[derive(Debug, Clone, Copy, Default)]
pub struct AstSize;

impl<L: Language> CostFunction<L> for AstSize {
    type Cost = usize;

    fn cost<C>(&mut self, enode: &L, mut costs: C) -> usize
    where
        C: FnMut(Id) -> usize,
    {
        enode.children().iter().fold(1usize, |sum, &child| sum.saturating_add(costs(child)))
    }
}

/// Hard constraints: enodes that are not admitted are never extracted.
pub trait ExtractConstraints<L> {
    fn admits(&self, enode: &L) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoConstraints;

impl<L> ExtractConstraints<L> for NoConstraints {
    fn admits(&self, _: &L) -> bool {
        true
    }
}

impl<L, F> ExtractConstraints<L> for F
where
    F: Fn(&L) -> bool,
{
    fn admits(&self, enode: &L) -> bool {
        self(enode)
    }
}

/// Best cost of a class and the position of the member achieving it.
#[derive(Debug, Clone)]
struct Best<C> {
    cost: C,
    position: usize,
}

pub struct Extractor<'a, CF: CostFunction<L>, L: Language> {
    cost_function: CF,
    best: HashMap<Id, Best<CF::Cost>>,
    egraph: &'a EGraph<L>,
}

impl<'a, CF, L> Extractor<'a, CF, L>
where
    CF: CostFunction<L>,
    L: Language,
{
    /// Fails if `egraph` has unions that were not rebuilt.
    pub fn new(egraph: &'a EGraph<L>, cost_function: CF) -> Result<Self> {
        Self::with_constraints(egraph, cost_function, &NoConstraints)
    }

    pub fn with_constraints(
        egraph: &'a EGraph<L>,
        cost_function: CF,
        constraints: &impl ExtractConstraints<L>,
    ) -> Result<Self> {
        ensure!(egraph.is_clean(), NotRebuiltSnafu { pending: egraph.pending_unions() });
        let mut extractor = Self { cost_function, best: HashMap::new(), egraph };
        extractor.find_costs(constraints);
        Ok(extractor)
    }

    pub fn find_best_cost(&self, eclass: Id) -> Option<CF::Cost> {
        self.best.get(&self.egraph.find(eclass)).map(|best| best.cost.clone())
    }

    pub fn find_best_node(&self, eclass: Id) -> Option<&L> {
        let eclass = self.egraph.find(eclass);
        let best = self.best.get(&eclass)?;
        self.egraph.class(eclass).ok()?.iter().nth(best.position)
    }

    /// Cheapest admissible term of `eclass`.
    pub fn find_best(&self, eclass: Id) -> Result<(CF::Cost, RecExpr<L>)> {
        let root = self.egraph.class(eclass)?.id;
        let cost = self.find_best_cost(root).ok_or_else(|| NoAdmissibleTermSnafu { id: root }.build())?;
        let mut expr = RecExpr::default();
        let mut built = HashMap::new();
        let mut visiting = HashSet::new();
        self.build(root, &mut expr, &mut built, &mut visiting)?;
        Ok((cost, expr))
    }

    fn build(
        &self,
        eclass: Id,
        expr: &mut RecExpr<L>,
        built: &mut HashMap<Id, Id>,
        visiting: &mut HashSet<Id>,
    ) -> Result<Id> {
        let eclass = self.egraph.find(eclass);
        if let Some(&id) = built.get(&eclass) {
            return Ok(id);
        }
        ensure!(visiting.insert(eclass), NoAdmissibleTermSnafu { id: eclass });
        let mut node = self.find_best_node(eclass).cloned().ok_or_else(|| NoAdmissibleTermSnafu { id: eclass }.build())?;
        for child in node.children_mut() {
            *child = self.build(*child, expr, built, visiting)?;
        }
        let id = expr.add(node);
        built.insert(eclass, id);
        Ok(id)
    }

    fn find_costs(&mut self, constraints: &impl ExtractConstraints<L>) {
        let egraph = self.egraph;
        let mut passes = 0;
        let mut changed = true;
        while changed {
            changed = false;
            passes += 1;
            for class in egraph.classes() {
                let Some(candidate) = self.make_pass(class, constraints) else { continue };
                let improves = match self.best.get(&class.id) {
                    None => true,
                    Some(old) => {
                        candidate.cost < old.cost
                            || (!(old.cost < candidate.cost) && candidate.position < old.position)
                    }
                };
                if improves {
                    self.best.insert(class.id, candidate);
                    changed = true;
                }
            }
        }
        debug!(passes, classes = egraph.number_of_classes(), costed = self.best.len(), "extract.costs");
    }

    fn make_pass(&mut self, class: &EClass<L>, constraints: &impl ExtractConstraints<L>) -> Option<Best<CF::Cost>> {
        let mut best: Option<Best<CF::Cost>> = None;
        for (position, node) in class.iter().enumerate() {
            if !constraints.admits(node) {
                continue;
            }
            let Some(cost) = self.node_cost(node) else { continue };
            if best.as_ref().is_none_or(|b| cost < b.cost) {
                best = Some(Best { cost, position });
            }
        }
        best
    }

    fn node_cost(&mut self, node: &L) -> Option<CF::Cost> {
        let Self { cost_function, best, egraph } = self;
        if !node.children().iter().all(|&child| best.contains_key(&egraph.find(child))) {
            return None;
        }
        Some(cost_function.cost(node, |child| best[&egraph.find(child)].cost.clone()))
    }
}
