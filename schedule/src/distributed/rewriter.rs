//! Candidate search over distributed layouts.
//!
//! Every original expression is visited once, operands first, and gets a [`Bucket`] of
//! equivalent candidates grouped by type. Consumers draw one representative per type
//! from each operand bucket and try every combination. Layout conversions are explicit
//! `Boxing` calls that land in the bucket of the value they convert.
//!
//! After the visit the root candidates are boxed down to plain tensors, unused
//! candidates are pruned, and the survivors are unioned into an e-graph from which the
//! cheapest program is extracted.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use smallvec::SmallVec;
use snafu::{OptionExt, ResultExt, ensure};
use strata_egraph::{EGraph, Extractor, Id, RecExpr};
use strata_ir::{
    DistributedType, ExprId, Function, Graph, IrType, NameAlloc, Node, Op, ParameterKind, UseTable, render_tree,
};
use tracing::{debug, trace, warn};

use super::backend::{Backend, DefaultBackend};
use super::candidates::{Bucket, leaf_candidates, partial_resolutions};
use super::cost::node_types;
use super::enode::IrNode;
use super::support::is_supported;
use crate::config::DistributeConfig;
use crate::error::{EmptyCandidatesSnafu, ExtractionSnafu, InvalidProgramSnafu, IrSnafu, Result};

/// Candidate type and the expression standing for it.
type Choice = (IrType, ExprId);

pub struct AutoDistributed<'a, B: Backend = DefaultBackend> {
    graph: &'a mut Graph,
    config: &'a DistributeConfig,
    backend: &'a B,
    names: &'a mut NameAlloc,
    users: UseTable,
    memo: IndexMap<ExprId, Bucket>,
    /// Candidate -> original expression whose bucket holds it.
    origin: HashMap<ExprId, ExprId>,
    /// `(source, target)` -> boxing node.
    boxed: HashMap<(ExprId, IrType), ExprId>,
    /// Originals whose plain candidates were already laid out on the placement.
    expanded: HashSet<ExprId>,
    leaves: HashSet<ExprId>,
    terminals: Vec<ExprId>,
}

impl<'a> AutoDistributed<'a> {
    pub fn new(graph: &'a mut Graph, config: &'a DistributeConfig, names: &'a mut NameAlloc) -> Self {
        Self::with_backend(graph, config, &DefaultBackend, names)
    }
}

impl<'a, B: Backend> AutoDistributed<'a, B> {
    /// Search whose extraction is costed and constrained by `backend`.
    pub fn with_backend(
        graph: &'a mut Graph,
        config: &'a DistributeConfig,
        backend: &'a B,
        names: &'a mut NameAlloc,
    ) -> Self {
        Self {
            graph,
            config,
            backend,
            names,
            users: UseTable::new(),
            memo: IndexMap::new(),
            origin: HashMap::new(),
            boxed: HashMap::new(),
            expanded: HashSet::new(),
            leaves: HashSet::new(),
            terminals: Vec::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    pub fn users(&self) -> &UseTable {
        &self.users
    }

    pub fn bucket(&self, original: ExprId) -> Option<&Bucket> {
        self.memo.get(&original)
    }

    /// Plain candidates of the root, available after [`Self::insert_terminator`].
    pub fn terminals(&self) -> &[ExprId] {
        &self.terminals
    }

    /// Runs the whole search and returns `function` with the extracted body.
    #[tracing::instrument(skip_all, fields(function = %function.name))]
    pub fn run(mut self, function: &Function) -> Result<Function> {
        debug!(tree = %render_tree(self.graph, function.body), "auto_distribute.input");
        self.visit(function.body)?;
        self.insert_terminator(function.body)?;
        let pruned = self.branch_cut()?;
        debug!(pruned, buckets = self.memo.len(), "auto_distribute.branch_cut");
        self.finalize(function)
    }

    /// Fills the bucket of every expression reachable from `root`.
    pub fn visit(&mut self, root: ExprId) -> Result<()> {
        for id in self.graph.post_order(&[root]) {
            if self.memo.contains_key(&id) {
                continue;
            }
            if let IrType::Invalid { reason } = self.graph.ty(id) {
                return InvalidProgramSnafu { expr: id, reason: reason.clone() }.fail();
            }
            match self.graph.node(id).clone() {
                Node::Var { .. } | Node::Const(_) => self.visit_leaf(id),
                Node::Tuple(fields) => self.visit_tuple(id, &fields),
                Node::Call { op, args } => self.visit_call(id, &op, &args)?,
            }
            ensure!(self.memo.get(&id).is_some_and(|bucket| !bucket.is_empty()), EmptyCandidatesSnafu { expr: id });
        }
        Ok(())
    }

    fn visit_leaf(&mut self, id: ExprId) {
        self.leaves.insert(id);
        self.insert_candidate(id, id);
    }

    fn visit_tuple(&mut self, id: ExprId, fields: &[ExprId]) {
        let choices: Vec<Vec<Choice>> = fields.iter().map(|&field| self.representatives(field)).collect();
        for combo in self.combinations(id, choices) {
            let tuple = self.graph.tuple(combo.iter().map(|(_, expr)| *expr));
            self.insert_candidate(id, tuple);
        }
    }

    fn visit_call(&mut self, id: ExprId, op: &Op, args: &[ExprId]) -> Result<()> {
        let supported = is_supported(self.graph, op, args);
        let mut choices = Vec::with_capacity(args.len());
        for (index, &arg) in args.iter().enumerate() {
            let choice = match op.parameter_kind(index) {
                ParameterKind::Attribute => vec![(self.graph.ty(arg).clone(), arg)],
                ParameterKind::Input if supported => self.distributed_choices(arg)?,
                ParameterKind::Input => self.plain_choices(arg)?,
            };
            choices.push(choice);
        }

        self.memo.entry(id).or_default();
        let combos = self.combinations(id, choices);
        for combo in &combos {
            let calls =
                if supported { self.build_equival_calls(op, combo)? } else { self.build_not_supported_calls(op, combo)? };
            for call in calls {
                self.insert_candidate(id, call);
                if supported {
                    self.expand_partial(id, call)?;
                }
            }
        }

        if self.memo.get(&id).is_none_or(IndexMap::is_empty) {
            self.fallback(id, op, &combos)?;
        }
        trace!(expr = %id, %op, supported, types = self.memo.get(&id).map_or(0, IndexMap::len), "auto_distribute.visit");
        Ok(())
    }

    /// Calls over one combination of distributed arguments.
    ///
    /// A rejected `Reshape` is retried with its input re-boxed to every other layout.
    pub fn build_equival_calls(&mut self, op: &Op, combo: &[Choice]) -> Result<Vec<ExprId>> {
        let args: SmallVec<[ExprId; 4]> = combo.iter().map(|(_, expr)| *expr).collect();
        if let Some(call) = self.try_call(op, &args)? {
            return Ok(vec![call]);
        }
        if *op != Op::Reshape {
            return Ok(Vec::new());
        }

        let input = args[0];
        let Some(current) = self.graph.ty(input).as_distributed().cloned() else { return Ok(Vec::new()) };
        let origin = self.origin_of(input);
        let mut calls = Vec::new();
        for layout in leaf_candidates(&current.tensor, &current.placement) {
            if layout == current {
                continue;
            }
            let Some(reboxed) = self.box_to(origin, input, IrType::Distributed(layout))? else { continue };
            let mut retried = args.clone();
            retried[0] = reboxed;
            if let Some(call) = self.try_call(op, &retried)? {
                calls.push(call);
            }
        }
        trace!(%op, retried = calls.len(), "auto_distribute.reshape_retry");
        Ok(calls)
    }

    /// The plain call, unless an input is still distributed.
    pub fn build_not_supported_calls(&mut self, op: &Op, combo: &[Choice]) -> Result<Vec<ExprId>> {
        let distributed_input = combo
            .iter()
            .enumerate()
            .any(|(index, (ty, _))| op.parameter_kind(index) == ParameterKind::Input && ty.is_distributed());
        if distributed_input {
            return Ok(Vec::new());
        }
        let args: SmallVec<[ExprId; 4]> = combo.iter().map(|(_, expr)| *expr).collect();
        Ok(self.try_call(op, &args)?.into_iter().collect())
    }

    /// Boxes every root candidate down to a plain tensor, through `Broadcast` for partials.
    pub fn insert_terminator(&mut self, root: ExprId) -> Result<()> {
        for (_, candidate) in self.representatives(root) {
            if let Some(terminal) = self.to_plain(root, candidate)?
                && !self.terminals.contains(&terminal)
            {
                self.terminals.push(terminal);
            }
        }
        ensure!(!self.terminals.is_empty(), EmptyCandidatesSnafu { expr: root });
        debug!(%root, terminals = self.terminals.len(), "auto_distribute.terminators");
        Ok(())
    }

    /// Removes candidates nobody uses until nothing changes. Returns how many were removed.
    ///
    /// Leaves leave their bucket but stay alive. Terminals are pinned while pruning.
    pub fn branch_cut(&mut self) -> Result<usize> {
        let _pins = self.users.pin_all(self.terminals.iter().copied());
        let mut removed = 0;
        loop {
            let dead: Vec<ExprId> = self
                .memo
                .values()
                .flat_map(|bucket| bucket.values().flatten().copied())
                .filter(|&id| self.users.user_count(id) == 0 && !self.users.is_pinned(id))
                .collect();
            if dead.is_empty() {
                break;
            }
            for id in dead {
                let origin = self.origin_of(id);
                if let Some(bucket) = self.memo.get_mut(&origin) {
                    for members in bucket.values_mut() {
                        members.retain(|&member| member != id);
                    }
                    bucket.retain(|_, members| !members.is_empty());
                }
                if !self.leaves.contains(&id) {
                    self.users.dispose(self.graph, id).context(IrSnafu)?;
                }
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Unions every bucket into one e-graph and extracts the cheapest terminal program the
    /// backend admits.
    pub fn finalize(&mut self, function: &Function) -> Result<Function> {
        let mut egraph = EGraph::new();
        let mut classes: HashMap<ExprId, Id> = HashMap::new();
        let members: Vec<ExprId> = self.memo.values().flat_map(|bucket| bucket.values().flatten().copied()).collect();
        for &member in members.iter().chain(&self.terminals) {
            self.add_enodes(&mut egraph, &mut classes, member);
        }

        for bucket in self.memo.values() {
            for members in bucket.values() {
                if let Some((first, rest)) = members.split_first() {
                    for other in rest {
                        egraph.union(classes[first], classes[other]);
                    }
                }
            }
        }
        let (&first, rest) = self.terminals.split_first().context(EmptyCandidatesSnafu { expr: function.body })?;
        for other in rest {
            egraph.union(classes[&first], classes[other]);
        }
        egraph.rebuild();

        let class_types: HashMap<Id, IrType> =
            classes.iter().map(|(&expr, &class)| (egraph.find(class), self.graph.ty(expr).clone())).collect();
        let typed = node_types(&egraph, &class_types);
        let backend = self.backend;
        let admits = |enode: &IrNode| typed.get(enode).is_none_or(|ty| backend.admits(enode, ty));
        let cost_function = backend.cost_function(&egraph, class_types);
        let extractor = Extractor::with_constraints(&egraph, cost_function, &admits).context(ExtractionSnafu)?;
        let (cost, term) = extractor.find_best(classes[&first]).context(ExtractionSnafu)?;
        debug!(?cost, nodes = term.len(), classes = egraph.number_of_classes(), "auto_distribute.extract");

        let body = self.materialize(&term, function.body)?;
        Ok(Function::new(function.name.clone(), function.params.iter().copied(), body))
    }

    fn add_enodes(&self, egraph: &mut EGraph<IrNode>, classes: &mut HashMap<ExprId, Id>, root: ExprId) {
        for id in self.graph.post_order(&[root]) {
            if classes.contains_key(&id) {
                continue;
            }
            let node = match self.graph.node(id) {
                Node::Var { .. } | Node::Const(_) => IrNode::Leaf(id),
                Node::Tuple(fields) => IrNode::Tuple(fields.iter().map(|field| classes[field]).collect()),
                Node::Call { op, args } => IrNode::Call { op: op.clone(), args: args.iter().map(|arg| classes[arg]).collect() },
            };
            classes.insert(id, egraph.add(node));
        }
    }

    fn materialize(&mut self, term: &RecExpr<IrNode>, root: ExprId) -> Result<ExprId> {
        let mut built: Vec<ExprId> = Vec::with_capacity(term.len());
        for node in term.nodes() {
            let id = match node {
                IrNode::Leaf(expr) => *expr,
                IrNode::Tuple(fields) => self.graph.tuple(fields.iter().map(|&field| built[usize::from(field)])),
                IrNode::Call { op, args } => {
                    let call = self.graph.call(op.clone(), args.iter().map(|&arg| built[usize::from(arg)]));
                    if op.is_boxing() {
                        let name = self.names.alloc("boxing");
                        self.graph.set_name(call, name);
                    }
                    call
                }
            };
            built.push(id);
        }
        built.last().copied().context(EmptyCandidatesSnafu { expr: root })
    }

    /// Argument combinations for `expr`, truncated to the configured ceiling.
    ///
    /// Combinations come in [`diagonal_indices`] order, so a truncated search still tries
    /// later layouts of every argument instead of only those of the last one.
    fn combinations(&self, expr: ExprId, choices: Vec<Vec<Choice>>) -> Vec<Vec<Choice>> {
        if choices.is_empty() {
            return vec![Vec::new()];
        }
        let limit = self.config.max_candidates;
        let total = choices.iter().try_fold(1usize, |acc, c| acc.checked_mul(c.len())).unwrap_or(usize::MAX);
        if total > limit {
            warn!(%expr, total, limit, "auto_distribute.truncate");
        }
        let lens: SmallVec<[usize; 4]> = choices.iter().map(Vec::len).collect();
        diagonal_indices(&lens, limit)
            .into_iter()
            .map(|indices| indices.iter().zip(&choices).map(|(&i, choice)| choice[i].clone()).collect())
            .collect()
    }

    /// First member of every type in the bucket of `original`.
    fn representatives(&self, original: ExprId) -> Vec<Choice> {
        self.memo.get(&original).map_or_else(Vec::new, |bucket| {
            bucket.iter().filter_map(|(ty, members)| members.first().map(|&m| (ty.clone(), m))).collect()
        })
    }

    /// Distributed candidates of `arg`, laying its plain candidates out on the placement first.
    fn distributed_choices(&mut self, arg: ExprId) -> Result<Vec<Choice>> {
        if self.expanded.insert(arg) {
            let placement = self.config.placement.clone();
            for (ty, candidate) in self.representatives(arg) {
                let IrType::Tensor(tensor) = ty else { continue };
                for layout in leaf_candidates(&tensor, &placement) {
                    self.box_to(arg, candidate, IrType::Distributed(layout))?;
                }
            }
        }
        Ok(self.representatives(arg).into_iter().filter(|(ty, _)| ty.is_distributed()).collect())
    }

    /// Plain candidates of `arg`, one per type, boxing distributed ones back down.
    fn plain_choices(&mut self, arg: ExprId) -> Result<Vec<Choice>> {
        let mut plain: IndexMap<IrType, ExprId> = IndexMap::new();
        for (_, candidate) in self.representatives(arg) {
            if let Some(terminal) = self.to_plain(arg, candidate)? {
                plain.entry(self.graph.ty(terminal).clone()).or_insert(terminal);
            }
        }
        Ok(plain.into_iter().collect())
    }

    /// Plain form of `candidate`, tuple fields converted one by one.
    fn to_plain(&mut self, original: ExprId, candidate: ExprId) -> Result<Option<ExprId>> {
        match self.graph.ty(candidate).clone() {
            IrType::Tensor(_) => Ok(Some(candidate)),
            IrType::Distributed(ty) => {
                let mut source = candidate;
                if ty.has_partial() {
                    let Some(resolved) = self.box_to(original, candidate, IrType::Distributed(ty.resolve_partial()))?
                    else {
                        return Ok(None);
                    };
                    source = resolved;
                }
                self.box_to(original, source, IrType::Tensor(ty.tensor))
            }
            IrType::Tuple(_) if !matches!(self.graph.node(candidate), Node::Tuple(_)) => {
                Ok(self.graph.ty(candidate).is_terminal().then_some(candidate))
            }
            IrType::Tuple(_) => {
                let fields = self.graph.operands(candidate).to_vec();
                let field_origins = self.graph.operands(original).to_vec();
                let mut plain = SmallVec::<[ExprId; 4]>::with_capacity(fields.len());
                for (&field, &field_origin) in fields.iter().zip(&field_origins) {
                    let Some(converted) = self.to_plain(field_origin, field)? else { return Ok(None) };
                    plain.push(converted);
                }
                if plain.as_slice() == fields.as_slice() {
                    return Ok(Some(candidate));
                }
                let tuple = self.graph.tuple(plain);
                self.insert_candidate(original, tuple);
                Ok(Some(tuple))
            }
            IrType::Invalid { .. } => Ok(None),
        }
    }

    /// Boxing of `source` to `target`, shared per `(source, target)`. `None` if illegal.
    fn box_to(&mut self, original: ExprId, source: ExprId, target: IrType) -> Result<Option<ExprId>> {
        if self.graph.ty(source) == &target {
            return Ok(Some(source));
        }
        let key = (source, target);
        if let Some(&existing) = self.boxed.get(&key) {
            return Ok(Some(existing));
        }
        let boxing = self.graph.call(Op::Boxing { target: key.1.clone() }, [source]);
        if self.graph.ty(boxing).is_invalid() {
            self.discard(boxing)?;
            return Ok(None);
        }
        let name = self.names.alloc("boxing");
        self.graph.set_name(boxing, name);
        self.boxed.insert(key, boxing);
        self.insert_candidate(original, boxing);
        Ok(Some(boxing))
    }

    /// Adds every partial-resolving boxing of a partial `call` next to it.
    fn expand_partial(&mut self, original: ExprId, call: ExprId) -> Result<()> {
        let Some(ty) = self.graph.ty(call).as_distributed().filter(|ty| ty.has_partial()).cloned() else {
            return Ok(());
        };
        for layout in partial_resolutions(&ty) {
            self.box_to(original, call, IrType::Distributed(layout))?;
        }
        Ok(())
    }

    /// Last resort when no combination of `op` type-checks: broadcast every distributed
    /// input, then plain inputs.
    pub fn fallback(&mut self, id: ExprId, op: &Op, combos: &[Vec<Choice>]) -> Result<()> {
        debug!(expr = %id, %op, combinations = combos.len(), "auto_distribute.fallback");
        for combo in combos {
            let mut broadcast = SmallVec::<[ExprId; 4]>::with_capacity(combo.len());
            for (index, (ty, arg)) in combo.iter().enumerate() {
                let boxed = match ty {
                    IrType::Distributed(d) if op.parameter_kind(index) == ParameterKind::Input => {
                        let target = DistributedType::broadcast(d.tensor.clone(), d.placement.clone());
                        self.box_to(self.origin_of(*arg), *arg, IrType::Distributed(target))?
                    }
                    _ => Some(*arg),
                };
                let Some(boxed) = boxed else { break };
                broadcast.push(boxed);
            }
            if broadcast.len() == combo.len()
                && let Some(call) = self.try_call(op, &broadcast)?
            {
                self.insert_candidate(id, call);
                continue;
            }

            let mut plain = SmallVec::<[ExprId; 4]>::with_capacity(combo.len());
            for (_, arg) in combo {
                let Some(converted) = self.to_plain(self.origin_of(*arg), *arg)? else { break };
                plain.push(converted);
            }
            if plain.len() == combo.len()
                && let Some(call) = self.try_call(op, &plain)?
            {
                self.insert_candidate(id, call);
            }
        }
        ensure!(self.memo.get(&id).is_some_and(|bucket| !bucket.is_empty()), EmptyCandidatesSnafu { expr: id });
        Ok(())
    }

    /// Builds the call, disposing it again if type inference rejects it.
    fn try_call(&mut self, op: &Op, args: &[ExprId]) -> Result<Option<ExprId>> {
        let call = self.graph.call(op.clone(), args.iter().copied());
        if self.graph.ty(call).is_invalid() {
            self.discard(call)?;
            return Ok(None);
        }
        Ok(Some(call))
    }

    fn discard(&mut self, id: ExprId) -> Result<()> {
        self.users.dispose(self.graph, id).context(IrSnafu)
    }

    fn insert_candidate(&mut self, original: ExprId, candidate: ExprId) {
        let ty = self.graph.ty(candidate).clone();
        let members = self.memo.entry(original).or_default().entry(ty).or_default();
        if !members.contains(&candidate) {
            members.push(candidate);
            self.users.track(self.graph, candidate);
            self.origin.insert(candidate, original);
        }
    }

    fn origin_of(&self, candidate: ExprId) -> ExprId {
        self.origin.get(&candidate).copied().unwrap_or(candidate)
    }
}

/// Up to `limit` index tuples into lists of the given lengths, by increasing index sum and
/// lexicographically within one sum. The all-zero tuple comes first.
pub fn diagonal_indices(lens: &[usize], limit: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    if lens.contains(&0) {
        return out;
    }
    let max_sum: usize = lens.iter().map(|len| len - 1).sum();
    let mut prefix = Vec::with_capacity(lens.len());
    for sum in 0..=max_sum {
        if out.len() >= limit {
            break;
        }
        fill_diagonal(lens, sum, &mut prefix, &mut out, limit);
    }
    out
}

fn fill_diagonal(lens: &[usize], remaining: usize, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>, limit: usize) {
    let axis = prefix.len();
    if axis == lens.len() {
        if remaining == 0 && out.len() < limit {
            out.push(prefix.clone());
        }
        return;
    }
    let rest: usize = lens[axis + 1..].iter().map(|len| len - 1).sum();
    for index in remaining.saturating_sub(rest)..=remaining.min(lens[axis] - 1) {
        if out.len() >= limit {
            return;
        }
        prefix.push(index);
        fill_diagonal(lens, remaining - index, prefix, out, limit);
        prefix.pop();
    }
}
