use std::fmt;
use std::mem::discriminant;
use std::sync::Arc;

use super::{BindingStore, BindingStoreExt, VarIntern};
use crate::expr::{ExprId, Graph, Node};
use crate::op::Op;
use crate::types::{IrType, Literal};

/// Named boolean predicate usable inside a cloneable pattern.
pub struct Predicate<T: ?Sized> {
    label: String,
    f: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: ?Sized> Predicate<T> {
    pub fn new(label: impl Into<String>, f: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self { label: label.into(), f: Arc::new(f) }
    }

    pub fn test(&self, value: &T) -> bool {
        (self.f)(value)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T: ?Sized> Clone for Predicate<T> {
    fn clone(&self) -> Self {
        Self { label: self.label.clone(), f: Arc::clone(&self.f) }
    }
}

impl<T: ?Sized> fmt::Debug for Predicate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.label)
    }
}

/// Filter on the op of a call.
#[derive(Debug, Clone)]
pub enum OpFilter {
    /// Op equal to this one, attributes included.
    Exact(Op),
    /// Any op with the same variant as this one.
    Kind(std::mem::Discriminant<Op>),
    Where(Predicate<Op>),
}

impl OpFilter {
    pub fn kind_of(op: &Op) -> Self {
        OpFilter::Kind(discriminant(op))
    }

    fn accepts(&self, op: &Op) -> bool {
        match self {
            OpFilter::Exact(expected) => expected == op,
            OpFilter::Kind(kind) => *kind == discriminant(op),
            OpFilter::Where(predicate) => predicate.test(op),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Pattern {
    /// Matches any node.
    Wildcard { name: Option<String> },
    /// Matches a constant, optionally restricted by a predicate on its literal.
    Const { predicate: Option<Predicate<Literal>>, name: Option<String> },
    /// Matches a call whose op passes `op`; `args`, when given, must match positionally.
    Call { op: Option<OpFilter>, args: Option<Vec<Pattern>>, name: Option<String> },
    Tuple { fields: Vec<Pattern>, name: Option<String> },
    /// First alternative that matches wins.
    OrElse { alternatives: Vec<Pattern>, name: Option<String> },
    /// Matches when `inner` matches and the node's type passes `predicate`.
    Typed { inner: Box<Pattern>, predicate: Predicate<IrType>, name: Option<String> },
}

impl Pattern {
    pub fn any() -> Self {
        Pattern::Wildcard { name: None }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Pattern::Wildcard { name: Some(name.into()) }
    }

    pub fn cvar(name: impl Into<String>) -> Self {
        Pattern::Const { predicate: None, name: Some(name.into()) }
    }

    pub fn constant_where(label: &str, f: impl Fn(&Literal) -> bool + Send + Sync + 'static) -> Self {
        Pattern::Const { predicate: Some(Predicate::new(label, f)), name: None }
    }

    /// Call with exactly `op` and the given argument patterns.
    pub fn op(op: Op, args: impl IntoIterator<Item = Pattern>) -> Self {
        Pattern::Call { op: Some(OpFilter::Exact(op)), args: Some(args.into_iter().collect()), name: None }
    }

    /// Call with an op of the same variant as `op`, attributes ignored.
    pub fn op_kind(op: &Op, args: impl IntoIterator<Item = Pattern>) -> Self {
        Pattern::Call { op: Some(OpFilter::kind_of(op)), args: Some(args.into_iter().collect()), name: None }
    }

    pub fn op_where(
        label: &str,
        f: impl Fn(&Op) -> bool + Send + Sync + 'static,
        args: impl IntoIterator<Item = Pattern>,
    ) -> Self {
        Pattern::Call {
            op: Some(OpFilter::Where(Predicate::new(label, f))),
            args: Some(args.into_iter().collect()),
            name: None,
        }
    }

    /// Any call, arguments unconstrained.
    pub fn call_any() -> Self {
        Pattern::Call { op: None, args: None, name: None }
    }

    /// Boxing call of `source`, any target.
    pub fn boxing(source: Pattern) -> Self {
        Self::op_where("boxing", Op::is_boxing, [source])
    }

    pub fn tuple(fields: impl IntoIterator<Item = Pattern>) -> Self {
        Pattern::Tuple { fields: fields.into_iter().collect(), name: None }
    }

    pub fn or_else(alternatives: impl IntoIterator<Item = Pattern>) -> Self {
        Pattern::OrElse { alternatives: alternatives.into_iter().collect(), name: None }
    }

    pub fn typed(self, label: &str, f: impl Fn(&IrType) -> bool + Send + Sync + 'static) -> Self {
        Pattern::Typed { inner: Box::new(self), predicate: Predicate::new(label, f), name: None }
    }

    pub fn named(mut self, new_name: impl Into<String>) -> Self {
        match &mut self {
            Pattern::Wildcard { name }
            | Pattern::Const { name, .. }
            | Pattern::Call { name, .. }
            | Pattern::Tuple { name, .. }
            | Pattern::OrElse { name, .. }
            | Pattern::Typed { name, .. } => *name = Some(new_name.into()),
        }
        self
    }

    fn name(&self) -> Option<&str> {
        match self {
            Pattern::Wildcard { name }
            | Pattern::Const { name, .. }
            | Pattern::Call { name, .. }
            | Pattern::Tuple { name, .. }
            | Pattern::OrElse { name, .. }
            | Pattern::Typed { name, .. } => name.as_deref(),
        }
    }

    fn children(&self) -> &[Pattern] {
        match self {
            Pattern::Wildcard { .. } | Pattern::Const { .. } => &[],
            Pattern::Call { args, .. } => args.as_deref().unwrap_or(&[]),
            Pattern::Tuple { fields, .. } => fields,
            Pattern::OrElse { alternatives, .. } => alternatives,
            Pattern::Typed { inner, .. } => std::slice::from_ref(inner),
        }
    }

    /// Interns every binding name in this pattern, or `None` if there are too many.
    pub fn collect_names(&self) -> Option<VarIntern> {
        let mut intern = VarIntern::new();
        let mut stack = vec![self];
        while let Some(pat) = stack.pop() {
            if let Some(name) = pat.name() {
                intern.get_or_insert(name)?;
            }
            stack.extend(pat.children().iter().rev());
        }
        Some(intern)
    }

    pub(super) fn match_into(&self, graph: &Graph, id: ExprId, store: &mut BindingStore, intern: &VarIntern) -> bool {
        let node = graph.node(id);
        let structural = match self {
            Pattern::Wildcard { .. } => true,

            Pattern::Const { predicate, .. } => match node {
                Node::Const(literal) => predicate.as_ref().is_none_or(|p| p.test(literal)),
                _ => false,
            },

            Pattern::Call { op: filter, args: arg_pats, .. } => {
                let Node::Call { op, args } = node else { return false };
                if let Some(filter) = filter
                    && !filter.accepts(op)
                {
                    return false;
                }
                match arg_pats {
                    None => true,
                    Some(pats) => Self::match_all(graph, args, pats, store, intern),
                }
            }

            Pattern::Tuple { fields: pats, .. } => match node {
                Node::Tuple(fields) => Self::match_all(graph, fields, pats, store, intern),
                _ => false,
            },

            Pattern::OrElse { alternatives, .. } => {
                // Alternatives run on a scratch copy so a failed one leaves no bindings.
                let mut matched = false;
                for alternative in alternatives {
                    let mut scratch = store.clone();
                    if alternative.match_into(graph, id, &mut scratch, intern) {
                        *store = scratch;
                        matched = true;
                        break;
                    }
                }
                matched
            }

            Pattern::Typed { inner, predicate, .. } => {
                predicate.test(graph.ty(id)) && inner.match_into(graph, id, store, intern)
            }
        };
        if !structural {
            return false;
        }

        match self.name().and_then(|name| intern.get_index(name)) {
            Some(idx) => store.bind_consistent(idx, id),
            None => true,
        }
    }

    fn match_all(
        graph: &Graph,
        operands: &[ExprId],
        pats: &[Pattern],
        store: &mut BindingStore,
        intern: &VarIntern,
    ) -> bool {
        operands.len() == pats.len()
            && operands.iter().zip(pats).all(|(&operand, pat)| pat.match_into(graph, operand, store, intern))
    }
}
