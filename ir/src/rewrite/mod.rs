//! Rewrite rules and the fixed-point graph rewrite engine.

pub mod engine;

use crate::expr::{ExprId, Graph};
use crate::pattern::{MatchResult, Pattern, try_match};

pub use engine::{collect_rewrites, dce, graph_rewrite};

/// Pattern-directed rewrite.
///
/// `get_replace` may add nodes to the graph but never mutates matched ones. Returning
/// `None` declines the rewrite and leaves the original in place.
pub trait RewriteRule<C = ()> {
    fn name(&self) -> &str;

    fn pattern(&self) -> &Pattern;

    fn get_replace(&self, graph: &mut Graph, result: &MatchResult, ctx: &mut C) -> Option<ExprId>;

    fn try_rewrite(&self, graph: &mut Graph, expr: ExprId, ctx: &mut C) -> Option<ExprId> {
        let result = try_match(graph, expr, self.pattern())?;
        self.get_replace(graph, &result, ctx)
    }
}

/// Rule backed by a closure.
pub struct FnRule<F> {
    name: String,
    pattern: Pattern,
    replace: F,
}

impl<F> FnRule<F> {
    pub fn new(name: impl Into<String>, pattern: Pattern, replace: F) -> Self {
        Self { name: name.into(), pattern, replace }
    }
}

impl<C, F> RewriteRule<C> for FnRule<F>
where
    F: Fn(&mut Graph, &MatchResult, &mut C) -> Option<ExprId>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn get_replace(&self, graph: &mut Graph, result: &MatchResult, ctx: &mut C) -> Option<ExprId> {
        (self.replace)(graph, result, ctx)
    }
}

pub type RuleSet<C = ()> = Vec<Box<dyn RewriteRule<C>>>;
