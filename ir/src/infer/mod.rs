//! Type inference for calls and tuples.
//!
//! Inference never fails hard. A call whose operands do not fit its op gets an
//! [`IrType::Invalid`] type carrying the reason; passes treat such nodes as rejected
//! candidates and drop them.
//!
//! Dispatch:
//! - [`Op::Boxing`] goes through [`boxing::infer`], which checks conversion legality.
//! - Calls with distributed inputs go through [`distributed::infer`].
//! - Everything else goes through [`tensor::infer`].

pub mod boxing;
pub mod distributed;
pub mod tensor;

use crate::expr::{ExprId, Graph};
use crate::op::{Op, ParameterKind};
use crate::types::{IrType, TensorType};

pub use boxing::is_legal_boxing;

/// Inference outcome before it is folded into an [`IrType`].
pub type Infer<T> = std::result::Result<T, String>;

pub fn infer_tuple(graph: &Graph, fields: &[ExprId]) -> IrType {
    let mut types = Vec::with_capacity(fields.len());
    for &field in fields {
        let ty = graph.ty(field);
        if ty.is_invalid() {
            return IrType::invalid(format!("tuple field {field} is invalid"));
        }
        types.push(ty.clone());
    }
    IrType::Tuple(types)
}

pub fn infer_call(graph: &Graph, op: &Op, args: &[ExprId]) -> IrType {
    match try_infer_call(graph, op, args) {
        Ok(ty) => ty,
        Err(reason) => {
            tracing::trace!(%op, %reason, "infer.reject");
            IrType::Invalid { reason }
        }
    }
}

fn try_infer_call(graph: &Graph, op: &Op, args: &[ExprId]) -> Infer<IrType> {
    check_signature(graph, op, args)?;

    if let Op::Boxing { target } = op {
        return boxing::infer(graph.ty(args[0]), target).map(|()| target.clone());
    }

    let distributed = inputs(op, args).any(|id| graph.ty(id).is_distributed());
    if distributed {
        distributed::infer(graph, op, args).map(IrType::Distributed)
    } else {
        tensor::infer(graph, op, args).map(IrType::Tensor)
    }
}

fn check_signature(graph: &Graph, op: &Op, args: &[ExprId]) -> Infer<()> {
    let declared = op.parameters().len();
    if op.is_variadic() {
        if args.is_empty() {
            return Err(format!("{op} needs at least one argument"));
        }
    } else if args.len() != declared {
        return Err(format!("{op} takes {declared} arguments, got {}", args.len()));
    }

    for (index, &arg) in args.iter().enumerate() {
        let ty = graph.ty(arg);
        if ty.is_invalid() {
            return Err(format!("argument {index} ({arg}) is invalid"));
        }
        let Some(param) = op.parameter(index) else { continue };
        if param.kind == ParameterKind::Attribute && graph.literal(arg).is_none() {
            return Err(format!("attribute '{}' of {op} must be a constant", param.name));
        }
        if !matches!(ty, IrType::Tensor(_) | IrType::Distributed(_)) {
            return Err(format!("argument '{}' of {op} must be a tensor, got {ty}", param.name));
        }
        if let Some(accepts) = param.accepts
            && !accepts(ty)
        {
            return Err(format!("argument '{}' of {op} does not accept {ty}", param.name));
        }
    }
    Ok(())
}

/// Arguments bound to `Input` parameter slots.
pub fn inputs<'a>(op: &'a Op, args: &'a [ExprId]) -> impl Iterator<Item = ExprId> + 'a {
    args.iter()
        .enumerate()
        .filter(|(index, _)| op.parameter_kind(*index) == ParameterKind::Input)
        .map(|(_, &id)| id)
}

/// Logical tensor type of `id`, looking through distribution.
pub(crate) fn logical(graph: &Graph, id: ExprId) -> Infer<&TensorType> {
    graph.ty(id).logical_tensor().ok_or_else(|| format!("{id} is not a tensor"))
}

/// Integer vector held by an attribute constant.
pub(crate) fn attribute_ints(graph: &Graph, id: ExprId) -> Infer<smallvec::SmallVec<[i64; 4]>> {
    graph.literal(id).and_then(|lit| lit.as_ints()).ok_or_else(|| format!("{id} is not an integer constant"))
}
