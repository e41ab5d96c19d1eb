//! Legality of layout conversions.

use super::Infer;
use crate::types::{DistributedType, IrType, Sbp};

/// Checks that a value of type `source` may be boxed to `target`.
pub fn infer(source: &IrType, target: &IrType) -> Infer<()> {
    match (source, target) {
        (IrType::Tensor(src), IrType::Tensor(dst)) if src == dst => Ok(()),
        (IrType::Tensor(src), IrType::Tensor(dst)) => Err(format!("cannot box {src} to {dst}")),

        (IrType::Tensor(src), IrType::Distributed(dst)) => {
            if src != &dst.tensor {
                return Err(format!("boxing changes the tensor: {src} to {dst}"));
            }
            if dst.has_partial() {
                return Err(format!("plain tensor cannot become partial: {dst}"));
            }
            check_divisible(dst)
        }

        (IrType::Distributed(src), IrType::Tensor(dst)) => {
            if &src.tensor != dst {
                return Err(format!("boxing changes the tensor: {src} to {dst}"));
            }
            if src.has_partial() {
                return Err(format!("partial value {src} must be resolved before leaving the placement"));
            }
            Ok(())
        }

        (IrType::Distributed(src), IrType::Distributed(dst)) => {
            if src.tensor != dst.tensor || src.placement != dst.placement || src.ndsbp.len() != dst.ndsbp.len() {
                return Err(format!("boxing must keep tensor and placement: {src} to {dst}"));
            }
            for (axis, (from, to)) in src.ndsbp.iter().zip(&dst.ndsbp).enumerate() {
                if !from.is_partial() && to.is_partial() {
                    return Err(format!("hierarchy axis {axis}: {from} cannot become {to}"));
                }
            }
            check_divisible(dst)
        }

        _ => Err(format!("cannot box {source} to {target}")),
    }
}

fn check_divisible(ty: &DistributedType) -> Infer<()> {
    if !ty.is_divisible() {
        return Err(format!("{ty} is not divisible"));
    }
    Ok(())
}

pub fn is_legal_boxing(source: &IrType, target: &IrType) -> bool {
    infer(source, target).is_ok()
}

/// Whether converting `from` to `to` on one hierarchy axis moves no data.
pub fn is_local_transition(from: Sbp, to: Sbp) -> bool {
    from == to || matches!((from, to), (Sbp::Broadcast, Sbp::Split(_)))
}
