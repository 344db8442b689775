use std::{cell::RefCell, rc::Rc};

use crate::foundation::error::{StagehandError, StagehandResult};

pub use kurbo::{Point, Vec2};

/// Capability the scheduler consumes from a scene-graph node.
///
/// The node tree itself is owned by the host; the runner only reads and
/// writes these two fields and never touches topology or rendering.
pub trait ActionTarget {
    fn position(&self) -> Point;
    fn set_position(&mut self, pos: Point);
    fn scale(&self) -> Vec2;
    fn set_scale(&mut self, scale: Vec2);
}

/// Shared handle to a host node. Single-threaded by construction.
pub type NodeHandle<N> = Rc<RefCell<N>>;

/// Registry identity of a node: the address of its shared cell.
///
/// Stable for as long as the handle is alive; the runner keeps a clone of
/// every handle it has instances for, so ids cannot be reused underneath it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn of<N>(node: &NodeHandle<N>) -> Self {
        Self(Rc::as_ptr(node) as *const () as usize)
    }
}

/// Validates a time quantity in milliseconds (duration or tick delta).
/// Negative values are rejected, never clamped.
pub(crate) fn ensure_time_ms(value: f64, what: &str) -> StagehandResult<f64> {
    if !value.is_finite() {
        return Err(StagehandError::validation(format!(
            "{what} must be finite, got {value}"
        )));
    }
    if value < 0.0 {
        return Err(StagehandError::validation(format!(
            "{what} must be >= 0, got {value}"
        )));
    }
    Ok(value)
}
