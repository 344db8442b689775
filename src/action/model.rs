use std::{fmt, rc::Rc};

use crate::{
    action::ease::Ease,
    foundation::core::{ActionTarget, Point, Vec2, ensure_time_ms},
    foundation::error::{StagehandError, StagehandResult},
};

/// Upper bound on composite nesting accepted by [`Action::validate`].
///
/// Action trees are owned values, so a cycle cannot be built; the bound
/// rejects pathologically deep nesting before tick-time recursion sees it.
pub const MAX_ACTION_DEPTH: usize = 64;

/// Callback carried by a [`Action::Custom`] leaf.
///
/// Fired exactly once, at the moment the instance starts. Cheap to clone;
/// one closure may be shared by many templates and runs. A returned error
/// surfaces from the tick as [`StagehandError::Callback`].
#[derive(Clone)]
pub struct CustomFn(Rc<dyn Fn(&mut dyn ActionTarget) -> anyhow::Result<()>>);

impl CustomFn {
    pub fn new(f: impl Fn(&mut dyn ActionTarget) -> anyhow::Result<()> + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub(crate) fn call(&self, node: &mut dyn ActionTarget) -> StagehandResult<()> {
        (self.0)(node).map_err(StagehandError::callback)
    }
}

impl fmt::Debug for CustomFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomFn")
    }
}

/// Immutable description of a timed behavior.
///
/// Templates are side-effect-free values: the same `Action` may run on many
/// nodes at once, or repeatedly on one node, each run owning its own
/// progress state. Durations of composites are computed from children on
/// every observation, never stored.
#[derive(Clone, Debug)]
pub enum Action {
    Wait(WaitAction),
    Move(MoveAction),
    Scale(ScaleAction),
    Custom(CustomAction),
    Sequence(Vec<Action>),
    Group(Vec<Action>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaitAction {
    pub duration_ms: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveAction {
    pub target: Point,
    pub duration_ms: f64,
    pub ease: Ease,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleAction {
    pub target: Vec2,
    pub duration_ms: f64,
    pub ease: Ease,
}

#[derive(Clone, Debug)]
pub struct CustomAction {
    pub callback: CustomFn,
}

impl Action {
    /// Total duration in milliseconds: sum over a Sequence, max over a
    /// Group (0 when empty), 0 for Custom.
    pub fn duration_ms(&self) -> f64 {
        match self {
            Self::Wait(w) => w.duration_ms,
            Self::Move(m) => m.duration_ms,
            Self::Scale(s) => s.duration_ms,
            Self::Custom(_) => 0.0,
            Self::Sequence(children) => children.iter().map(Action::duration_ms).sum(),
            Self::Group(children) => children
                .iter()
                .map(Action::duration_ms)
                .fold(0.0, f64::max),
        }
    }

    pub fn validate(&self) -> StagehandResult<()> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: usize) -> StagehandResult<()> {
        if depth > MAX_ACTION_DEPTH {
            return Err(StagehandError::validation(format!(
                "action tree deeper than {MAX_ACTION_DEPTH} levels"
            )));
        }
        match self {
            Self::Wait(w) => {
                ensure_time_ms(w.duration_ms, "Wait duration_ms")?;
            }
            Self::Move(m) => {
                ensure_time_ms(m.duration_ms, "Move duration_ms")?;
                ensure_finite_point(m.target, "Move target")?;
            }
            Self::Scale(s) => {
                ensure_time_ms(s.duration_ms, "Scale duration_ms")?;
                if !(s.target.x.is_finite() && s.target.y.is_finite()) {
                    return Err(StagehandError::validation("Scale target must be finite"));
                }
            }
            Self::Custom(_) => {}
            Self::Sequence(children) | Self::Group(children) => {
                for child in children {
                    child.validate_at(depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

fn ensure_finite_point(p: Point, what: &str) -> StagehandResult<()> {
    if !(p.x.is_finite() && p.y.is_finite()) {
        return Err(StagehandError::validation(format!("{what} must be finite")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ops::{group, move_to, scale_to, sequence, wait};

    #[test]
    fn sequence_duration_is_sum_of_children() {
        let action = sequence(vec![
            wait(50.0).unwrap(),
            move_to(Point::new(1.0, 1.0), 100.0).unwrap(),
            wait(25.0).unwrap(),
        ]);
        assert_eq!(action.duration_ms(), 175.0);
    }

    #[test]
    fn group_duration_is_max_of_children() {
        let action = group(vec![
            wait(50.0).unwrap(),
            scale_to(Vec2::new(2.0, 2.0), 120.0).unwrap(),
            wait(80.0).unwrap(),
        ]);
        assert_eq!(action.duration_ms(), 120.0);
    }

    #[test]
    fn empty_composites_have_zero_duration() {
        assert_eq!(sequence(vec![]).duration_ms(), 0.0);
        assert_eq!(group(vec![]).duration_ms(), 0.0);
    }

    #[test]
    fn nested_composite_durations_recompute() {
        let inner = group(vec![wait(30.0).unwrap(), wait(90.0).unwrap()]);
        let outer = sequence(vec![wait(10.0).unwrap(), inner]);
        assert_eq!(outer.duration_ms(), 100.0);
    }

    #[test]
    fn negative_duration_is_rejected_not_clamped() {
        assert!(wait(-1.0).is_err());
        assert!(move_to(Point::ORIGIN, -0.001).is_err());
        assert!(scale_to(Vec2::new(1.0, 1.0), f64::NAN).is_err());
    }

    #[test]
    fn non_finite_target_is_rejected() {
        let action = Action::Move(MoveAction {
            target: Point::new(f64::NAN, 0.0),
            duration_ms: 10.0,
            ease: Ease::Linear,
        });
        assert!(action.validate().is_err());
    }

    #[test]
    fn overly_deep_tree_is_rejected() {
        let mut action = wait(1.0).unwrap();
        for _ in 0..(MAX_ACTION_DEPTH + 1) {
            action = sequence(vec![action]);
        }
        assert!(action.validate().is_err());
    }
}
