//! Mutable per-run progress state, kept strictly out of the immutable
//! [`Action`] template so one template can drive many runs at once.

use crate::{
    action::model::Action,
    foundation::core::{ActionTarget, Point, Vec2},
    foundation::error::{StagehandError, StagehandResult},
};

/// Progress of one run through one subtree of an action template.
///
/// Mirrors the template shape; the template is walked but never mutated.
/// Composite nodes hold the nested mutable state: a Sequence tracks its
/// active child, a Group tracks every child.
#[derive(Debug)]
pub(crate) enum Progress {
    Wait {
        elapsed_ms: f64,
    },
    Move {
        elapsed_ms: f64,
        from: Option<Point>,
    },
    Scale {
        elapsed_ms: f64,
        from: Option<Vec2>,
    },
    Custom {
        fired: bool,
    },
    /// `child` is None until the child at `index` starts; creating it lazily
    /// is what defers the child's start-of-execution effects.
    Sequence {
        index: usize,
        child: Option<Box<Progress>>,
    },
    Group {
        children: Vec<GroupChild>,
    },
}

#[derive(Debug)]
pub(crate) struct GroupChild {
    progress: Progress,
    done: bool,
}

impl Progress {
    pub(crate) fn new(action: &Action) -> Self {
        match action {
            Action::Wait(_) => Self::Wait { elapsed_ms: 0.0 },
            Action::Move(_) => Self::Move {
                elapsed_ms: 0.0,
                from: None,
            },
            Action::Scale(_) => Self::Scale {
                elapsed_ms: 0.0,
                from: None,
            },
            Action::Custom(_) => Self::Custom { fired: false },
            Action::Sequence(_) => Self::Sequence {
                index: 0,
                child: None,
            },
            Action::Group(children) => Self::Group {
                children: children
                    .iter()
                    .map(|c| GroupChild {
                        progress: Progress::new(c),
                        done: false,
                    })
                    .collect(),
            },
        }
    }
}

fn shape_mismatch() -> StagehandError {
    StagehandError::validation("instance state out of sync with its template (bug)")
}

/// Advances one instance subtree by `delta_ms` against `node`.
///
/// Returns `Ok(true)` when the subtree completed during this call. Node
/// mutations are applied immediately. A completed subtree must not be
/// advanced again; the caller retires it.
pub(crate) fn advance(
    action: &Action,
    progress: &mut Progress,
    node: &mut dyn ActionTarget,
    delta_ms: f64,
) -> StagehandResult<bool> {
    match (action, progress) {
        (Action::Wait(w), Progress::Wait { elapsed_ms }) => {
            *elapsed_ms += delta_ms;
            Ok(*elapsed_ms >= w.duration_ms)
        }
        (Action::Move(m), Progress::Move { elapsed_ms, from }) => {
            // First advance captures the interpolation start.
            let start = *from.get_or_insert_with(|| node.position());
            *elapsed_ms += delta_ms;
            if m.duration_ms <= 0.0 {
                node.set_position(m.target);
                return Ok(true);
            }
            let t = (*elapsed_ms / m.duration_ms).clamp(0.0, 1.0);
            node.set_position(start.lerp(m.target, m.ease.apply(t)));
            Ok(t >= 1.0)
        }
        (Action::Scale(s), Progress::Scale { elapsed_ms, from }) => {
            let start = *from.get_or_insert_with(|| node.scale());
            *elapsed_ms += delta_ms;
            if s.duration_ms <= 0.0 {
                node.set_scale(s.target);
                return Ok(true);
            }
            let t = (*elapsed_ms / s.duration_ms).clamp(0.0, 1.0);
            node.set_scale(start + (s.target - start) * s.ease.apply(t));
            Ok(t >= 1.0)
        }
        (Action::Custom(c), Progress::Custom { fired }) => {
            if !*fired {
                // Marked before the call so a failing callback never refires.
                *fired = true;
                c.callback.call(node)?;
            }
            Ok(true)
        }
        (Action::Sequence(children), Progress::Sequence { index, child }) => {
            let mut delta = delta_ms;
            loop {
                let Some(child_action) = children.get(*index) else {
                    return Ok(true);
                };
                let slot = child.get_or_insert_with(|| Box::new(Progress::new(child_action)));
                if !advance(child_action, slot, node, delta)? {
                    return Ok(false);
                }
                // Child finished. The next child starts within this same
                // tick (zero delta), but the surplus of the tick's delta is
                // never forwarded into it; leftover time waits a frame.
                *index += 1;
                *child = None;
                delta = 0.0;
            }
        }
        (Action::Group(children), Progress::Group { children: states }) => {
            if children.len() != states.len() {
                return Err(shape_mismatch());
            }
            let mut all_done = true;
            for (child_action, state) in children.iter().zip(states.iter_mut()) {
                if state.done {
                    continue;
                }
                if advance(child_action, &mut state.progress, node, delta_ms)? {
                    state.done = true;
                } else {
                    all_done = false;
                }
            }
            Ok(all_done)
        }
        _ => Err(shape_mismatch()),
    }
}
