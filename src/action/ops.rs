//! Free-function constructors for action templates.
//!
//! Constructors that take a duration validate it up front; a bad time
//! quantity is a caller bug and surfaces here, never at tick time.

use crate::{
    action::ease::Ease,
    action::model::{Action, CustomAction, CustomFn, MoveAction, ScaleAction, WaitAction},
    foundation::core::{ActionTarget, Point, Vec2, ensure_time_ms},
    foundation::error::StagehandResult,
};

pub fn wait(duration_ms: f64) -> StagehandResult<Action> {
    let duration_ms = ensure_time_ms(duration_ms, "Wait duration_ms")?;
    Ok(Action::Wait(WaitAction { duration_ms }))
}

pub fn move_to(target: Point, duration_ms: f64) -> StagehandResult<Action> {
    move_to_eased(target, duration_ms, Ease::Linear)
}

pub fn move_to_eased(target: Point, duration_ms: f64, ease: Ease) -> StagehandResult<Action> {
    let action = Action::Move(MoveAction {
        target,
        duration_ms,
        ease,
    });
    action.validate()?;
    Ok(action)
}

pub fn scale_to(target: Vec2, duration_ms: f64) -> StagehandResult<Action> {
    scale_to_eased(target, duration_ms, Ease::Linear)
}

pub fn scale_to_eased(target: Vec2, duration_ms: f64, ease: Ease) -> StagehandResult<Action> {
    let action = Action::Scale(ScaleAction {
        target,
        duration_ms,
        ease,
    });
    action.validate()?;
    Ok(action)
}

pub fn custom(f: impl Fn(&mut dyn ActionTarget) -> anyhow::Result<()> + 'static) -> Action {
    Action::Custom(CustomAction {
        callback: CustomFn::new(f),
    })
}

pub fn sequence(children: Vec<Action>) -> Action {
    Action::Sequence(children)
}

pub fn group(children: Vec<Action>) -> Action {
    Action::Group(children)
}
