//! Stagehand is a scene-graph node animation scheduler.
//!
//! It composes primitive and combinator actions (move, scale, wait, custom
//! callback, sequence, parallel group) into executable timelines, attaches
//! them to graph nodes, advances them deterministically once per frame and
//! reports completion. The host owns the render loop, the node tree and
//! drawing; Stagehand only mutates node state through the [`ActionTarget`]
//! capability and is driven by [`ActionRunner::tick`] with elapsed-time
//! deltas.
//!
//! # Model
//!
//! 1. **Templates**: an [`Action`] is an immutable description of a timed
//!    behavior; composites nest arbitrarily and compute their duration from
//!    their children on every observation.
//! 2. **Instances**: each `run` creates a private mutable progress record,
//!    so one template can drive any number of nodes at once.
//! 3. **Tick**: once per frame the runner advances every non-paused
//!    instance, applies node mutations immediately, retires completed
//!    instances and fires their completion callbacks synchronously.
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic-by-default**: advancement is pure CPU work, a function
//!   of accumulated deltas only.
//! - **Single-threaded**: "concurrent" actions are logically simultaneous
//!   within a frame, never parallel.
//! - **Construction-time validation**: bad durations and malformed trees
//!   are rejected when built, never discovered at tick time.
#![forbid(unsafe_code)]

mod action;
mod foundation;
mod schedule;

pub use action::ease::Ease;
pub use action::model::{
    Action, CustomAction, CustomFn, MAX_ACTION_DEPTH, MoveAction, ScaleAction, WaitAction,
};
pub use action::ops::{
    custom, group, move_to, move_to_eased, scale_to, scale_to_eased, sequence, wait,
};
pub use foundation::core::{ActionTarget, NodeHandle, NodeId, Point, Vec2};
pub use foundation::error::{StagehandError, StagehandResult};
pub use schedule::runner::{ActionRunner, CompletionFn, RunOptions};
