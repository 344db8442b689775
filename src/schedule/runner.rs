//! Per-node registry of running action instances and the per-frame tick.

use std::{collections::BTreeMap, rc::Rc};

use crate::{
    action::model::Action,
    foundation::core::{ActionTarget, NodeHandle, NodeId, ensure_time_ms},
    foundation::error::{StagehandError, StagehandResult},
    schedule::instance::{Progress, advance},
};

/// Completion callback registered at `run` time.
///
/// Invoked synchronously within the tick, with the runner, the node the
/// action ran on and the completed template. It may freely call `run`,
/// `remove` or `remove_all` on any node: the completed instance is already
/// retired when the callback fires, and instances registered mid-tick are
/// not advanced until the next tick.
pub type CompletionFn<N> =
    Rc<dyn Fn(&mut ActionRunner<N>, &NodeHandle<N>, &Action) -> anyhow::Result<()>>;

/// Options for [`ActionRunner::run_with`].
pub struct RunOptions<N> {
    /// At most one running instance may occupy a (node, key) slot; a keyed
    /// run onto an occupied slot silently detaches the previous instance.
    pub key: Option<String>,
    pub on_complete: Option<CompletionFn<N>>,
}

impl<N> Default for RunOptions<N> {
    fn default() -> Self {
        Self {
            key: None,
            on_complete: None,
        }
    }
}

impl<N> RunOptions<N> {
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            on_complete: None,
        }
    }

    pub fn on_complete(
        mut self,
        f: impl Fn(&mut ActionRunner<N>, &NodeHandle<N>, &Action) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.on_complete = Some(Rc::new(f));
        self
    }
}

struct RunningAction<N> {
    id: u64,
    key: Option<String>,
    action: Rc<Action>,
    progress: Progress,
    elapsed_ms: f64,
    paused: bool,
    on_complete: Option<CompletionFn<N>>,
}

struct NodeActions<N> {
    node: NodeHandle<N>,
    running: Vec<RunningAction<N>>,
}

/// Registry of running action instances, grouped per node.
///
/// The runner never creates or destroys nodes; it holds a handle to each
/// node it has instances for and mutates node state only through the
/// [`ActionTarget`] capability. Single-threaded by construction.
pub struct ActionRunner<N> {
    nodes: BTreeMap<NodeId, NodeActions<N>>,
    next_id: u64,
}

impl<N: ActionTarget> Default for ActionRunner<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: ActionTarget> ActionRunner<N> {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Attaches `action` to `node` as a fresh unkeyed instance.
    pub fn run(&mut self, node: &NodeHandle<N>, action: Action) -> StagehandResult<()> {
        self.run_with(node, action, RunOptions::default())
    }

    /// Attaches `action` to `node`, validating the template first.
    ///
    /// If `opts.key` names an occupied slot, the previous instance is
    /// detached without firing its completion callback.
    pub fn run_with(
        &mut self,
        node: &NodeHandle<N>,
        action: Action,
        opts: RunOptions<N>,
    ) -> StagehandResult<()> {
        action.validate()?;

        let nid = NodeId::of(node);
        let entry = self.nodes.entry(nid).or_insert_with(|| NodeActions {
            node: node.clone(),
            running: Vec::new(),
        });

        if let Some(key) = opts.key.as_deref()
            && let Some(idx) = entry.running.iter().position(|r| r.key.as_deref() == Some(key))
        {
            entry.running.remove(idx);
            tracing::debug!(key, "replacing keyed action instance");
        }

        let id = self.next_id;
        self.next_id += 1;
        entry.running.push(RunningAction {
            id,
            key: opts.key,
            progress: Progress::new(&action),
            action: Rc::new(action),
            elapsed_ms: 0.0,
            paused: false,
            on_complete: opts.on_complete,
        });
        Ok(())
    }

    /// Detaches the instance under `key` without firing completion.
    /// No-op when the slot does not exist.
    pub fn remove(&mut self, node: &NodeHandle<N>, key: &str) {
        let nid = NodeId::of(node);
        if let Some(entry) = self.nodes.get_mut(&nid) {
            entry.running.retain(|r| r.key.as_deref() != Some(key));
            if entry.running.is_empty() {
                self.nodes.remove(&nid);
            }
        }
    }

    /// Detaches every instance on `node`.
    pub fn remove_all(&mut self, node: &NodeHandle<N>) {
        self.nodes.remove(&NodeId::of(node));
    }

    pub fn has_action(&self, node: &NodeHandle<N>, key: &str) -> bool {
        self.slot(node, key).is_some()
    }

    /// A paused instance is skipped by `tick`; its elapsed time is frozen
    /// and, for a composite, its active children freeze with it.
    pub fn pause(&mut self, node: &NodeHandle<N>, key: &str) {
        if let Some(run) = self.slot_mut(node, key) {
            run.paused = true;
        }
    }

    pub fn resume(&mut self, node: &NodeHandle<N>, key: &str) {
        if let Some(run) = self.slot_mut(node, key) {
            run.paused = false;
        }
    }

    /// Accumulated running time of the instance under `key`, in ms.
    pub fn elapsed_ms(&self, node: &NodeHandle<N>, key: &str) -> Option<f64> {
        self.slot(node, key).map(|r| r.elapsed_ms)
    }

    /// Number of instances currently attached to `node`.
    pub fn running_count(&self, node: &NodeHandle<N>) -> usize {
        self.nodes
            .get(&NodeId::of(node))
            .map_or(0, |e| e.running.len())
    }

    /// Advances every non-paused instance on every node by `delta_ms`.
    ///
    /// Node mutations apply immediately; completed instances are retired and
    /// their completion callbacks run synchronously, after the owning node's
    /// advancement pass. A zero delta is a legal tick: time does not
    /// progress, but not-yet-started instances run their start effects.
    /// Cross-node ordering is unspecified.
    ///
    /// On a callback or custom-action error the faulting instance is
    /// retired before the error propagates; the registry stays consistent.
    /// Instances that completed earlier in the same tick still get their
    /// completion callbacks, and the first error wins when several occur.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn tick(&mut self, delta_ms: f64) -> StagehandResult<()> {
        let delta_ms = ensure_time_ms(delta_ms, "tick delta_ms")?;

        // Two snapshots taken up front: the nodes to visit, and the id
        // horizon. Instance ids are allocated monotonically, so anything
        // registered mid-tick by a completion callback sits past the
        // horizon and is picked up next tick, on whatever node it landed.
        let id_horizon = self.next_id;
        let node_ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for nid in node_ids {
            self.tick_node(nid, delta_ms, id_horizon)?;
        }
        Ok(())
    }

    fn tick_node(&mut self, nid: NodeId, delta_ms: f64, id_horizon: u64) -> StagehandResult<()> {
        let mut finished: Vec<(Rc<Action>, Option<CompletionFn<N>>)> = Vec::new();
        let mut fault: Option<StagehandError> = None;

        let node = {
            // Entry may be gone if an earlier node's callback removed it.
            let Some(entry) = self.nodes.get_mut(&nid) else {
                return Ok(());
            };
            let node = entry.node.clone();

            let ids: Vec<u64> = entry
                .running
                .iter()
                .filter(|r| !r.paused && r.id < id_horizon)
                .map(|r| r.id)
                .collect();

            for iid in ids {
                let Some(idx) = entry.running.iter().position(|r| r.id == iid) else {
                    continue;
                };
                let res = {
                    let run = &mut entry.running[idx];
                    let mut n = node.borrow_mut();
                    advance(&run.action, &mut run.progress, &mut *n, delta_ms)
                };
                match res {
                    Ok(false) => {
                        entry.running[idx].elapsed_ms += delta_ms;
                    }
                    Ok(true) => {
                        let run = entry.running.remove(idx);
                        tracing::debug!(key = run.key.as_deref(), "action instance completed");
                        finished.push((run.action, run.on_complete));
                    }
                    Err(err) => {
                        entry.running.remove(idx);
                        fault = Some(err);
                        break;
                    }
                }
            }
            node
        };

        if self.nodes.get(&nid).is_some_and(|e| e.running.is_empty()) {
            self.nodes.remove(&nid);
        }

        // Completion callbacks run after this node's advancement pass, with
        // the completed instance already retired; they may re-enter the
        // runner freely. Every instance that completed in the pass gets its
        // callback even when a later instance faulted; the first error seen,
        // whether an advancement fault or a callback failure, propagates
        // once the callbacks have run.
        for (action, on_complete) in finished {
            if let Some(cb) = on_complete
                && let Err(err) = cb(self, &node, &action)
                && fault.is_none()
            {
                fault = Some(StagehandError::callback(err));
            }
        }
        match fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn slot(&self, node: &NodeHandle<N>, key: &str) -> Option<&RunningAction<N>> {
        self.nodes
            .get(&NodeId::of(node))?
            .running
            .iter()
            .find(|r| r.key.as_deref() == Some(key))
    }

    fn slot_mut(&mut self, node: &NodeHandle<N>, key: &str) -> Option<&mut RunningAction<N>> {
        self.nodes
            .get_mut(&NodeId::of(node))?
            .running
            .iter_mut()
            .find(|r| r.key.as_deref() == Some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ops::{custom, move_to, sequence, wait};
    use crate::foundation::core::{Point, Vec2};
    use std::cell::{Cell, RefCell};

    #[derive(Debug, Default)]
    struct FakeNode {
        pos: Point,
        scale: Vec2,
    }

    impl ActionTarget for FakeNode {
        fn position(&self) -> Point {
            self.pos
        }
        fn set_position(&mut self, pos: Point) {
            self.pos = pos;
        }
        fn scale(&self) -> Vec2 {
            self.scale
        }
        fn set_scale(&mut self, scale: Vec2) {
            self.scale = scale;
        }
    }

    fn node() -> NodeHandle<FakeNode> {
        Rc::new(RefCell::new(FakeNode::default()))
    }

    #[test]
    fn keyed_slot_queries() {
        let mut runner = ActionRunner::new();
        let n = node();
        runner
            .run_with(&n, wait(100.0).unwrap(), RunOptions::keyed("walk"))
            .unwrap();

        assert!(runner.has_action(&n, "walk"));
        assert!(!runner.has_action(&n, "jump"));
        assert_eq!(runner.elapsed_ms(&n, "walk"), Some(0.0));
        assert_eq!(runner.elapsed_ms(&n, "jump"), None);
    }

    #[test]
    fn lookup_misses_are_noops() {
        let mut runner: ActionRunner<FakeNode> = ActionRunner::new();
        let n = node();
        runner.remove(&n, "nope");
        runner.pause(&n, "nope");
        runner.resume(&n, "nope");
        runner.remove_all(&n);
        assert!(!runner.has_action(&n, "nope"));
    }

    #[test]
    fn rerunning_a_key_replaces_without_completion() {
        let completed = Rc::new(Cell::new(false));
        let c = completed.clone();

        let mut runner = ActionRunner::new();
        let n = node();
        runner
            .run_with(
                &n,
                wait(100.0).unwrap(),
                RunOptions::keyed("walk").on_complete(move |_, _, _| {
                    c.set(true);
                    Ok(())
                }),
            )
            .unwrap();
        runner
            .run_with(&n, wait(10.0).unwrap(), RunOptions::keyed("walk"))
            .unwrap();

        assert_eq!(runner.running_count(&n), 1);
        // Finish the replacement; the displaced instance's callback must
        // never have fired.
        runner.tick(10.0).unwrap();
        assert!(!completed.get());
        assert!(!runner.has_action(&n, "walk"));
    }

    #[test]
    fn completion_callback_gets_node_and_action() {
        let seen = Rc::new(Cell::new(false));
        let s = seen.clone();

        let mut runner = ActionRunner::new();
        let n = node();
        runner
            .run_with(
                &n,
                move_to(Point::new(4.0, 0.0), 20.0).unwrap(),
                RunOptions::<FakeNode>::default().on_complete(move |_, completed_on, action| {
                    assert_eq!(completed_on.borrow().pos, Point::new(4.0, 0.0));
                    assert_eq!(action.duration_ms(), 20.0);
                    s.set(true);
                    Ok(())
                }),
            )
            .unwrap();

        runner.tick(20.0).unwrap();
        assert!(seen.get());
        assert_eq!(runner.running_count(&n), 0);
    }

    #[test]
    fn callback_may_rerun_on_the_same_node() {
        let mut runner = ActionRunner::new();
        let n = node();
        runner
            .run_with(
                &n,
                wait(10.0).unwrap(),
                RunOptions::keyed("loop").on_complete(|runner, completed_on, _| {
                    runner.remove(completed_on, "loop"); // already retired: no-op
                    runner.run_with(
                        completed_on,
                        wait(10.0).unwrap(),
                        RunOptions::keyed("loop"),
                    )?;
                    Ok(())
                }),
            )
            .unwrap();

        runner.tick(10.0).unwrap();
        assert!(runner.has_action(&n, "loop"));
        // The freshly registered instance was not advanced in the same tick.
        assert_eq!(runner.elapsed_ms(&n, "loop"), Some(0.0));
    }

    #[test]
    fn pause_freezes_elapsed_and_resume_continues() {
        let mut runner = ActionRunner::new();
        let n = node();
        runner
            .run_with(&n, wait(100.0).unwrap(), RunOptions::keyed("idle"))
            .unwrap();

        runner.tick(30.0).unwrap();
        assert_eq!(runner.elapsed_ms(&n, "idle"), Some(30.0));

        runner.pause(&n, "idle");
        for _ in 0..5 {
            runner.tick(16.0).unwrap();
        }
        assert_eq!(runner.elapsed_ms(&n, "idle"), Some(30.0));

        runner.resume(&n, "idle");
        runner.tick(30.0).unwrap();
        assert_eq!(runner.elapsed_ms(&n, "idle"), Some(60.0));
    }

    #[test]
    fn negative_or_nan_delta_is_rejected() {
        let mut runner: ActionRunner<FakeNode> = ActionRunner::new();
        assert!(runner.tick(-1.0).is_err());
        assert!(runner.tick(f64::NAN).is_err());
        assert!(runner.tick(0.0).is_ok());
    }

    #[test]
    fn zero_delta_tick_runs_start_effects() {
        let fired = Rc::new(Cell::new(false));
        let f = fired.clone();

        let mut runner = ActionRunner::new();
        let n = node();
        runner
            .run(
                &n,
                custom(move |_| {
                    f.set(true);
                    Ok(())
                }),
            )
            .unwrap();

        runner.tick(0.0).unwrap();
        assert!(fired.get());
        assert_eq!(runner.running_count(&n), 0);
    }

    #[test]
    fn failing_custom_action_is_retired_before_error_propagates() {
        let mut runner = ActionRunner::new();
        let n = node();
        runner
            .run_with(
                &n,
                custom(|_| Err(anyhow::anyhow!("boom"))),
                RunOptions::keyed("bad"),
            )
            .unwrap();
        runner
            .run_with(&n, wait(100.0).unwrap(), RunOptions::keyed("good"))
            .unwrap();

        let err = runner.tick(16.0).unwrap_err();
        assert!(matches!(err, StagehandError::Callback(_)));
        assert!(!runner.has_action(&n, "bad"));
        assert!(runner.has_action(&n, "good"));
    }

    #[test]
    fn completed_callbacks_still_fire_when_a_later_instance_faults() {
        let completed = Rc::new(Cell::new(0u32));
        let c = completed.clone();

        let mut runner = ActionRunner::new();
        let n = node();
        runner
            .run_with(
                &n,
                wait(10.0).unwrap(),
                RunOptions::keyed("ok").on_complete(move |_, _, _| {
                    c.set(c.get() + 1);
                    Ok(())
                }),
            )
            .unwrap();
        runner
            .run_with(
                &n,
                custom(|_| Err(anyhow::anyhow!("boom"))),
                RunOptions::keyed("bad"),
            )
            .unwrap();

        let err = runner.tick(10.0).unwrap_err();
        assert!(matches!(err, StagehandError::Callback(_)));
        // The wait completed before the fault; its callback must not be lost.
        assert_eq!(completed.get(), 1);
        assert!(!runner.has_action(&n, "ok"));
        assert!(!runner.has_action(&n, "bad"));
    }

    #[test]
    fn a_failing_callback_does_not_starve_later_callbacks() {
        let second_fired = Rc::new(Cell::new(false));
        let s = second_fired.clone();

        let mut runner = ActionRunner::new();
        let n = node();
        runner
            .run_with(
                &n,
                wait(10.0).unwrap(),
                RunOptions::keyed("first")
                    .on_complete(|_, _, _| Err(anyhow::anyhow!("first failed"))),
            )
            .unwrap();
        runner
            .run_with(
                &n,
                wait(10.0).unwrap(),
                RunOptions::keyed("second").on_complete(move |_, _, _| {
                    s.set(true);
                    Ok(())
                }),
            )
            .unwrap();

        let err = runner.tick(10.0).unwrap_err();
        assert!(matches!(err, StagehandError::Callback(_)));
        assert!(second_fired.get());
    }

    #[test]
    fn registry_drops_node_entry_when_last_instance_retires() {
        let mut runner = ActionRunner::new();
        let n = node();
        runner.run(&n, wait(10.0).unwrap()).unwrap();
        assert_eq!(runner.running_count(&n), 1);
        runner.tick(10.0).unwrap();
        assert_eq!(runner.running_count(&n), 0);
        // Only the caller's handle remains.
        assert_eq!(Rc::strong_count(&n), 1);
    }

    #[test]
    fn one_template_runs_on_many_nodes_independently() {
        let action = sequence(vec![
            wait(10.0).unwrap(),
            move_to(Point::new(10.0, 0.0), 10.0).unwrap(),
        ]);

        let mut runner = ActionRunner::new();
        let a = node();
        let b = node();
        b.borrow_mut().pos = Point::new(100.0, 0.0);

        runner.run(&a, action.clone()).unwrap();
        runner.run(&b, action).unwrap();

        runner.tick(15.0).unwrap(); // waits done, moves started
        runner.tick(5.0).unwrap(); // moves halfway
        assert_eq!(a.borrow().pos, Point::new(5.0, 0.0));
        assert_eq!(b.borrow().pos, Point::new(55.0, 0.0));
    }

    #[test]
    fn run_rejects_invalid_template() {
        let mut runner = ActionRunner::new();
        let n = node();
        let bad = Action::Wait(crate::action::model::WaitAction { duration_ms: -5.0 });
        assert!(runner.run(&n, bad).is_err());
        assert_eq!(runner.running_count(&n), 0);
    }
}
