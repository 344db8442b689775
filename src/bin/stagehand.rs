use std::{cell::RefCell, rc::Rc};

use clap::{Parser, Subcommand};
use serde::Serialize;
use stagehand::{
    Action, ActionRunner, ActionTarget, Ease, NodeHandle, Point, RunOptions, StagehandResult,
    Vec2, custom, group, move_to, move_to_eased, scale_to, scale_to_eased, sequence, wait,
};

#[derive(Parser, Debug)]
#[command(name = "stagehand", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tick a demo timeline on fake nodes and print a JSON trace.
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Number of frames to tick.
    #[arg(long, default_value_t = 120)]
    frames: u32,

    /// Fixed timestep, frames per second.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Number of animated nodes.
    #[arg(long, default_value_t = 2)]
    nodes: usize,
}

#[derive(Debug)]
struct DemoNode {
    pos: Point,
    scale: Vec2,
}

impl ActionTarget for DemoNode {
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

/// One line of trace output per node per frame.
#[derive(Serialize)]
struct TraceRow {
    frame: u32,
    node: usize,
    x: f64,
    y: f64,
    sx: f64,
    sy: f64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Simulate(args) => cmd_simulate(args),
    }
}

fn cmd_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    if args.fps <= 0.0 {
        anyhow::bail!("fps must be > 0");
    }
    let delta_ms = 1000.0 / args.fps;

    let mut runner = ActionRunner::new();
    let handles: Vec<NodeHandle<DemoNode>> = (0..args.nodes)
        .map(|i| {
            Rc::new(RefCell::new(DemoNode {
                pos: Point::new(0.0, 24.0 * i as f64),
                scale: Vec2::new(1.0, 1.0),
            }))
        })
        .collect();

    for (i, handle) in handles.iter().enumerate() {
        runner.run_with(
            handle,
            demo_timeline(i)?,
            RunOptions::keyed("demo").on_complete(move |_, _, _| {
                eprintln!("node {i}: timeline complete");
                Ok(())
            }),
        )?;
    }

    for frame in 0..args.frames {
        runner.tick(delta_ms)?;
        for (i, handle) in handles.iter().enumerate() {
            let n = handle.borrow();
            let row = TraceRow {
                frame,
                node: i,
                x: n.pos.x,
                y: n.pos.y,
                sx: n.scale.x,
                sy: n.scale.y,
            };
            println!("{}", serde_json::to_string(&row)?);
        }
    }
    Ok(())
}

/// A representative timeline: an eased slide, a parallel zoom-while-moving
/// group, a marker callback, a beat of rest, then settle back to scale 1.
fn demo_timeline(i: usize) -> StagehandResult<Action> {
    let lane = 24.0 * i as f64;
    let slide_ms = 400.0 + 80.0 * i as f64;
    Ok(sequence(vec![
        move_to_eased(Point::new(120.0, lane), slide_ms, Ease::InOutQuad)?,
        group(vec![
            scale_to_eased(Vec2::new(2.0, 2.0), 300.0, Ease::OutCubic)?,
            move_to(Point::new(120.0, lane + 60.0), 500.0)?,
        ]),
        custom(move |_| {
            eprintln!("node {i}: marker");
            Ok(())
        }),
        wait(200.0)?,
        scale_to(Vec2::new(1.0, 1.0), 250.0)?,
    ]))
}
