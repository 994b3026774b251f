use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre;
use tracing::{info, Level};

use stack_toolbox_core::{
    common::{axis::Axis, quantity::Quantity, stats::StatisticKind},
    frame::{interpolation::InterpolationMethod, Frame, Grid},
    geom::Vec2F,
    profile::{spawn_slice, CrossSectionSettings, Profile},
    resample::{resize_stack, ResizeSettings},
    roi::{EllipseRoi, RectangleRoi},
    runner::{RunnerConfig, TaskRunner},
    sections::{horizontal_sections, vertical_sections, Gridding},
    stack::{PlaybackMode, Stack},
    statistics::{compute, NamedRoi},
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More output per occurrence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Worker threads, 0 for one per core
    #[arg(long, default_value_t = 0, global = true)]
    workers: usize,

    /// Frames of the synthetic stack
    #[arg(long, default_value_t = 8, global = true)]
    frames: usize,

    /// Rows of each synthetic frame
    #[arg(long, default_value_t = 32, global = true)]
    rows: usize,

    /// Columns of each synthetic frame
    #[arg(long, default_value_t = 48, global = true)]
    columns: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cut the stack into horizontal or vertical sections
    Sections {
        #[arg(long)]
        vertical: bool,
        /// Resample to ROWSxCOLUMNS before cutting
        #[arg(long, value_parser = parse_shape)]
        resize: Option<(usize, usize)>,
        #[arg(long, value_enum, default_value_t = Method::Bilinear)]
        method: Method,
    },
    /// Sample every frame along a polyline given as x,y knobs
    Profile {
        #[arg(required = true, num_args = 2.., value_parser = parse_point)]
        knobs: Vec<Vec2F>,
        #[arg(long, default_value_t = 64)]
        points: usize,
        #[arg(long, value_enum, default_value_t = Method::Bilinear)]
        method: Method,
    },
    /// Resample every frame to a new resolution
    Resize {
        #[arg(value_parser = parse_shape)]
        shape: (usize, usize),
        #[arg(long, value_enum, default_value_t = Method::Bilinear)]
        method: Method,
    },
    /// Statistics of a centered box and disc over all frames
    Stats {
        #[arg(long, value_enum, num_args = 1.., default_values_t = [Kind::Mean, Kind::Max])]
        kinds: Vec<Kind>,
    },
    /// Step through the stack with the playback cursor
    Play {
        #[arg(long, value_enum, default_value_t = Mode::Bounce)]
        mode: Mode,
        #[arg(long, default_value_t = 16)]
        ticks: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Nearest,
    Bilinear,
}

impl From<Method> for InterpolationMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Nearest => InterpolationMethod::NearestNeighbour,
            Method::Bilinear => InterpolationMethod::Bilinear,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Count,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Range,
    Variance,
    StdDev,
    Rms,
}

impl From<Kind> for StatisticKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Count => StatisticKind::Count,
            Kind::Sum => StatisticKind::Sum,
            Kind::Mean => StatisticKind::Mean,
            Kind::Median => StatisticKind::Median,
            Kind::Min => StatisticKind::Minimum,
            Kind::Max => StatisticKind::Maximum,
            Kind::Range => StatisticKind::Range,
            Kind::Variance => StatisticKind::Variance,
            Kind::StdDev => StatisticKind::StdDev,
            Kind::Rms => StatisticKind::Rms,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Once,
    Loop,
    Bounce,
}

impl From<Mode> for PlaybackMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Once => PlaybackMode::Once,
            Mode::Loop => PlaybackMode::Loop,
            Mode::Bounce => PlaybackMode::Bounce,
        }
    }
}

fn parse_point(s: &str) -> Result<Vec2F, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{s}'"))?;
    let x = x.trim().parse::<f32>().map_err(|e| e.to_string())?;
    let y = y.trim().parse::<f32>().map_err(|e| e.to_string())?;
    Ok(Vec2F::new(x, y))
}

fn parse_shape(s: &str) -> Result<(usize, usize), String> {
    let (rows, columns) = s
        .split_once('x')
        .ok_or_else(|| format!("expected ROWSxCOLUMNS but got '{s}'"))?;
    let rows = rows.trim().parse::<usize>().map_err(|e| e.to_string())?;
    let columns = columns.trim().parse::<usize>().map_err(|e| e.to_string())?;
    Ok((rows, columns))
}

/// A gaussian bump drifting across the frame over time.
fn synthetic_stack(frames: usize, rows: usize, columns: usize) -> eyre::Result<Stack> {
    let grid = Grid::new(
        Axis::new(0.0, 0.1, rows, Quantity::new("Y", "µm"))?,
        Axis::new(0.0, 0.1, columns, Quantity::new("X", "µm"))?,
    );
    let depth = Axis::new(0.0, 0.5, frames, Quantity::new("Time", "s"))?;
    let width = grid.columns().maximum();
    let height = grid.rows().maximum();
    let sigma = 0.15 * width.min(height).max(0.1);

    let frames = depth
        .values()
        .enumerate()
        .map(|(i, t)| {
            let progress = if frames > 1 {
                i as f32 / (frames - 1) as f32
            } else {
                0.5
            };
            let center = Vec2F::new(width * (0.2 + 0.6 * progress), height * 0.5);
            Frame::from_fn(
                format!("t = {t:.1} s"),
                grid.clone(),
                Quantity::new("Height", "nm"),
                |(r, c)| {
                    let p = Vec2F::new(c as f32 * 0.1, r as f32 * 0.1);
                    let d = p.distance(center) / sigma;
                    10.0 * (-0.5 * d * d).exp()
                },
            )
        })
        .collect();
    Ok(Stack::new(frames, depth)?)
}

fn summarize(frame: &Frame) {
    let (rows, columns) = frame.shape();
    match frame.value_range() {
        Some(range) => println!(
            "{:>24}  {rows}x{columns}  {} in [{:.3}, {:.3}]",
            frame.id(),
            frame.quantity(),
            range.min,
            range.max
        ),
        None => println!("{:>24}  {rows}x{columns}  no finite values", frame.id()),
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let runner = TaskRunner::new(&RunnerConfig {
        workers: args.workers,
        ..Default::default()
    });
    let mut stack = synthetic_stack(args.frames, args.rows, args.columns)?;
    info!(frames = stack.len(), workers = runner.workers(), "Built synthetic stack");

    match args.command {
        Command::Sections {
            vertical,
            resize,
            method,
        } => {
            let gridding = match resize {
                Some((rows, columns)) => {
                    Gridding::Resize(ResizeSettings::new(rows, columns, InterpolationMethod::from(method)))
                }
                None => Gridding::AlignToFirst(InterpolationMethod::from(method).interpolator()),
            };
            let sections = if vertical {
                vertical_sections(&runner, &stack, &gridding)?
            } else {
                horizontal_sections(&runner, &stack, &gridding)?
            };
            println!("{} sections along {}", sections.len(), sections.depth_quantity());
            sections.frames().iter().for_each(summarize);
        }
        Command::Profile {
            knobs,
            points,
            method,
        } => {
            let profile = Profile::new("cli", knobs);
            let settings = CrossSectionSettings::new(points, InterpolationMethod::from(method));
            let handle = spawn_slice(&runner, &stack, &profile, &settings)?;
            let frame = handle.wait().await?;
            println!(
                "Profile of length {:.3} {}",
                profile.length(),
                frame.grid().columns().quantity().unit
            );
            summarize(&frame);
            for (t, row) in stack.depth_axis().values().zip(frame.values().rows()) {
                let peak = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                println!("{t:>8.2} s  peak {peak:.3}");
            }
        }
        Command::Resize { shape, method } => {
            let settings = ResizeSettings::new(shape.0, shape.1, InterpolationMethod::from(method));
            let resized = resize_stack(&runner, &stack, &settings)?;
            resized.frames().iter().for_each(summarize);
        }
        Command::Stats { kinds } => {
            let grid = stack.guiding_grid().clone();
            let center = Vec2F::new(grid.columns().maximum() / 2.0, grid.rows().maximum() / 2.0);
            let half = Vec2F::new(grid.columns().maximum() / 4.0, grid.rows().maximum() / 4.0);
            let rois = [
                NamedRoi::new("box", Arc::new(RectangleRoi::new(center - half, center + half))),
                NamedRoi::new("disc", Arc::new(EllipseRoi::new(center, half))),
            ];
            let kinds: Vec<StatisticKind> = kinds.into_iter().map(StatisticKind::from).collect();
            for series in compute(&runner, &stack, &rois, &kinds)? {
                let values: Vec<String> = series.values.iter().map(|v| format!("{v:.3}")).collect();
                println!("{:>6} {}: {}", series.roi_key, series.quantity, values.join(" "));
            }
        }
        Command::Play { mode, ticks } => {
            stack.set_playback_mode(mode.into());
            stack.play();
            for _ in 0..ticks {
                match stack.tick() {
                    Some(change) => println!(
                        "{} -> {} at {:.2} {}",
                        change.previous,
                        change.current,
                        stack.current_depth(),
                        stack.depth_quantity().unit
                    ),
                    None => break,
                }
            }
        }
    }

    Ok(())
}
