use std::sync::Arc;

use futures::channel::oneshot;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    common::{axis::Axis, quantity::Quantity},
    error::{Error, Result},
    frame::{
        interpolation::{InterpolationMethod, Interpolator},
        Frame, Grid,
    },
    geom::Vec2F,
    runner::{indexed, BatchHandle, CancelToken, Dispatcher, TaskRunner},
    stack::Stack,
};

/// A polyline through a frame's coordinate domain, defined by its knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    key: String,
    knobs: Vec<Vec2F>,
}

impl Profile {
    pub fn new(key: impl Into<String>, knobs: Vec<Vec2F>) -> Self {
        Self {
            key: key.into(),
            knobs,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn knobs(&self) -> &[Vec2F] {
        &self.knobs
    }

    pub fn add_knob(&mut self, knob: Vec2F) {
        self.knobs.push(knob);
    }

    /// Inserts `knob` before the knob at `index`, or appends it for `index == len`.
    pub fn insert_knob(&mut self, index: usize, knob: Vec2F) -> Result<()> {
        if index > self.knobs.len() {
            return Err(Error::OutOfRange {
                index,
                count: self.knobs.len(),
            });
        }
        self.knobs.insert(index, knob);
        Ok(())
    }

    pub fn move_knob(&mut self, index: usize, to: Vec2F) -> Result<()> {
        let count = self.knobs.len();
        let knob = self
            .knobs
            .get_mut(index)
            .ok_or(Error::OutOfRange { index, count })?;
        *knob = to;
        Ok(())
    }

    pub fn remove_knob(&mut self, index: usize) -> Result<Vec2F> {
        if index >= self.knobs.len() {
            return Err(Error::OutOfRange {
                index,
                count: self.knobs.len(),
            });
        }
        Ok(self.knobs.remove(index))
    }

    /// Arc length of the polyline.
    pub fn length(&self) -> f32 {
        self.knobs.windows(2).map(|w| w[0].distance(w[1])).sum()
    }

    /// The point `distance` along the polyline, clamped to its ends.
    pub fn point_at(&self, distance: f32) -> Option<Vec2F> {
        let (first, rest) = self.knobs.split_first()?;
        let mut walked = 0.0;
        let mut previous = *first;
        for &knob in rest {
            let segment = previous.distance(knob);
            if segment > 0.0 && distance <= walked + segment {
                let t = ((distance - walked) / segment).max(0.0);
                return Some(previous.lerp(knob, t));
            }
            walked += segment;
            previous = knob;
        }
        Some(previous)
    }

    /// `count` points equally spaced by arc length, from the first knob to
    /// exactly the last one.
    pub fn sample_positions(&self, count: usize) -> Result<Vec<Vec2F>> {
        if count < 2 {
            return Err(Error::invalid_settings(format!(
                "a profile needs at least 2 sample points, got {count}"
            )));
        }
        let length = self.length();
        if !(length.is_finite() && length > 0.0) {
            return Err(Error::DegenerateProfile {
                key: self.key.clone(),
            });
        }

        let spacing = length / (count - 1) as f32;
        let mut positions = Vec::with_capacity(count);
        let mut segments = self.knobs.windows(2).filter(|w| w[0] != w[1]);
        let mut segment = match segments.next() {
            Some(w) => (w[0], w[1]),
            None => return Err(Error::DegenerateProfile { key: self.key.clone() }),
        };
        let mut walked = 0.0;
        for i in 0..count - 1 {
            let target = spacing * i as f32;
            let mut segment_length = segment.0.distance(segment.1);
            while target > walked + segment_length {
                match segments.next() {
                    Some(w) => {
                        walked += segment_length;
                        segment = (w[0], w[1]);
                        segment_length = segment.0.distance(segment.1);
                    }
                    None => break,
                }
            }
            let t = ((target - walked) / segment_length).clamp(0.0, 1.0);
            positions.push(segment.0.lerp(segment.1, t));
        }
        positions.push(*self.knobs.last().unwrap_or(&segment.1));
        Ok(positions)
    }
}

#[derive(Debug, Clone)]
pub struct CrossSectionSettings {
    pub interpolation: Interpolator,
    pub point_count: usize,
}

impl CrossSectionSettings {
    pub fn new(point_count: usize, interpolation: impl Into<Interpolator>) -> Self {
        Self {
            interpolation: interpolation.into(),
            point_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.point_count < 2 {
            return Err(Error::invalid_settings(format!(
                "a cross section needs at least 2 points, got {}",
                self.point_count
            )));
        }
        Ok(())
    }
}

impl Default for CrossSectionSettings {
    fn default() -> Self {
        Self::new(100, InterpolationMethod::Bilinear)
    }
}

/// Everything needed to turn per-frame samples into the profile frame.
#[derive(Debug, Clone)]
struct Layout {
    id: String,
    depth: Axis,
    distance: Axis,
    quantity: Quantity,
}

impl Layout {
    fn assemble(self, rows: Vec<Vec<f32>>) -> Result<Frame> {
        let shape = (rows.len(), self.distance.count());
        let values = Array2::from_shape_vec(shape, rows.concat())?;
        Frame::new(self.id, Grid::new(self.depth, self.distance), values, self.quantity)
    }
}

fn plan(stack: &Stack, profile: &Profile, settings: &CrossSectionSettings) -> Result<(Vec<Vec2F>, Layout)> {
    settings.validate()?;
    let positions = profile.sample_positions(settings.point_count)?;
    let spacing = profile.length() / (settings.point_count - 1) as f32;
    let column_unit = &stack.guiding_grid().columns().quantity().unit;
    let distance = Axis::new(
        0.0,
        spacing,
        settings.point_count,
        Quantity::new("Distance", column_unit.clone()),
    )?;
    let layout = Layout {
        id: format!("Profile {}", profile.key()),
        depth: stack.depth_axis().clone(),
        distance,
        quantity: stack.frames()[0].quantity().clone(),
    };
    Ok((positions, layout))
}

/// Samples every frame of `stack` along `profile`, one frame after another.
///
/// The result has one row per frame, along the stack's depth axis, and one
/// column per sample point, along the arc length of the profile.
#[instrument(skip_all, fields(profile = profile.key(), frames = stack.len(), points = settings.point_count))]
pub fn slice(stack: &Stack, profile: &Profile, settings: &CrossSectionSettings) -> Result<Frame> {
    let (positions, layout) = plan(stack, profile, settings)?;
    let rows = stack
        .frames()
        .iter()
        .map(|frame| frame.sample_along(&positions, settings.interpolation.as_ref()))
        .collect();
    layout.assemble(rows)
}

/// [`slice`] with the frames sampled concurrently.
///
/// Invalid settings and degenerate profiles are reported right away, before
/// any work is scheduled.
#[instrument(skip_all, fields(profile = profile.key(), frames = stack.len(), points = settings.point_count))]
pub fn spawn_slice(
    runner: &TaskRunner,
    stack: &Stack,
    profile: &Profile,
    settings: &CrossSectionSettings,
) -> Result<BatchHandle<Frame>> {
    let (tx, rx) = oneshot::channel();
    let cancel = submit_slice(runner, stack, profile, settings, move |frame| {
        let _ = tx.send(frame);
    })?;
    Ok(BatchHandle::new(rx, cancel))
}

/// [`slice`] with the frames sampled concurrently, handing the profile frame
/// to `sink` on the thread served by `dispatcher`.
pub fn slice_dispatched<D, S>(
    runner: &TaskRunner,
    stack: &Stack,
    profile: &Profile,
    settings: &CrossSectionSettings,
    dispatcher: D,
    sink: S,
) -> Result<CancelToken>
where
    D: Dispatcher,
    S: FnOnce(Result<Frame>) + Send + 'static,
{
    submit_slice(runner, stack, profile, settings, move |frame| {
        dispatcher.dispatch(Box::new(move || sink(frame)))
    })
}

fn submit_slice<C>(
    runner: &TaskRunner,
    stack: &Stack,
    profile: &Profile,
    settings: &CrossSectionSettings,
    on_complete: C,
) -> Result<CancelToken>
where
    C: FnOnce(Result<Frame>) + Send + 'static,
{
    let (positions, layout) = plan(stack, profile, settings)?;
    let positions = Arc::new(positions);
    let frames = stack.shared_frames();
    let interpolation = settings.interpolation.clone();
    let tasks = indexed(frames.len(), move |i| {
        Ok(frames[i].sample_along(&positions, interpolation.as_ref()))
    });
    debug!(units = tasks.len(), "Dispatching profile sampling");
    Ok(runner.submit(tasks, move |rows| {
        on_complete(rows.and_then(|rows| layout.assemble(rows)))
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        frame::tests::ramp,
        runner::{EventQueue, RunnerConfig},
    };

    fn p(x: f32, y: f32) -> Vec2F {
        Vec2F::new(x, y)
    }

    fn close(a: Vec2F, b: Vec2F) -> bool {
        a.distance(b) < 1e-4
    }

    fn stack() -> Stack {
        let frames = (0..3)
            .map(|i| ramp(&format!("f{i}"), 5, 5, 100.0 * i as f32))
            .collect();
        Stack::with_index_depth(frames, Quantity::new("Time", "s")).unwrap()
    }

    #[test]
    fn knob_editing() {
        let mut profile = Profile::new("p", vec![p(0.0, 0.0)]);
        profile.add_knob(p(3.0, 4.0));
        profile.insert_knob(1, p(0.0, 4.0)).unwrap();
        assert_eq!(profile.knobs(), [p(0.0, 0.0), p(0.0, 4.0), p(3.0, 4.0)]);
        assert_eq!(profile.length(), 7.0);

        profile.move_knob(1, p(3.0, 0.0)).unwrap();
        assert_eq!(profile.length(), 7.0);
        assert_eq!(profile.remove_knob(1).unwrap(), p(3.0, 0.0));
        assert_eq!(profile.length(), 5.0);

        assert!(matches!(profile.insert_knob(3, p(0.0, 0.0)), Err(Error::OutOfRange { .. })));
        assert!(profile.move_knob(2, p(0.0, 0.0)).is_err());
        assert!(profile.remove_knob(2).is_err());
    }

    #[test]
    fn point_at_clamps_to_ends() {
        let profile = Profile::new("p", vec![p(0.0, 0.0), p(3.0, 4.0), p(3.0, 10.0)]);
        assert!(close(profile.point_at(-1.0).unwrap(), p(0.0, 0.0)));
        assert!(close(profile.point_at(2.5).unwrap(), p(1.5, 2.0)));
        assert!(close(profile.point_at(8.0).unwrap(), p(3.0, 7.0)));
        assert!(close(profile.point_at(50.0).unwrap(), p(3.0, 10.0)));
        assert_eq!(Profile::new("empty", vec![]).point_at(0.0), None);
    }

    #[test]
    fn positions_are_equally_spaced() {
        let profile = Profile::new(
            "p",
            vec![p(0.0, 0.0), p(3.0, 4.0), p(3.0, 4.0), p(3.0, 10.0)],
        );
        let positions = profile.sample_positions(12).unwrap();
        assert_eq!(positions.len(), 12);
        assert!(close(positions[0], p(0.0, 0.0)));
        assert!(close(positions[5], p(3.0, 4.0)));
        assert!(close(positions[8], p(3.0, 7.0)));
        assert_eq!(positions[11], p(3.0, 10.0));
        for w in positions.windows(2) {
            assert!((w[0].distance(w[1]) - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn zero_length_profiles_are_degenerate() {
        let settings = CrossSectionSettings::new(5, InterpolationMethod::Bilinear);
        for knobs in [vec![], vec![p(1.0, 1.0)], vec![p(2.0, 2.0), p(2.0, 2.0)]] {
            let profile = Profile::new("flat", knobs);
            assert!(matches!(
                slice(&stack(), &profile, &settings),
                Err(Error::DegenerateProfile { key }) if key == "flat"
            ));
        }
    }

    #[test]
    fn concurrent_variants_reject_zero_length_profiles_up_front() {
        let s = stack();
        let profile = Profile::new("flat", vec![p(2.0, 2.0), p(2.0, 2.0)]);
        let settings = CrossSectionSettings::new(5, InterpolationMethod::Bilinear);
        assert!(matches!(
            spawn_slice(TaskRunner::global(), &s, &profile, &settings),
            Err(Error::DegenerateProfile { key }) if key == "flat"
        ));

        let queue = EventQueue::new();
        let (tx, rx) = crossbeam::channel::bounded::<Result<Frame>>(1);
        let submitted = slice_dispatched(
            TaskRunner::global(),
            &s,
            &profile,
            &settings,
            queue.dispatcher(),
            move |frame| {
                let _ = tx.send(frame);
            },
        );
        assert!(matches!(submitted, Err(Error::DegenerateProfile { .. })));
        // nothing was scheduled, so the sink never hears back
        assert!(!queue.run_next_timeout(Duration::from_millis(50)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn too_few_points_are_rejected() {
        let profile = Profile::new("p", vec![p(0.0, 0.0), p(4.0, 0.0)]);
        let settings = CrossSectionSettings::new(1, InterpolationMethod::Bilinear);
        assert!(matches!(
            slice(&stack(), &profile, &settings),
            Err(Error::InvalidSettings(_))
        ));
        assert!(matches!(
            spawn_slice(TaskRunner::global(), &stack(), &profile, &settings),
            Err(Error::InvalidSettings(_))
        ));
    }

    #[test]
    fn slice_along_a_row() {
        let s = stack();
        // y = 2 is row 2, x runs across all columns
        let profile = Profile::new("row", vec![p(0.0, 2.0), p(4.0, 2.0)]);
        let frame = slice(&s, &profile, &CrossSectionSettings::new(5, InterpolationMethod::Bilinear)).unwrap();

        assert_eq!(frame.shape(), (3, 5));
        assert_eq!(frame.grid().rows(), s.depth_axis());
        let distance = frame.grid().columns();
        assert_eq!(distance.step(), 1.0);
        assert_eq!(distance.quantity(), &Quantity::new("Distance", "m"));
        assert_eq!(frame.quantity(), s.frames()[0].quantity());
        for j in 0..3 {
            for c in 0..5 {
                let expected = 100.0 * j as f32 + 20.0 + c as f32;
                assert!((frame.values()[[j, c]] - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn column_count_matches_point_count() {
        let s = stack();
        let profile = Profile::new("diag", vec![p(0.0, 0.0), p(4.0, 3.0), p(1.0, 4.0)]);
        for n in 2..=20 {
            let settings = CrossSectionSettings::new(n, InterpolationMethod::NearestNeighbour);
            let frame = slice(&s, &profile, &settings).unwrap();
            assert_eq!(frame.grid().columns().count(), n);
            assert!((frame.grid().columns().last() - profile.length()).abs() < 1e-3);
        }
    }

    #[test]
    fn concurrent_slice_matches_sequential() {
        let s = stack();
        let profile = Profile::new("diag", vec![p(0.5, 0.0), p(4.0, 3.5)]);
        let settings = CrossSectionSettings::new(17, InterpolationMethod::Bilinear);
        let expected = slice(&s, &profile, &settings).unwrap();

        let runner = TaskRunner::new(&RunnerConfig {
            workers: 3,
            ..Default::default()
        });
        let handle = spawn_slice(&runner, &s, &profile, &settings).unwrap();
        assert_eq!(handle.join().unwrap(), expected);
    }

    #[tokio::test]
    async fn awaitable_slice() {
        let s = stack();
        let profile = Profile::new("row", vec![p(0.0, 1.0), p(4.0, 1.0)]);
        let handle = spawn_slice(TaskRunner::global(), &s, &profile, &CrossSectionSettings::default()).unwrap();
        let frame = handle.wait().await.unwrap();
        assert_eq!(frame.shape(), (3, 100));
    }

    #[test]
    fn dispatched_slice_resolves_on_queue_thread() {
        let s = stack();
        let profile = Profile::new("row", vec![p(0.0, 1.0), p(4.0, 1.0)]);
        let queue = EventQueue::new();
        let (tx, rx) = crossbeam::channel::bounded(1);

        slice_dispatched(
            TaskRunner::global(),
            &s,
            &profile,
            &CrossSectionSettings::new(5, InterpolationMethod::Bilinear),
            queue.dispatcher(),
            move |frame| {
                tx.send((std::thread::current().id(), frame)).unwrap();
            },
        )
        .unwrap();

        assert!(queue.run_next_timeout(Duration::from_secs(10)));
        let (thread, frame) = rx.try_recv().unwrap();
        assert_eq!(thread, std::thread::current().id());
        assert_eq!(frame.unwrap().shape(), (3, 5));
    }
}
