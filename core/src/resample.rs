use std::sync::Arc;

use get_size::GetSize;
use tracing::{debug, instrument, warn};

use crate::{
    error::{Error, Result},
    frame::{
        interpolation::{InterpolationMethod, Interpolator},
        Frame, Grid,
    },
    runner::{indexed, TaskRunner},
    stack::Stack,
};

/// Target resolution of a resampling pass.
#[derive(Debug, Clone)]
pub struct ResizeSettings {
    pub rows: usize,
    pub columns: usize,
    pub interpolation: Interpolator,
}

impl ResizeSettings {
    pub fn new(rows: usize, columns: usize, interpolation: impl Into<Interpolator>) -> Self {
        Self {
            rows,
            columns,
            interpolation: interpolation.into(),
        }
    }

    pub fn bilinear(rows: usize, columns: usize) -> Self {
        Self::new(rows, columns, InterpolationMethod::Bilinear)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows < 2 || self.columns < 2 {
            return Err(Error::invalid_settings(format!(
                "cannot resize to {}x{}, at least 2 points are needed along each axis",
                self.rows, self.columns
            )));
        }
        Ok(())
    }
}

/// Resamples every frame to `settings`' resolution.
///
/// The guiding grid is frame 0's grid resized to the target resolution, and
/// every frame is forced onto exactly that grid. `frames` are copied once to
/// be shared with the workers; use [`resize_stack`] to avoid the copy.
#[instrument(skip_all, fields(frames = frames.len(), rows = settings.rows, columns = settings.columns))]
pub fn resize_all(
    runner: &TaskRunner,
    frames: &[Frame],
    settings: &ResizeSettings,
) -> Result<Vec<Frame>> {
    settings.validate()?;
    let Some(first) = frames.first() else {
        return Ok(Vec::new());
    };
    let guide = first.grid().resized(settings.rows, settings.columns)?;
    regrid_shared(runner, frames.into(), guide, &settings.interpolation)
}

/// [`resize_all`] over a stack, keeping its depth axis and cursor.
#[instrument(skip_all, fields(frames = stack.len(), rows = settings.rows, columns = settings.columns))]
pub fn resize_stack(runner: &TaskRunner, stack: &Stack, settings: &ResizeSettings) -> Result<Stack> {
    settings.validate()?;
    let guide = stack
        .guiding_grid()
        .resized(settings.rows, settings.columns)?;
    let frames = regrid_shared(runner, stack.shared_frames(), guide, &settings.interpolation)?;
    derived_stack(stack, frames)
}

/// Regrids the frames of `stack` that do not share its guiding grid onto it.
///
/// Returns a cheap clone when the stack is already consistent.
#[instrument(skip_all, fields(frames = stack.len()))]
pub fn align_to_guide(
    runner: &TaskRunner,
    stack: &Stack,
    interpolation: &Interpolator,
) -> Result<Stack> {
    let Some(first_mismatch) = stack.first_mismatch() else {
        return Ok(stack.clone());
    };
    warn!(
        first_mismatch,
        "Frames are gridded differently, aligning them to the grid of frame 0"
    );

    let guide = Arc::new(stack.guiding_grid().clone());
    let frames = stack.shared_frames();
    let interpolation = interpolation.clone();
    let tasks = indexed(frames.len(), move |i| {
        let frame = &frames[i];
        if frame.grid().is_compatible(&guide) {
            Ok(frame.clone())
        } else {
            Ok(frame.regridded(&guide, interpolation.as_ref()))
        }
    });
    let frames = runner.run(tasks)?;
    derived_stack(stack, frames)
}

pub(crate) fn regrid_shared(
    runner: &TaskRunner,
    frames: Arc<[Frame]>,
    guide: Grid,
    interpolation: &Interpolator,
) -> Result<Vec<Frame>> {
    let guide = Arc::new(guide);
    let interpolation = interpolation.clone();
    let tasks = indexed(frames.len(), move |i| {
        Ok(frames[i].regridded(&guide, interpolation.as_ref()))
    });
    let frames = runner.run(tasks)?;
    debug!(
        heap_size = frames.iter().map(GetSize::get_size).sum::<usize>(),
        "Resampled frames"
    );
    Ok(frames)
}

fn derived_stack(source: &Stack, frames: Vec<Frame>) -> Result<Stack> {
    let mut stack = Stack::new(frames, source.depth_axis().clone())?;
    stack.set_frame(source.current_index())?;
    Ok(stack)
}

#[cfg(test)]
mod tests {
    use ndarray::ArrayView2;

    use super::*;
    use crate::{
        common::{axis::Axis, quantity::Quantity},
        frame::{interpolation::Interpolation2D, tests::ramp},
    };

    fn shifted(id: &str) -> Frame {
        let grid = Grid::new(
            Axis::new(0.25, 1.1, 3, Quantity::default()).unwrap(),
            Axis::new(-0.5, 0.9, 4, Quantity::default()).unwrap(),
        );
        Frame::from_fn(id, grid, Quantity::new("Height", "nm"), |(r, c)| {
            (r * c) as f32
        })
    }

    #[test]
    fn all_frames_share_the_guiding_grid() {
        let frames = vec![ramp("a", 3, 4, 0.0), shifted("b"), ramp("c", 5, 2, 1.0)];
        let resized = resize_all(
            TaskRunner::global(),
            &frames,
            &ResizeSettings::bilinear(6, 7),
        )
        .unwrap();

        assert_eq!(resized.len(), 3);
        let guide = frames[0].grid().resized(6, 7).unwrap();
        for (frame, source) in resized.iter().zip(&frames) {
            assert_eq!(frame.grid(), &guide);
            assert_eq!(frame.shape(), (6, 7));
            assert_eq!(frame.id(), source.id());
        }
    }

    #[test]
    fn resizing_to_own_resolution_is_identity() {
        let frames = vec![ramp("a", 4, 5, 0.0), ramp("b", 4, 5, 3.0)];
        for method in [
            InterpolationMethod::NearestNeighbour,
            InterpolationMethod::Bilinear,
        ] {
            let resized =
                resize_all(TaskRunner::global(), &frames, &ResizeSettings::new(4, 5, method))
                    .unwrap();
            for (a, b) in resized.iter().zip(&frames) {
                for (x, y) in a.values().iter().zip(b.values()) {
                    assert!((x - y).abs() < 1e-4);
                }
            }
        }
    }

    #[test]
    fn rejects_degenerate_resolution() {
        let frames = vec![ramp("a", 3, 3, 0.0)];
        for (rows, columns) in [(1, 5), (5, 1), (0, 0)] {
            assert!(matches!(
                resize_all(
                    TaskRunner::global(),
                    &frames,
                    &ResizeSettings::bilinear(rows, columns)
                ),
                Err(Error::InvalidSettings(_))
            ));
        }
    }

    #[test]
    fn empty_input() {
        let resized =
            resize_all(TaskRunner::global(), &[], &ResizeSettings::bilinear(3, 3)).unwrap();
        assert!(resized.is_empty());
    }

    #[derive(Debug)]
    struct Exploding;

    impl Interpolation2D for Exploding {
        fn sample_index(&self, values: ArrayView2<'_, f32>, row: f32, column: f32) -> f32 {
            if values[[0, 0]] == 99.0 {
                panic!("refusing to interpolate");
            }
            InterpolationMethod::Bilinear.sample_index(values, row, column)
        }
    }

    #[test]
    fn one_failing_frame_fails_the_batch() {
        let frames = vec![ramp("a", 3, 3, 0.0), ramp("b", 3, 3, 99.0), ramp("c", 3, 3, 0.0)];
        let settings = ResizeSettings::new(4, 4, Arc::new(Exploding) as Interpolator);
        let err = resize_all(TaskRunner::global(), &frames, &settings).unwrap_err();
        assert!(matches!(err, Error::TaskFailure { index: 1, .. }));
        assert!(matches!(err.root_cause(), Error::Panicked(_)));
    }

    #[test]
    fn stack_resize_keeps_depth_and_cursor() {
        let frames = vec![ramp("a", 3, 3, 0.0), ramp("b", 3, 3, 1.0), ramp("c", 3, 3, 2.0)];
        let mut stack = Stack::with_index_depth(frames, Quantity::new("Time", "s")).unwrap();
        stack.set_frame(2).unwrap();

        let resized =
            resize_stack(TaskRunner::global(), &stack, &ResizeSettings::bilinear(5, 5)).unwrap();
        assert_eq!(resized.len(), 3);
        assert_eq!(resized.depth_axis(), stack.depth_axis());
        assert_eq!(resized.current_index(), 2);
        assert_eq!(resized.guiding_grid().shape(), (5, 5));
    }

    #[test]
    fn aligning_regrids_only_mismatched_frames() {
        let frames = vec![ramp("a", 3, 4, 0.0), shifted("b"), ramp("c", 3, 4, 5.0)];
        let stack = Stack::with_index_depth(frames, Quantity::default()).unwrap();
        assert_eq!(stack.first_mismatch(), Some(1));

        let bilinear = InterpolationMethod::Bilinear.interpolator();
        let aligned = align_to_guide(TaskRunner::global(), &stack, &bilinear).unwrap();
        assert!(aligned.has_common_grid());
        assert_eq!(aligned.frames()[2], stack.frames()[2]);
        assert_eq!(aligned.frames()[1].grid(), stack.guiding_grid());
    }
}
