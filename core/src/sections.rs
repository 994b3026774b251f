use ndarray::{stack as stack_arrays, Array3, ArrayView2, Axis as ArrayAxis};
use tracing::{debug, instrument};

use crate::{
    common::axis::Axis,
    error::{Error, Result},
    frame::{interpolation::Interpolator, Frame, Grid},
    resample::{align_to_guide, resize_stack, ResizeSettings},
    runner::TaskRunner,
    stack::Stack,
};

/// How frames are brought onto one grid before they are cut into sections.
#[derive(Debug, Clone)]
pub enum Gridding {
    /// Frames must already share a grid, [`Error::GridMismatch`] otherwise.
    Strict,
    /// Frames gridded differently from frame 0 are resampled onto its grid.
    AlignToFirst(Interpolator),
    /// Every frame is resampled onto frame 0's grid at a new resolution.
    Resize(ResizeSettings),
}

/// Cuts the stack along the rows of its guiding grid.
///
/// For a stack of `F` frames on an `R×C` grid this yields `R` frames of
/// shape `F×C`: row `j` of section `i` is row `i` of frame `j`. The sections
/// are stacked along the guiding row axis and have the original depth axis
/// as their row axis.
#[instrument(skip_all, fields(frames = stack.len()))]
pub fn horizontal_sections(runner: &TaskRunner, stack: &Stack, gridding: &Gridding) -> Result<Stack> {
    let aligned = prepare(runner, stack, gridding)?;
    let guide = aligned.guiding_grid();
    let volume = volume(&aligned)?;

    let sections = (0..guide.rows().count())
        .map(|i| {
            Frame::new(
                format!("Horizontal section {i}"),
                Grid::new(aligned.depth_axis().clone(), guide.columns().clone()),
                volume.index_axis(ArrayAxis(1), i).to_owned(),
                aligned.frames()[0].quantity().clone(),
            )
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(sections = sections.len(), "Extracted horizontal sections");

    Stack::new(sections, guide.rows().clone())
}

/// Cuts the stack along the columns of its guiding grid.
///
/// For a stack of `F` frames on an `R×C` grid this yields `C` frames of
/// shape `F×R`: row `j` of section `k` is column `k` of frame `j`.
#[instrument(skip_all, fields(frames = stack.len()))]
pub fn vertical_sections(runner: &TaskRunner, stack: &Stack, gridding: &Gridding) -> Result<Stack> {
    let aligned = prepare(runner, stack, gridding)?;
    let guide = aligned.guiding_grid();
    let volume = volume(&aligned)?;

    let sections = (0..guide.columns().count())
        .map(|k| {
            Frame::new(
                format!("Vertical section {k}"),
                Grid::new(aligned.depth_axis().clone(), guide.rows().clone()),
                volume.index_axis(ArrayAxis(2), k).to_owned(),
                aligned.frames()[0].quantity().clone(),
            )
        })
        .collect::<Result<Vec<_>>>()?;
    debug!(sections = sections.len(), "Extracted vertical sections");

    let depth: Axis = guide.columns().clone();
    Stack::new(sections, depth)
}

fn prepare(runner: &TaskRunner, stack: &Stack, gridding: &Gridding) -> Result<Stack> {
    match gridding {
        Gridding::Strict => match stack.first_mismatch() {
            Some(index) => Err(Error::GridMismatch { index }),
            None => Ok(stack.clone()),
        },
        Gridding::AlignToFirst(interpolation) => align_to_guide(runner, stack, interpolation),
        Gridding::Resize(settings) => resize_stack(runner, stack, settings),
    }
}

/// `(frame, row, column)` volume of a stack whose frames share one grid.
fn volume(stack: &Stack) -> Result<Array3<f32>> {
    let views: Vec<ArrayView2<'_, f32>> = stack.frames().iter().map(|f| f.values().view()).collect();
    Ok(stack_arrays(ArrayAxis(0), &views)?)
}
