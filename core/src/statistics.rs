use std::sync::Arc;

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    common::{
        axis::Axis,
        quantity::Quantity,
        stats::{statistic, StatisticKind},
    },
    error::{Error, Result},
    frame::{Frame, Grid},
    roi::{masked_samples, SharedRoi},
    runner::{indexed, TaskRunner},
    stack::Stack,
};

/// A region of interest together with the key its results are reported under.
#[derive(Debug, Clone)]
pub struct NamedRoi {
    pub key: String,
    pub roi: SharedRoi,
}

impl NamedRoi {
    pub fn new(key: impl Into<String>, roi: SharedRoi) -> Self {
        Self {
            key: key.into(),
            roi,
        }
    }
}

/// One statistic of one region, tracked over every frame of a stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSeries {
    pub kind: StatisticKind,
    pub roi_key: String,
    /// Indexed by frame.
    pub values: Vec<f32>,
    pub quantity: Quantity,
    pub depth: Axis,
}

/// One statistic of one region in a single frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameStatistic {
    pub kind: StatisticKind,
    pub roi_key: String,
    pub value: f32,
    pub quantity: Quantity,
}

/// ROI masks rasterized on one grid, in ROI order.
struct MaskGroup {
    grid: Grid,
    masks: Vec<Array2<bool>>,
}

impl MaskGroup {
    fn new(grid: &Grid, rois: &[NamedRoi]) -> Self {
        Self {
            grid: grid.clone(),
            masks: rois.iter().map(|r| r.roi.mask(grid)).collect(),
        }
    }
}

/// Computes every requested statistic of every region for every frame.
///
/// Returns one series per `(roi, kind)` pair, regions in the outer and kinds
/// in the inner order. Masks are rasterized once per distinct frame grid and
/// the frames are evaluated concurrently. A region without samples in some
/// frame fails the batch with [`Error::EmptySample`] for every kind that is
/// undefined at zero elements.
#[instrument(skip_all, fields(frames = stack.len(), rois = rois.len(), kinds = kinds.len()))]
pub fn compute(
    runner: &TaskRunner,
    stack: &Stack,
    rois: &[NamedRoi],
    kinds: &[StatisticKind],
) -> Result<Vec<ResultSeries>> {
    if rois.is_empty() || kinds.is_empty() {
        return Ok(Vec::new());
    }

    let mut groups: Vec<MaskGroup> = Vec::new();
    let mut group_of_frame = Vec::with_capacity(stack.len());
    for frame in stack.frames() {
        let group = match groups.iter().position(|g| &g.grid == frame.grid()) {
            Some(group) => group,
            None => {
                groups.push(MaskGroup::new(frame.grid(), rois));
                groups.len() - 1
            }
        };
        group_of_frame.push(group);
    }
    debug!(groups = groups.len(), "Rasterized ROI masks");

    let groups = Arc::new(groups);
    let frames = stack.shared_frames();
    let keys: Arc<[String]> = rois.iter().map(|r| r.key.clone()).collect();
    let kinds_shared: Arc<[StatisticKind]> = kinds.into();
    let tasks = indexed(frames.len(), move |i| {
        let group = &groups[group_of_frame[i]];
        evaluate(&frames[i], i, &group.masks, &keys, &kinds_shared)
    });
    let rows = runner.run(tasks)?;

    let source = stack.frames()[0].quantity();
    let mut series = Vec::with_capacity(rois.len() * kinds.len());
    for (r, roi) in rois.iter().enumerate() {
        for (k, &kind) in kinds.iter().enumerate() {
            let column = r * kinds.len() + k;
            series.push(ResultSeries {
                kind,
                roi_key: roi.key.clone(),
                values: rows.iter().map(|row| row[column]).collect(),
                quantity: kind.quantity(source),
                depth: stack.depth_axis().clone(),
            });
        }
    }
    Ok(series)
}

/// Statistics of the frame at `index`, computed on the calling thread.
pub fn frame_statistics(
    stack: &Stack,
    index: usize,
    rois: &[NamedRoi],
    kinds: &[StatisticKind],
) -> Result<Vec<FrameStatistic>> {
    let frame = stack.frame(index)?;
    let masks: Vec<_> = rois.iter().map(|r| r.roi.mask(frame.grid())).collect();
    let keys: Vec<String> = rois.iter().map(|r| r.key.clone()).collect();
    let values = evaluate(frame, index, &masks, &keys, kinds)?;

    let pairs = rois.iter().flat_map(|roi| kinds.iter().map(move |&kind| (roi, kind)));
    Ok(pairs
        .zip(values)
        .map(|((roi, kind), value)| FrameStatistic {
            kind,
            roi_key: roi.key.clone(),
            value,
            quantity: kind.quantity(frame.quantity()),
        })
        .collect())
}

/// [`frame_statistics`] of the frame under the stack's cursor.
pub fn current_frame_statistics(
    stack: &Stack,
    rois: &[NamedRoi],
    kinds: &[StatisticKind],
) -> Result<Vec<FrameStatistic>> {
    frame_statistics(stack, stack.current_index(), rois, kinds)
}

/// Values for every `(roi, kind)` pair in one frame, row-major by ROI.
fn evaluate(
    frame: &Frame,
    index: usize,
    masks: &[Array2<bool>],
    keys: &[String],
    kinds: &[StatisticKind],
) -> Result<Vec<f32>> {
    let mut values = Vec::with_capacity(masks.len() * kinds.len());
    for (mask, key) in masks.iter().zip(keys) {
        let samples = masked_samples(frame, mask);
        for &kind in kinds {
            let value = statistic(kind, &samples).ok_or_else(|| Error::EmptySample {
                roi: key.clone(),
                frame: index,
            })?;
            values.push(value);
        }
    }
    Ok(values)
}
