use std::sync::Arc;

use get_size::GetSize;
use serde::{Deserialize, Serialize};

use crate::{
    common::{axis::Axis, quantity::Quantity},
    error::{Error, Result},
    frame::{Frame, Grid},
};

/// How [`Stack::tick`] moves the cursor once it reaches the last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Stop at the end.
    #[default]
    Once,
    /// Jump back to the first frame.
    Loop,
    /// Reverse direction at either end.
    Bounce,
}

/// Cursor movement reported by the stack instead of notifying listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameChange {
    pub previous: usize,
    pub current: usize,
}

/// An ordered sequence of frames along a continuous depth axis (time, force, ...).
///
/// The frame list is shared read-only, so cloning a stack or handing its
/// frames to workers does not copy any values.
#[derive(Debug, Clone)]
pub struct Stack {
    frames: Arc<[Frame]>,
    depth: Axis,
    current: usize,
    playing: bool,
    mode: PlaybackMode,
    forward: bool,
}

impl Stack {
    pub fn new(frames: Vec<Frame>, depth: Axis) -> Result<Self> {
        if frames.len() != depth.count() {
            return Err(Error::FrameCountMismatch {
                frames: frames.len(),
                depth: depth.count(),
            });
        }
        Ok(Self {
            frames: frames.into(),
            depth,
            current: 0,
            playing: false,
            mode: PlaybackMode::default(),
            forward: true,
        })
    }

    /// Stack whose depth axis is the frame index.
    pub fn with_index_depth(frames: Vec<Frame>, quantity: Quantity) -> Result<Self> {
        let depth = Axis::indices(frames.len(), quantity)?;
        Self::new(frames, depth)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub(crate) fn shared_frames(&self) -> Arc<[Frame]> {
        self.frames.clone()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`; a stack holds at least one frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, index: usize) -> Result<&Frame> {
        self.frames.get(index).ok_or(Error::OutOfRange {
            index,
            count: self.frames.len(),
        })
    }

    pub fn depth_axis(&self) -> &Axis {
        &self.depth
    }

    pub fn depth_quantity(&self) -> &Quantity {
        self.depth.quantity()
    }

    /// The grid every cross-stack operation aligns to: frame 0's.
    pub fn guiding_grid(&self) -> &Grid {
        self.frames[0].grid()
    }

    /// Index of the first frame whose grid differs from the guiding grid.
    pub fn first_mismatch(&self) -> Option<usize> {
        let guide = self.guiding_grid();
        self.frames
            .iter()
            .position(|frame| !frame.grid().is_compatible(guide))
    }

    pub fn has_common_grid(&self) -> bool {
        self.first_mismatch().is_none()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_frame(&self) -> &Frame {
        &self.frames[self.current]
    }

    /// Depth value of the current frame.
    pub fn current_depth(&self) -> f32 {
        self.depth.at(self.current)
    }

    pub fn set_frame(&mut self, index: usize) -> Result<Option<FrameChange>> {
        if index >= self.frames.len() {
            return Err(Error::OutOfRange {
                index,
                count: self.frames.len(),
            });
        }
        Ok(self.move_to(index))
    }

    /// Moves the cursor to the frame whose depth is closest to `value`.
    pub fn set_frame_closest_to(&mut self, value: f32) -> Option<FrameChange> {
        let index = self.depth.closest_index_within_bounds(value);
        self.move_to(index)
    }

    /// Next frame, wrapping around at the end.
    pub fn advance_frame(&mut self) -> Option<FrameChange> {
        let next = (self.current + 1) % self.frames.len();
        self.move_to(next)
    }

    /// Previous frame, wrapping around at the start.
    pub fn step_back(&mut self) -> Option<FrameChange> {
        let len = self.frames.len();
        let previous = (self.current + len - 1) % len;
        self.move_to(previous)
    }

    pub fn playback_mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn set_playback_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        self.forward = true;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = self.frames.len() > 1;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Advances playback by one frame. The caller owns the timer driving ticks.
    ///
    /// Stops playback in [`PlaybackMode::Once`] when the last frame is reached.
    pub fn tick(&mut self) -> Option<FrameChange> {
        if !self.playing {
            return None;
        }
        let last = self.frames.len() - 1;
        let next = match self.mode {
            PlaybackMode::Once => {
                if self.current >= last {
                    self.playing = false;
                    return None;
                }
                let next = self.current + 1;
                if next == last {
                    self.playing = false;
                }
                next
            }
            PlaybackMode::Loop => (self.current + 1) % self.frames.len(),
            PlaybackMode::Bounce => {
                if self.forward && self.current >= last {
                    self.forward = false;
                } else if !self.forward && self.current == 0 {
                    self.forward = true;
                }
                if self.forward {
                    self.current + 1
                } else {
                    self.current - 1
                }
            }
        };
        self.move_to(next)
    }

    /// Releases the stack, handing back its frames.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames.to_vec()
    }

    fn move_to(&mut self, index: usize) -> Option<FrameChange> {
        if index == self.current {
            return None;
        }
        let previous = self.current;
        self.current = index;
        Some(FrameChange {
            previous,
            current: index,
        })
    }
}

impl GetSize for Stack {
    fn get_heap_size(&self) -> usize {
        self.frames.iter().map(GetSize::get_size).sum::<usize>() + self.depth.get_heap_size()
    }
}
