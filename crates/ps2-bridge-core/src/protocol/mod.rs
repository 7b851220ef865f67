//! Protocol module containing the key frame type and its validation rules.

pub mod frame;

pub use frame::{Direction, FrameError, KeyFrame, FRAME_LEN};
