use crate::error::Result;
use crate::frame::FrameData;

use super::result::AlignmentResult;

/// Aligns frames against a reference prepared up front.
///
/// `Err` is reserved for frames that cannot be processed at all (wrong
/// dimensions, unreadable data); a frame that merely fails to match comes
/// back as an invalid [`AlignmentResult`].
pub trait FrameAligner: Send + Sync {
    fn align_frame(&self, frame: &FrameData) -> Result<AlignmentResult>;
}
