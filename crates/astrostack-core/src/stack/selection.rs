use tracing::info;

use crate::align::AlignmentResult;
use crate::frame::InputFrame;

use super::config::FrameSelection;

/// Indices of the frames to stack, in input order.
///
/// Invalid alignments are always dropped; the remaining frames are then
/// limited to the best-ranked count or fraction.
pub fn select_frames(frames: &[(InputFrame, AlignmentResult)], selection: FrameSelection) -> Vec<usize> {
    let mut valid: Vec<usize> = (0..frames.len()).filter(|&i| frames[i].1.is_valid).collect();
    let n_valid = valid.len();

    let keep = match selection {
        FrameSelection::All => n_valid,
        FrameSelection::Best { count } => count.min(n_valid),
        FrameSelection::BestFraction { fraction } => {
            let kept = (fraction.clamp(0.0, 1.0) as f64 * n_valid as f64).round() as usize;
            if fraction > 0.0 { kept.max(1).min(n_valid) } else { 0 }
        }
    };

    if keep < n_valid {
        valid.sort_by(|&a, &b| frames[b].1.ranking.total_cmp(&frames[a].1.ranking).then(a.cmp(&b)));
        valid.truncate(keep);
        valid.sort_unstable();
    }

    info!(
        total = frames.len(),
        valid = n_valid,
        selected = valid.len(),
        "Selected frames for stacking"
    );
    valid
}
