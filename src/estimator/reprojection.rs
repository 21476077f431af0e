use crate::{
    line::{Line, LineError},
    twin::TwinLines,
};
use nalgebra::Vector2;

/// Sum of squared root offsets after moving the current lines by `translation`.
///
/// Each twin contributes the offsets between its translated current line and
/// its next line where both cross the top border (`y = 0`) and the bottom
/// border (`y = frame_height`) of the frame. Twins parallel to the borders
/// contribute nothing.
pub fn reprojection_error(twins: &[TwinLines], translation: Vector2<f64>, frame_height: f64) -> f64 {
    twins
        .iter()
        .filter_map(|twin| squared_border_offsets(twin, translation, frame_height).ok())
        .sum()
}

fn squared_border_offsets(
    twin: &TwinLines,
    translation: Vector2<f64>,
    frame_height: f64,
) -> Result<f64, LineError> {
    let moved = twin.current.translate(translation.x, translation.y)?;

    let top = moved.root_at_y0()? - twin.next.root_at_y0()?;
    let bottom = bottom_root(&moved, frame_height)? - bottom_root(&twin.next, frame_height)?;

    Ok(top.powi(2) + bottom.powi(2))
}

fn bottom_root(line: &Line, frame_height: f64) -> Result<f64, LineError> {
    line.move_origin(0., frame_height)?.root_at_y0()
}
