use crate::types::{NormalizedReading, SequenceWindow};

/// Classifier's trained window width.
pub const DEFAULT_WINDOW_LEN: usize = 30;

/// Tile one normalized reading across `steps` time-steps, shape (1, steps, channels).
///
/// The classifier was trained on real windows; a single UI reading has no history,
/// so the same row is repeated. No zero padding, no interpolation.
pub fn build_window(reading: &NormalizedReading, steps: usize) -> SequenceWindow {
    let channels = reading.values.len();
    let row: Vec<f32> = reading.values.iter().map(|v| *v as f32).collect();

    let mut data = Vec::with_capacity(steps * channels);
    for _ in 0..steps {
        data.extend_from_slice(&row);
    }
    SequenceWindow::from_parts(data, steps, channels)
}
