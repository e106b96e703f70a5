//! Non-maximum suppression on dense score grids.

/// Returns `(x, y, score)` for every cell that is a strict maximum over its
/// 3x3 neighbourhood and lies at least `border` cells from every edge.
///
/// Equal neighbours do not suppress each other when they come later in
/// raster order, so a flat plateau keeps its first cell only.
pub fn nms_3x3(
    scores: &[f32],
    width: usize,
    height: usize,
    border: usize,
) -> Vec<(usize, usize, f32)> {
    let mut kept = Vec::new();
    let border = border.max(1);
    if width <= 2 * border || height <= 2 * border || scores.len() < width * height {
        return kept;
    }

    for y in border..height - border {
        for x in border..width - border {
            let score = scores[y * width + x];
            if score <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'window: for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    if nx == x && ny == y {
                        continue;
                    }
                    let other = scores[ny * width + nx];
                    let earlier = (ny, nx) < (y, x);
                    if other > score || (earlier && other == score) {
                        is_max = false;
                        break 'window;
                    }
                }
            }
            if is_max {
                kept.push((x, y, score));
            }
        }
    }
    kept
}
