//! ASCII plotting for terminal output.
//!
//! Fixed-size character grids, so output is deterministic and golden-testable.
//!
//! Plot elements:
//! - silhouette sweep: `o` per k, `*` for the chosen k, `-` connecting line
//! - cluster scatter (PCA): cluster digits `0-9` (`+` beyond 9), `X` for anomalies

use crate::fit::KCandidate;
use crate::math::Projection;

/// Silhouette score against k.
pub fn render_silhouette_plot(candidates: &[KCandidate], best_k: usize, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let points: Vec<(f64, f64)> = candidates.iter().map(|c| (c.k as f64, c.silhouette)).collect();
    let (k_min, k_max) = range(points.iter().map(|p| p.0)).unwrap_or((0.0, 1.0));
    let (s_min, s_max) = range(points.iter().map(|p| p.1)).unwrap_or((0.0, 1.0));
    let (s_min, s_max) = pad_range(s_min, s_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // line first so markers overlay it
    let cells: Vec<(usize, usize)> = points
        .iter()
        .map(|&(k, s)| (map_x(k, k_min, k_max, width), map_y(s, s_min, s_max, height)))
        .collect();
    for pair in cells.windows(2) {
        draw_line(&mut grid, pair[0], pair[1], '-');
    }
    for (c, &(x, y)) in candidates.iter().zip(&cells) {
        grid[y][x] = if c.k == best_k { '*' } else { 'o' };
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: k=[{k_min:.0}, {k_max:.0}] | silhouette=[{s_min:.3}, {s_max:.3}]\n"
    ));
    push_grid(&mut out, grid);
    out
}

/// Rows on the first two principal components, labelled by cluster.
pub fn render_cluster_scatter(
    projection: &Projection,
    labels: &[usize],
    flags: &[bool],
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);
    let coords = &projection.coords;

    let (x_min, x_max) = range(coords.column(0).iter().copied()).unwrap_or((-1.0, 1.0));
    let (y_min, y_max) = range(coords.column(1).iter().copied()).unwrap_or((-1.0, 1.0));
    let (x_min, x_max) = pad_range(x_min, x_max, 0.02);
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    let cell = |i: usize| {
        (
            map_x(coords[(i, 0)], x_min, x_max, width),
            map_y(coords[(i, 1)], y_min, y_max, height),
        )
    };

    for (i, &label) in labels.iter().enumerate().take(coords.nrows()) {
        let (x, y) = cell(i);
        grid[y][x] = cluster_glyph(label);
    }
    // anomalies last so they stay visible in crowded cells
    for (i, _) in flags.iter().enumerate().take(coords.nrows()).filter(|(_, f)| **f) {
        let (x, y) = cell(i);
        grid[y][x] = 'X';
    }

    let [r1, r2] = projection.explained_variance_ratio;
    let mut out = String::new();
    out.push_str(&format!(
        "Plot: PC1=[{x_min:.2}, {x_max:.2}] ({:.1}%) | PC2=[{y_min:.2}, {y_max:.2}] ({:.1}%)\n",
        r1 * 100.0,
        r2 * 100.0
    ));
    push_grid(&mut out, grid);
    out.push_str("Legend: 0-9 cluster, + cluster >9, X anomaly\n");
    out
}

fn cluster_glyph(label: usize) -> char {
    u32::try_from(label)
        .ok()
        .and_then(|d| char::from_digit(d, 10))
        .unwrap_or('+')
}

fn push_grid(out: &mut String, grid: Vec<Vec<char>>) {
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values.filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
    }
    if min.is_finite() && max.is_finite() && max > min {
        Some((min, max))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(v: f64, min: f64, max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((v - min) / (max - min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(v: f64, min: f64, max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((v - min) / (max - min)).clamp(0.0, 1.0);
    // max value -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

/// Integer line drawing (Bresenham); only paints empty cells.
fn draw_line(grid: &mut [Vec<char>], from: (usize, usize), to: (usize, usize), ch: char) {
    let (mut x0, mut y0) = (from.0 as isize, from.1 as isize);
    let (x1, y1) = (to.0 as isize, to.1 as isize);

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;

    fn candidate(k: usize, silhouette: f64) -> KCandidate {
        KCandidate {
            k,
            silhouette,
            inertia: 0.0,
        }
    }

    #[test]
    fn silhouette_plot_golden_snapshot_small() {
        let candidates = vec![candidate(2, 0.5), candidate(3, 0.8), candidate(4, 0.6)];
        let txt = render_silhouette_plot(&candidates, 3, 10, 5);
        let expected = concat!(
            "Plot: k=[2, 4] | silhouette=[0.485, 0.815]\n",
            "     *    \n",
            "    - -   \n",
            "  --   -- \n",
            " -       o\n",
            "o         \n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn scatter_marks_clusters_and_anomalies() {
        let coords = DMatrix::from_row_slice(
            4,
            2,
            &[0.0, 0.0, 0.1, 0.1, 5.0, 5.0, 10.0, -3.0],
        );
        let projection = Projection {
            coords,
            explained_variance_ratio: [0.9, 0.1],
        };
        let txt = render_cluster_scatter(&projection, &[0, 0, 11, 1], &[false, false, false, true], 20, 8);
        let lines: Vec<&str> = txt.lines().collect();
        // header + grid + legend
        assert_eq!(lines.len(), 10);
        assert!(lines[0].contains("(90.0%)"));
        assert!(txt.contains('0'));
        assert!(txt.contains('+'));
        assert!(txt.contains('X'));
        // row 3 was flagged, so its own cluster digit never shows up
        assert!(!lines[1..9].iter().any(|l| l.contains('1')));
    }

    #[test]
    fn glyphs_cover_digits_then_plus() {
        assert_eq!(cluster_glyph(0), '0');
        assert_eq!(cluster_glyph(9), '9');
        assert_eq!(cluster_glyph(10), '+');
    }
}
