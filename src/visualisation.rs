// src/visualisation.rs

use crate::grid::Grid;
use plotters::prelude::*;

/// Diverging colour for a value inside [lo, hi]: pure blue at the most
/// negative value, white at zero, pure red at the most positive. Each side
/// is normalised against its own extreme, so asymmetric fields (a solution
/// that is mostly positive with a shallow negative lobe, say) still use the
/// full colour range on both sides.
fn diverging_color(value: f64, lo: f64, hi: f64) -> RGBColor {
    let t = if value >= 0.0 {
        if hi > 0.0 {
            (value / hi).clamp(0.0, 1.0)
        } else {
            0.0
        }
    } else if lo < 0.0 {
        -(value / lo).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let fade = (255.0 * (1.0 - t.abs())).round() as u8;
    if t >= 0.0 {
        RGBColor(255, fade, fade)
    } else {
        RGBColor(fade, fade, 255)
    }
}

/// Save one z-slice of a field as a PNG heat map, coloured by a diverging
/// blue–white–red scale spanning the slice's own value range.
pub fn save_slice_plot(
    field: &Grid,
    k_plane: usize,
    filename: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let nx = field.nx;
    let ny = field.ny;

    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for j in 0..ny {
        for i in 0..nx {
            let v = field.at(i as isize, j as isize, k_plane as isize);
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }

    let root = BitMapBackend::new(filename, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .caption(
            format!("u slice at k = {k_plane} (blue < 0 < red)"),
            ("sans-serif", 20),
        )
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(0..nx as i32, 0..ny as i32)?;

    chart
        .configure_mesh()
        .x_desc("x (cell index)")
        .y_desc("y (cell index)")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    let mut cells = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let v = field.at(i as isize, j as isize, k_plane as isize);
            cells.push(Rectangle::new(
                [(i as i32, j as i32), (i as i32 + 1, j as i32 + 1)],
                diverging_color(v, lo, hi).filled(),
            ));
        }
    }
    chart.draw_series(cells)?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_map_spans_blue_white_red() {
        assert_eq!(diverging_color(-2.0, -2.0, 4.0), RGBColor(0, 0, 255));
        assert_eq!(diverging_color(4.0, -2.0, 4.0), RGBColor(255, 0, 0));
        assert_eq!(diverging_color(0.0, -2.0, 4.0), RGBColor(255, 255, 255));
    }

    #[test]
    fn colour_map_normalises_each_side_separately() {
        // Half of the positive extreme fades half-way toward white.
        assert_eq!(diverging_color(2.0, -2.0, 4.0), RGBColor(255, 128, 128));
        // The negative side uses its own (smaller) extreme.
        assert_eq!(diverging_color(-1.0, -2.0, 4.0), RGBColor(128, 128, 255));
    }

    #[test]
    fn one_signed_slices_do_not_divide_by_zero() {
        // All-positive range: zero maps to white, no negative branch.
        assert_eq!(diverging_color(0.0, 0.0, 0.0), RGBColor(255, 255, 255));
        assert_eq!(diverging_color(1.0, 1.0, 1.0), RGBColor(255, 0, 0));
        // All-negative range.
        assert_eq!(diverging_color(-1.0, -1.0, -1.0), RGBColor(0, 0, 255));
    }
}
