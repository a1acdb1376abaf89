//! SVG chart drawing.
//!
//! Charts are emitted as plain SVG markup. Sizes are in pixels at 100 px
//! per inch of the reference figure sizes.

use crate::analysis::{Crosstab, GroupedCounts};
use std::fmt::Write as _;

const FONT: &str = "DejaVu Sans, Helvetica, Arial, sans-serif";
const TITLE_HEIGHT: f64 = 60.0;
const AXIS_HEIGHT: f64 = 60.0;
const CHAR_WIDTH: f64 = 7.0;

const COUNT_WIDTH: f64 = 1400.0;
const COUNT_MIN_HEIGHT: f64 = 400.0;
const COUNT_ROW_HEIGHT: f64 = 45.0;
const LEGEND_WIDTH: f64 = 240.0;

const HEATMAP_MIN_WIDTH: f64 = 800.0;
const HEATMAP_COLUMN_WIDTH: f64 = 80.0;
const HEATMAP_BASE_WIDTH: f64 = 600.0;
const HEATMAP_MIN_HEIGHT: f64 = 400.0;
const HEATMAP_ROW_HEIGHT: f64 = 35.0;
const COLORBAR_WIDTH: f64 = 130.0;

/// Categorical palette for coloring values.
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Sequential white-to-blue ramp stops for heatmap cells.
const BLUES: [(f64, [f64; 3]); 3] = [
    (0.0, [247.0, 251.0, 255.0]),
    (0.5, [107.0, 174.0, 214.0]),
    (1.0, [8.0, 48.0, 107.0]),
];

/// Titles and labels for one chart.
#[derive(Debug, Clone)]
pub struct ChartLabels {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Legend title; `None` hides the legend.
    pub legend: Option<String>,
}

/// Figure size of a grouped count chart.
pub fn count_chart_size(groups: usize) -> (f64, f64) {
    let height = (COUNT_ROW_HEIGHT * groups as f64).max(COUNT_MIN_HEIGHT);
    (COUNT_WIDTH, height)
}

/// Figure size of a heatmap.
pub fn heatmap_size(rows: usize, columns: usize) -> (f64, f64) {
    let width = (HEATMAP_COLUMN_WIDTH * columns as f64 + HEATMAP_BASE_WIDTH).max(HEATMAP_MIN_WIDTH);
    let height = (HEATMAP_ROW_HEIGHT * rows as f64).max(HEATMAP_MIN_HEIGHT);
    (width, height)
}

/// Horizontal bar chart, one band per group, one bar per hue inside a band.
pub fn count_chart(data: &GroupedCounts, labels: &ChartLabels) -> String {
    let (width, height) = count_chart_size(data.groups.len());
    let left = label_margin(&data.groups);
    let right = if labels.legend.is_some() { LEGEND_WIDTH } else { 40.0 };
    let plot_width = width - left - right;
    let plot_height = height - TITLE_HEIGHT - AXIS_HEIGHT;

    let (axis_max, step) = nice_axis(data.max_count());
    let x_of = |count: f64| left + count / axis_max * plot_width;

    let mut svg = String::new();
    open_svg(&mut svg, width, height, &labels.title);

    // Grid and x ticks.
    let mut tick = 0.0;
    while tick <= axis_max + f64::EPSILON {
        let x = x_of(tick);
        let _ = writeln!(
            svg,
            "  <line x1='{x:.1}' y1='{TITLE_HEIGHT:.1}' x2='{x:.1}' y2='{:.1}' stroke='#e5e5e5'/>",
            TITLE_HEIGHT + plot_height
        );
        let _ = writeln!(
            svg,
            "  <text x='{x:.1}' y='{:.1}' font-family='{FONT}' font-size='12' text-anchor='middle'>{}</text>",
            TITLE_HEIGHT + plot_height + 18.0,
            tick
        );
        tick += step;
    }

    let band = if data.groups.is_empty() {
        plot_height
    } else {
        plot_height / data.groups.len() as f64
    };
    let bar_height = band * 0.8 / data.hues.len().max(1) as f64;

    for (g, group) in data.groups.iter().enumerate() {
        let band_top = TITLE_HEIGHT + g as f64 * band;
        let _ = writeln!(
            svg,
            "  <text x='{:.1}' y='{:.1}' font-family='{FONT}' font-size='12' text-anchor='end' dominant-baseline='middle'>{}</text>",
            left - 8.0,
            band_top + band / 2.0,
            escape_text(display_value(group))
        );

        for (h, count) in data.counts[g].iter().enumerate() {
            if *count == 0 {
                continue;
            }
            let y = band_top + band * 0.1 + h as f64 * bar_height;
            let _ = writeln!(
                svg,
                "  <rect x='{left:.1}' y='{y:.1}' width='{:.1}' height='{bar_height:.1}' fill='{}'><title>{}: {}</title></rect>",
                x_of(*count as f64) - left,
                PALETTE[h % PALETTE.len()],
                escape_text(display_value(&data.hues[h])),
                count
            );
        }
    }

    // Axes.
    let _ = writeln!(
        svg,
        "  <line x1='{left:.1}' y1='{TITLE_HEIGHT:.1}' x2='{left:.1}' y2='{:.1}' stroke='#333'/>",
        TITLE_HEIGHT + plot_height
    );
    axis_labels(&mut svg, labels, left, plot_width, plot_height, height);

    if let Some(legend_title) = &labels.legend {
        let x = left + plot_width + 20.0;
        let _ = writeln!(
            svg,
            "  <text x='{x:.1}' y='{:.1}' font-family='{FONT}' font-size='13' font-weight='600'>{}</text>",
            TITLE_HEIGHT + 12.0,
            escape_text(legend_title)
        );
        for (h, hue) in data.hues.iter().enumerate() {
            let y = TITLE_HEIGHT + 24.0 + h as f64 * 20.0;
            let _ = writeln!(
                svg,
                "  <rect x='{x:.1}' y='{y:.1}' width='14' height='14' fill='{}'/>",
                PALETTE[h % PALETTE.len()]
            );
            let _ = writeln!(
                svg,
                "  <text x='{:.1}' y='{:.1}' font-family='{FONT}' font-size='12'>{}</text>",
                x + 20.0,
                y + 11.0,
                escape_text(display_value(hue))
            );
        }
    }

    svg.push_str("</svg>\n");
    svg
}

/// Annotated heatmap of row percentages.
pub fn heatmap(data: &Crosstab, labels: &ChartLabels) -> String {
    let (width, height) = heatmap_size(data.rows.len(), data.columns.len());
    let left = label_margin(&data.rows);
    let plot_width = width - left - COLORBAR_WIDTH;
    let plot_height = height - TITLE_HEIGHT - AXIS_HEIGHT;
    let cell_width = plot_width / data.columns.len().max(1) as f64;
    let cell_height = plot_height / data.rows.len().max(1) as f64;

    let mut svg = String::new();
    open_svg(&mut svg, width, height, &labels.title);

    for (r, row) in data.rows.iter().enumerate() {
        let y = TITLE_HEIGHT + r as f64 * cell_height;
        let _ = writeln!(
            svg,
            "  <text x='{:.1}' y='{:.1}' font-family='{FONT}' font-size='12' text-anchor='end' dominant-baseline='middle'>{}</text>",
            left - 8.0,
            y + cell_height / 2.0,
            escape_text(display_value(row))
        );

        for (c, percent) in data.percent[r].iter().enumerate() {
            let x = left + c as f64 * cell_width;
            let text_color = if *percent > 60.0 { "#ffffff" } else { "#1a1a1a" };
            let _ = writeln!(
                svg,
                "  <rect x='{x:.1}' y='{y:.1}' width='{cell_width:.1}' height='{cell_height:.1}' fill='{}'/>",
                blues(percent / 100.0)
            );
            let _ = writeln!(
                svg,
                "  <text x='{:.1}' y='{:.1}' font-family='{FONT}' font-size='12' fill='{text_color}' text-anchor='middle' dominant-baseline='middle'>{:.0}</text>",
                x + cell_width / 2.0,
                y + cell_height / 2.0,
                percent
            );
        }
    }

    for (c, column) in data.columns.iter().enumerate() {
        let _ = writeln!(
            svg,
            "  <text x='{:.1}' y='{:.1}' font-family='{FONT}' font-size='12' text-anchor='middle'>{}</text>",
            left + (c as f64 + 0.5) * cell_width,
            TITLE_HEIGHT + plot_height + 18.0,
            escape_text(display_value(column))
        );
    }

    axis_labels(&mut svg, labels, left, plot_width, plot_height, height);
    colorbar(&mut svg, left + plot_width + 30.0, plot_height);

    svg.push_str("</svg>\n");
    svg
}

fn open_svg(svg: &mut String, width: f64, height: f64, title: &str) {
    let _ = writeln!(
        svg,
        "<svg xmlns='http://www.w3.org/2000/svg' width='{width:.0}' height='{height:.0}' viewBox='0 0 {width:.0} {height:.0}' role='img'>"
    );
    let _ = writeln!(svg, "  <rect width='{width:.0}' height='{height:.0}' fill='#ffffff'/>");
    let _ = writeln!(
        svg,
        "  <text x='{:.1}' y='36' font-family='{FONT}' font-size='18' font-weight='600' text-anchor='middle'>{}</text>",
        width / 2.0,
        escape_text(title)
    );
}

fn axis_labels(
    svg: &mut String,
    labels: &ChartLabels,
    left: f64,
    plot_width: f64,
    plot_height: f64,
    height: f64,
) {
    let _ = writeln!(
        svg,
        "  <text x='{:.1}' y='{:.1}' font-family='{FONT}' font-size='13' text-anchor='middle'>{}</text>",
        left + plot_width / 2.0,
        height - 12.0,
        escape_text(&labels.x_label)
    );
    let cy = TITLE_HEIGHT + plot_height / 2.0;
    let _ = writeln!(
        svg,
        "  <text x='16' y='{cy:.1}' font-family='{FONT}' font-size='13' text-anchor='middle' transform='rotate(-90 16 {cy:.1})'>{}</text>",
        escape_text(&labels.y_label)
    );
}

fn colorbar(svg: &mut String, x: f64, plot_height: f64) {
    let _ = writeln!(svg, "  <defs>");
    let _ = writeln!(svg, "    <linearGradient id='blues' x1='0' y1='1' x2='0' y2='0'>");
    for (offset, _) in BLUES {
        let _ = writeln!(
            svg,
            "      <stop offset='{:.0}%' stop-color='{}'/>",
            offset * 100.0,
            blues(offset)
        );
    }
    let _ = writeln!(svg, "    </linearGradient>");
    let _ = writeln!(svg, "  </defs>");
    let _ = writeln!(
        svg,
        "  <rect x='{x:.1}' y='{TITLE_HEIGHT:.1}' width='18' height='{plot_height:.1}' fill='url(#blues)' stroke='#333'/>"
    );
    for tick in [0.0, 50.0, 100.0] {
        let y = TITLE_HEIGHT + plot_height * (1.0 - tick / 100.0);
        let _ = writeln!(
            svg,
            "  <text x='{:.1}' y='{y:.1}' font-family='{FONT}' font-size='11' dominant-baseline='middle'>{tick:.0}</text>",
            x + 24.0
        );
    }
    let cx = x + 64.0;
    let cy = TITLE_HEIGHT + plot_height / 2.0;
    let _ = writeln!(
        svg,
        "  <text x='{cx:.1}' y='{cy:.1}' font-family='{FONT}' font-size='12' text-anchor='middle' transform='rotate(-90 {cx:.1} {cy:.1})'>% within row</text>"
    );
}

/// Width reserved for category labels on the vertical axis.
fn label_margin(values: &[String]) -> f64 {
    let longest = values
        .iter()
        .map(|v| display_value(v).chars().count())
        .max()
        .unwrap_or(0);
    (longest as f64 * CHAR_WIDTH + 56.0).clamp(120.0, 480.0)
}

/// Axis maximum and tick step covering `max` with about five ticks.
fn nice_axis(max: usize) -> (f64, f64) {
    if max == 0 {
        return (1.0, 1.0);
    }
    let raw = max as f64 / 5.0;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * magnitude)
        .max(1.0);
    ((max as f64 / step).ceil() * step, step)
}

/// Hex color on the white-to-blue ramp for `t` in 0..=1.
fn blues(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);
    let (mut lo, mut hi) = (BLUES[0], BLUES[BLUES.len() - 1]);
    for pair in BLUES.windows(2) {
        if t >= pair[0].0 && t <= pair[1].0 {
            lo = pair[0];
            hi = pair[1];
            break;
        }
    }
    let span = (hi.0 - lo.0).max(f64::EPSILON);
    let f = (t - lo.0) / span;
    let channel = |i: usize| (lo.1[i] + (hi.1[i] - lo.1[i]) * f).round() as u8;
    format!("#{:02x}{:02x}{:02x}", channel(0), channel(1), channel(2))
}

/// Empty values stand for missing data in the table.
fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(missing)"
    } else {
        value
    }
}

fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
