//! SVG diagnostic plots

use plotters::prelude::*;
use std::path::Path;

use crate::error::EvaluationError;

pub const TRUE_VS_PREDICTED: &str = "true_vs_predicted.svg";
pub const FEATURE_IMPORTANCE: &str = "feature_importance.svg";

const SIZE: (u32, u32) = (800, 600);

fn plot_err(e: impl std::fmt::Display) -> EvaluationError {
    EvaluationError::Plot(e.to_string())
}

/// Scatter of predictions against true prices with a `y = x` reference
pub fn true_vs_predicted(
    path: &Path,
    actual: &[f64],
    predicted: &[f64],
) -> Result<(), EvaluationError> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return Err(EvaluationError::Plot(
            "need matching, non-empty series".to_string(),
        ));
    }

    let (lo, hi) = actual
        .iter()
        .chain(predicted)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let pad = ((hi - lo) * 0.05).max(1.0);
    let (lo, hi) = (lo - pad, hi + pad);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("True vs predicted price", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(lo..hi, lo..hi)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("True price")
        .y_desc("Predicted price")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(
            actual
                .iter()
                .zip(predicted)
                .map(|(&x, &y)| Circle::new((x, y), 3, BLUE.mix(0.6).filled())),
        )
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(vec![(lo, lo), (hi, hi)], RED.stroke_width(2)))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)
}

/// Horizontal bar chart of normalised feature importances
pub fn feature_importance(path: &Path, importances: &[(String, f64)]) -> Result<(), EvaluationError> {
    if importances.is_empty() {
        return Err(EvaluationError::Plot("no features to plot".to_string()));
    }

    let max = importances
        .iter()
        .map(|(_, v)| *v)
        .fold(0.0_f64, f64::max)
        .max(f64::EPSILON);
    let n = importances.len();

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature importance", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(140)
        .build_cartesian_2d(0.0..max * 1.1, 0.0..n as f64)
        .map_err(plot_err)?;

    let label = |y: &f64| {
        let index = y.floor() as usize;
        importances
            .get(index)
            .map(|(name, _)| name.clone())
            .unwrap_or_default()
    };

    chart
        .configure_mesh()
        .disable_y_mesh()
        .y_labels(n * 2)
        .y_label_formatter(&label)
        .x_desc("Relative importance")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(importances.iter().enumerate().map(|(i, (_, value))| {
            let y = i as f64;
            Rectangle::new([(0.0, y + 0.15), (*value, y + 0.85)], BLUE.filled())
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writes_svg_files() {
        let dir = TempDir::new().unwrap();

        let scatter = dir.path().join(TRUE_VS_PREDICTED);
        true_vs_predicted(&scatter, &[1.0, 2.0, 3.0], &[1.1, 1.9, 3.2]).unwrap();
        let content = std::fs::read_to_string(&scatter).unwrap();
        assert!(content.contains("<svg"));

        let bars = dir.path().join(FEATURE_IMPORTANCE);
        let importances = vec![("net_area".to_string(), 0.7), ("sector".to_string(), 0.3)];
        feature_importance(&bars, &importances).unwrap();
        assert!(bars.exists());
    }

    #[test]
    fn test_rejects_empty_input() {
        let dir = TempDir::new().unwrap();
        assert!(true_vs_predicted(&dir.path().join("x.svg"), &[], &[]).is_err());
        assert!(feature_importance(&dir.path().join("y.svg"), &[]).is_err());
    }
}
