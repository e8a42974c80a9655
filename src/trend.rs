use std::collections::BTreeMap;

use tracing::debug;

use crate::aggregate::MonthlyTable;
use crate::error::EngineError;
use crate::models::{Region, TrendClass, TrendResult, Variable, Year};

/// Minimum number of years with an annual mean before a trend is reported.
pub const MIN_TREND_YEARS: usize = 2;

/// Fits `value = slope * year + intercept` by ordinary least squares over
/// the years in `annual_means` and classifies the slope against `threshold`.
///
/// With exactly two years there is no fit: the slope is `(v2 - v1) / (y2 - y1)`
/// and it is classified against the same `threshold` as a fitted slope, so a
/// small rise between the two years still reads as stable. Fewer than two
/// years is an [`EngineError::InsufficientData`]; callers must show the trend
/// as undetermined instead of drawing a flat line.
pub fn estimate_trend(
    region: &Region,
    variable: Variable,
    annual_means: &BTreeMap<Year, f64>,
    threshold: f64,
) -> Result<TrendResult, EngineError> {
    let points: Vec<(f64, f64)> = annual_means
        .iter()
        .filter(|(_, value)| value.is_finite())
        .map(|(year, value)| (f64::from(*year), *value))
        .collect();

    if points.len() < MIN_TREND_YEARS {
        return Err(EngineError::insufficient(
            format!("{variable} trend in region {region}"),
            MIN_TREND_YEARS,
            points.len(),
        ));
    }

    let (slope, intercept, r_squared) = if let [(x0, y0), (x1, y1)] = points[..] {
        let slope = (y1 - y0) / (x1 - x0);
        (slope, y0 - slope * x0, None)
    } else {
        least_squares(&points)
    };

    let classification = classify(slope, threshold);
    debug!(%region, %variable, slope, %classification, "estimated trend");

    Ok(TrendResult {
        region: region.clone(),
        variable,
        slope_per_year: slope,
        intercept,
        classification,
        threshold,
        points: points.len(),
        r_squared,
    })
}

/// Trend of a region's annual means taken from `table`.
pub fn trend_for_region(
    table: &MonthlyTable,
    region: &Region,
    threshold: f64,
) -> Result<TrendResult, EngineError> {
    estimate_trend(region, table.variable(), &table.annual_means(region), threshold)
}

pub fn classify(slope: f64, threshold: f64) -> TrendClass {
    if slope > threshold {
        TrendClass::Increasing
    } else if slope < -threshold {
        TrendClass::Decreasing
    } else {
        TrendClass::Stable
    }
}

// Years are centred before fitting; raw calendar years squared lose precision.
fn least_squares(points: &[(f64, f64)]) -> (f64, f64, Option<f64>) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let (ss_res, ss_tot) = points.iter().fold((0.0, 0.0), |(res, tot), (x, y)| {
        let fitted = slope * x + intercept;
        (res + (y - fitted).powi(2), tot + (y - mean_y).powi(2))
    });
    let r_squared = (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot);

    (slope, intercept, r_squared)
}
