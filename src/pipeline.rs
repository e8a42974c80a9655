use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregate::{aggregate, MonthlyTable};
use crate::baseline::{compute_baselines_for_period, BaselineTable};
use crate::config::EngineConfig;
use crate::deviation::{most_atypical, rank_years};
use crate::error::EngineError;
use crate::extremes::{locate_extremes, seasonal_profiles};
use crate::models::{
    CanonicalRecord, ExtremeSummary, RawTable, Region, SeasonalProfile, Selection, TrendResult,
    Variable, YearlyDeviationScore,
};
use crate::normalize::{normalize, NormalizeOptions, NormalizeStats};
use crate::trend::trend_for_region;

/// Immutable, normalized observation table shared across analyses.
///
/// Built once by the caller and passed by reference; clones share the same
/// records.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Arc<[CanonicalRecord]>,
    variables: Vec<Variable>,
    stats: NormalizeStats,
}

impl Snapshot {
    pub fn from_table(
        table: &RawTable,
        variables: &[Variable],
        options: &NormalizeOptions,
    ) -> Result<Snapshot, EngineError> {
        let normalized = normalize(table, variables, options)?;
        Ok(Snapshot {
            records: normalized.records.into(),
            variables: variables.to_vec(),
            stats: normalized.stats,
        })
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn stats(&self) -> &NormalizeStats {
        &self.stats
    }

    pub fn covers(&self, variable: Variable) -> bool {
        self.variables.contains(&variable)
    }
}

#[derive(Debug, Clone)]
pub struct RegionAnalysis {
    pub region: Region,
    pub ranking: Vec<YearlyDeviationScore>,
    pub trend: Result<TrendResult, EngineError>,
}

impl RegionAnalysis {
    pub fn most_atypical(&self) -> Option<&YearlyDeviationScore> {
        most_atypical(&self.ranking)
    }
}

/// Every derived table for one variable under one selection.
#[derive(Debug, Clone)]
pub struct VariableAnalysis {
    pub variable: Variable,
    pub selection: Selection,
    pub table: MonthlyTable,
    pub baselines: BaselineTable,
    pub regions: Vec<RegionAnalysis>,
    pub profiles: Vec<SeasonalProfile>,
    pub extremes: Result<ExtremeSummary, EngineError>,
}

/// Runs aggregation, baselines, deviation ranking, trends and extremes for
/// `variable`.
///
/// The region in `selection` scopes the whole analysis. Year and month only
/// narrow the global max/min search. Baselines, rankings, trends and the
/// seasonal winners always use every year of the scoped regions. A region with too little data for a
/// trend keeps its error in [`RegionAnalysis::trend`] and does not affect
/// the other regions.
pub fn analyze_variable(
    snapshot: &Snapshot,
    variable: Variable,
    selection: &Selection,
    config: &EngineConfig,
) -> Result<VariableAnalysis, EngineError> {
    if !snapshot.covers(variable) {
        return Err(EngineError::schema(variable.source_columns().join(", ")));
    }

    let region_scope = Selection {
        region: selection.region.clone(),
        ..Selection::default()
    };
    let table = aggregate(snapshot.records(), variable).filter(&region_scope);
    if table.is_empty() {
        return Err(EngineError::NoData {
            selection: format!("{variable} {region_scope}"),
        });
    }

    let baselines = compute_baselines_for_period(&table, config.baseline.reference_period());
    let threshold = config.trend.threshold_for(variable);

    let regions: Vec<RegionAnalysis> = table
        .regions()
        .into_iter()
        .map(|region| {
            let ranking = rank_years(&table, &baselines, &region);
            let trend = trend_for_region(&table, &region, threshold);
            if let Err(err) = &trend {
                warn!(%region, %variable, "trend undetermined: {err}");
            }
            RegionAnalysis {
                region,
                ranking,
                trend,
            }
        })
        .collect();

    let profiles = seasonal_profiles(&table);
    let extremes = locate_extremes(&table, selection);

    info!(
        %variable,
        regions = regions.len(),
        cells = table.len(),
        baselines = baselines.len(),
        "variable analysis complete"
    );

    Ok(VariableAnalysis {
        variable,
        selection: selection.clone(),
        table,
        baselines,
        regions,
        profiles,
        extremes,
    })
}
