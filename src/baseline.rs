use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use tracing::debug;

use crate::aggregate::MonthlyTable;
use crate::models::{HistoricalBaseline, Month, Region, Variable, Year};

/// Historical baselines for one variable, keyed by region and then calendar month.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineTable {
    variable: Variable,
    entries: BTreeMap<Region, BTreeMap<Month, HistoricalBaseline>>,
}

/// Averages each (region, month) over every year that has a monthly mean.
pub fn compute_baselines(table: &MonthlyTable) -> BaselineTable {
    compute_baselines_for_period(table, None)
}

/// Like [`compute_baselines`], restricted to years inside `reference`.
///
/// Years without a value for a month are not counted for that month, so
/// gaps never pull a baseline towards zero. A month with no contributing
/// year gets no entry.
pub fn compute_baselines_for_period(
    table: &MonthlyTable,
    reference: Option<RangeInclusive<Year>>,
) -> BaselineTable {
    let variable = table.variable();
    let sums = table
        .iter()
        .filter(|cell| reference.as_ref().map_or(true, |r| r.contains(&cell.year)))
        .fold(
            BTreeMap::<(&Region, Month), (f64, usize)>::new(),
            |mut acc, cell| {
                let entry = acc.entry((&cell.region, cell.month)).or_insert((0.0, 0));
                entry.0 += cell.mean;
                entry.1 += 1;
                acc
            },
        );

    let mut entries = BTreeMap::<Region, BTreeMap<Month, HistoricalBaseline>>::new();
    for ((region, month), (sum, years)) in sums {
        let baseline = HistoricalBaseline {
            region: region.clone(),
            month,
            variable,
            baseline_mean: sum / years as f64,
            years_used: years,
        };
        entries
            .entry(region.clone())
            .or_default()
            .insert(month, baseline);
    }

    let baselines = BaselineTable { variable, entries };
    debug!(%variable, entries = baselines.len(), "computed historical baselines");
    baselines
}

impl BaselineTable {
    pub fn variable(&self) -> Variable {
        self.variable
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, region: &Region, month: Month) -> Option<&HistoricalBaseline> {
        self.entries.get(region)?.get(&month)
    }

    /// Baselines in (region, month) order.
    pub fn iter(&self) -> impl Iterator<Item = &HistoricalBaseline> {
        self.entries.values().flat_map(BTreeMap::values)
    }

    pub fn for_region<'a>(
        &'a self,
        region: &Region,
    ) -> impl Iterator<Item = &'a HistoricalBaseline> + 'a {
        self.entries.get(region).into_iter().flat_map(BTreeMap::values)
    }

    /// Calendar months with no baseline for `region`.
    pub fn missing_months(&self, region: &Region) -> Vec<Month> {
        let months = self.entries.get(region);
        Month::all()
            .filter(|month| months.map_or(true, |m| !m.contains_key(month)))
            .collect()
    }
}
