//! Monte-Carlo randomness analysis.
//!
//! Craters are grouped into root-2 diameter bins. For every bin with at least
//! [`MIN_POINTS`] craters, each measure is evaluated on the real positions and
//! on `n_trials` random non-overlapping configurations of the same size; the
//! real value is then placed within the trial distribution.
//!
//! Trials are independent and run on a rayon pool. Each one draws from its own
//! generator seeded from `(seed, bin, trial)`, so results do not depend on the
//! thread count or scheduling.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::count::SpatialCount;
use super::index::{EqualAreaGrid, PointIndex};
use super::measures::{Auxiliary, MIN_POINTS, Measure, SampleRaster, evaluate, raster_samples_for};
use super::sprinkle::sprinkle_discs;
use crate::config::Settings;
use crate::domain::Binning;
use crate::error::{CraterError, ErrorKind};
use crate::io::{BinRecord, MeasureState, RandomnessState, read_randomness_json, write_randomness_json};
use crate::math::mean_sd;

const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Diameter bin analysed for randomness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpatialBin {
    /// `log2(d_min)` to three significant figures.
    pub key: String,
    pub d_min: f64,
    pub d_max: f64,
    /// Indices into the count's craters.
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinTrials {
    pub key: String,
    pub d_min: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasureTrials {
    pub n_trials: usize,
    pub bins: Vec<BinTrials>,
}

/// Real value of a measure against its trial distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinStats {
    pub key: String,
    pub d_min: f64,
    pub n: usize,
    pub m0: f64,
    pub mean: f64,
    pub sd: f64,
    pub n_sigma: f64,
    /// Percentage of trials below the real value.
    pub percentile: f64,
    pub aux: Auxiliary,
}

pub struct RandomnessAnalysis {
    count: SpatialCount,
    bins: Vec<SpatialBin>,
    raster: SampleRaster,
    runs: BTreeMap<Measure, MeasureTrials>,
    progress: Arc<AtomicUsize>,
}

impl RandomnessAnalysis {
    pub fn new(count: SpatialCount) -> Result<Self, CraterError> {
        let mut cc = count.crater_count()?;
        let binned = cc.apply_binning(Binning::Root2, 0.0).clone();
        let last = binned.len().saturating_sub(1);
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); binned.len()];
        for (i, c) in count.craters().iter().enumerate() {
            let j = binned.d_min.partition_point(|&b| b <= c.diameter);
            if j == 0 {
                continue;
            }
            let j = j - 1;
            if c.diameter < binned.d_max[j] || (j == last && c.diameter == binned.d_max[j]) {
                members[j].push(i);
            }
        }

        let bins: Vec<SpatialBin> = members
            .into_iter()
            .enumerate()
            .filter(|(_, m)| m.len() >= MIN_POINTS)
            .map(|(j, m)| SpatialBin {
                key: bin_key(binned.d_min[j]),
                d_min: binned.d_min[j],
                d_max: binned.d_max[j],
                members: m,
            })
            .collect();
        let largest = bins.iter().map(|b| b.members.len()).max().unwrap_or(0);
        let raster = SampleRaster::new(count.area(), raster_samples_for(largest))?;
        info!(
            source = count.source(),
            area = count.area().area(),
            enclosing = count.area().enclosing_area(),
            bins = bins.len(),
            "randomness analysis"
        );
        Ok(Self {
            count,
            bins,
            raster,
            runs: BTreeMap::new(),
            progress: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn count(&self) -> &SpatialCount {
        &self.count
    }

    pub fn bins(&self) -> &[SpatialBin] {
        &self.bins
    }

    pub fn trials(&self, measure: Measure) -> Option<&MeasureTrials> {
        self.runs.get(&measure)
    }

    /// Shared counter of completed trials in the current run.
    pub fn progress(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.progress)
    }

    /// Run `settings.trials` random configurations per bin for `measure`.
    /// Bins that already hold that many trials are kept; only the others run.
    pub fn run_montecarlo(&mut self, measure: Measure, settings: &Settings) -> Result<(), CraterError> {
        let n_trials = settings.trials;
        let mut kept: Vec<BinTrials> = self
            .runs
            .get(&measure)
            .filter(|r| r.n_trials == n_trials)
            .map(|r| {
                r.bins
                    .iter()
                    .filter(|t| t.values.len() == n_trials && self.bins.iter().any(|b| b.key == t.key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let missing: Vec<usize> = (0..self.bins.len())
            .filter(|&b| !kept.iter().any(|t| t.key == self.bins[b].key))
            .collect();
        if missing.is_empty() {
            info!(%measure, n_trials, "reusing Monte-Carlo trials");
            self.runs.insert(measure, MeasureTrials { n_trials, bins: kept });
            return Ok(());
        }
        info!(%measure, n_trials, reused = kept.len(), missing = missing.len(), "Monte-Carlo run");
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.threads.max(1))
            .build()
            .map_err(|e| CraterError::new(ErrorKind::Sampling, format!("Failed to start worker pool: {e}")))?;
        self.progress.store(0, Ordering::Relaxed);

        let area = self.count.area();
        for &b in &missing {
            let bin = &self.bins[b];
            let n = bin.members.len();
            info!(%measure, bin = %bin.key, d_min = bin.d_min, n, "Monte-Carlo bin");
            let grid = EqualAreaGrid::for_points(area.polygon().area(), n);
            let values = pool.install(|| {
                (0..n_trials)
                    .into_par_iter()
                    .map(|t| {
                        let mut rng = StdRng::seed_from_u64(trial_seed(settings.seed, b, t));
                        let points = sprinkle_discs(area, grid, n, bin.d_min, &mut rng)?;
                        let (m, _) = evaluate(measure, &points, area, &self.raster).ok_or_else(|| {
                            CraterError::new(ErrorKind::Sampling, format!("{measure} undefined for {n} points."))
                        })?;
                        self.progress.fetch_add(1, Ordering::Relaxed);
                        Ok(m)
                    })
                    .collect::<Result<Vec<f64>, CraterError>>()
            })?;
            info!(%measure, bin = %bin.key, done = self.progress.load(Ordering::Relaxed), "Monte-Carlo bin finished");
            kept.push(BinTrials {
                key: bin.key.clone(),
                d_min: bin.d_min,
                values,
            });
        }
        kept.sort_by(|a, b| a.d_min.total_cmp(&b.d_min));
        self.runs.insert(measure, MeasureTrials { n_trials, bins: kept });
        Ok(())
    }

    /// Statistics of every bin with trials for `measure`.
    pub fn calculate_stats(&self, measure: Measure) -> Result<Vec<BinStats>, CraterError> {
        let run = self
            .runs
            .get(&measure)
            .ok_or_else(|| CraterError::invalid_input(format!("No Monte-Carlo trials for {measure}.")))?;
        let area = self.count.area();
        let mut stats = Vec::with_capacity(run.bins.len());
        for trials in &run.bins {
            let Some(bin) = self.bins.iter().find(|b| b.key == trials.key) else {
                warn!(%measure, bin = %trials.key, "trials for unknown bin");
                continue;
            };
            let grid = EqualAreaGrid::for_points(area.polygon().area(), bin.members.len());
            let craters = self.count.craters();
            let index = PointIndex::from_points(grid, bin.members.iter().map(|&i| craters[i].position()));
            let Some((m0, aux)) = evaluate(measure, &index, area, &self.raster) else {
                warn!(%measure, bin = %bin.key, n = bin.members.len(), "too few craters; bin skipped");
                continue;
            };

            let (mean, sd) = mean_sd(&trials.values);
            let mut sorted = trials.values.clone();
            sorted.sort_by(f64::total_cmp);
            let below = sorted.partition_point(|&v| v < m0);
            let s = BinStats {
                key: bin.key.clone(),
                d_min: bin.d_min,
                n: bin.members.len(),
                m0,
                mean,
                sd,
                n_sigma: (m0 - mean) / sd,
                percentile: below as f64 / sorted.len().max(1) as f64 * 100.0,
                aux,
            };
            debug!(%measure, bin = %s.key, m0, mean, sd, n_sigma = s.n_sigma, "bin statistics");
            stats.push(s);
        }
        Ok(stats)
    }

    /// Snapshot of all trials for persistence.
    pub fn state(&self) -> Result<RandomnessState, CraterError> {
        let mut state = RandomnessState::new(self.count.source());
        for (&measure, run) in &self.runs {
            let stats = self.calculate_stats(measure)?;
            let bins = run
                .bins
                .iter()
                .map(|t| BinRecord {
                    bin: t.key.clone(),
                    d_min: t.d_min,
                    n_sigma: stats
                        .iter()
                        .find(|s| s.key == t.key)
                        .map(|s| s.n_sigma)
                        .filter(|v| v.is_finite()),
                    trials: t.values.clone(),
                })
                .collect();
            state.measures.insert(
                measure,
                MeasureState {
                    n_trials: run.n_trials,
                    bins,
                },
            );
        }
        Ok(state)
    }

    /// Adopt persisted trials. Bins no longer present, or with the wrong
    /// number of trials, are dropped.
    pub fn restore(&mut self, state: &RandomnessState) {
        if state.source != self.count.source() {
            warn!(saved = %state.source, current = self.count.source(), "restoring trials from another source");
        }
        for (&measure, ms) in &state.measures {
            let bins: Vec<BinTrials> = ms
                .bins
                .iter()
                .filter(|r| r.trials.len() == ms.n_trials && self.bins.iter().any(|b| b.key == r.bin))
                .map(|r| BinTrials {
                    key: r.bin.clone(),
                    d_min: r.d_min,
                    values: r.trials.clone(),
                })
                .collect();
            debug!(%measure, n_trials = ms.n_trials, bins = bins.len(), "restored trials");
            self.runs.insert(
                measure,
                MeasureTrials {
                    n_trials: ms.n_trials,
                    bins,
                },
            );
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CraterError> {
        write_randomness_json(path, &self.state()?)
    }

    /// Restore from `path` if it exists; returns whether anything was read.
    pub fn load(&mut self, path: &Path) -> Result<bool, CraterError> {
        if !path.exists() {
            return Ok(false);
        }
        let state = read_randomness_json(path)?;
        self.restore(&state);
        Ok(true)
    }
}

fn trial_seed(seed: u64, bin: usize, trial: usize) -> u64 {
    seed.wrapping_add((bin as u64).wrapping_mul(SEED_STRIDE))
        .wrapping_add(trial as u64)
}

/// `log2(d_min)` with three significant figures and no trailing zeros.
fn bin_key(d_min: f64) -> String {
    let x = (d_min.log2() * 1e9).round() / 1e9;
    if x == 0.0 {
        return "0".to_string();
    }
    let decimals = (2 - x.abs().log10().floor() as i32).max(0) as usize;
    let s = format!("{x:.decimals$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::count::PlacedCrater;
    use crate::spatial::geometry::{CountingArea, SphericalPolygon};

    const MOON_RADIUS: f64 = 1737.4;

    /// 2°×2° square with a tight 4×4 cluster of 0.5 km craters in one corner
    /// and two large craters elsewhere.
    fn clustered() -> SpatialCount {
        let ring = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)];
        let area = CountingArea::new(SphericalPolygon::simple(&ring).unwrap(), MOON_RADIUS).unwrap();
        let mut craters: Vec<PlacedCrater> = (0..16)
            .map(|i| PlacedCrater {
                lon: 0.1 + 0.05 * (i % 4) as f64,
                lat: 0.1 + 0.05 * (i / 4) as f64,
                diameter: 0.5,
                fraction: 1.0,
            })
            .collect();
        craters.push(PlacedCrater { lon: 1.5, lat: 1.5, diameter: 5.0, fraction: 1.0 });
        craters.push(PlacedCrater { lon: 1.0, lat: 1.6, diameter: 5.2, fraction: 1.0 });
        SpatialCount::new("clustered", craters, area).unwrap()
    }

    fn settings(threads: usize, trials: usize) -> Settings {
        Settings {
            threads,
            trials,
            seed: 42,
            ..Settings::default()
        }
    }

    #[test]
    fn bin_keys_match_three_significant_figures() {
        assert_eq!(bin_key(1.0), "0");
        assert_eq!(bin_key(2f64.sqrt()), "0.5");
        assert_eq!(bin_key(0.5f64.sqrt()), "-0.5");
        assert_eq!(bin_key(2f64.powf(10.5)), "10.5");
        assert_eq!(bin_key(2f64.powf(123.7)), "124");
    }

    #[test]
    fn small_bins_are_skipped() {
        let ra = RandomnessAnalysis::new(clustered()).unwrap();
        assert_eq!(ra.bins().len(), 1);
        assert_eq!(ra.bins()[0].members.len(), 16);
        assert!(ra.bins()[0].d_min <= 0.5 && 0.5 < ra.bins()[0].d_max);
    }

    #[test]
    fn clustering_is_detected() {
        let mut ra = RandomnessAnalysis::new(clustered()).unwrap();
        let s = settings(2, 20);
        ra.run_montecarlo(Measure::M2cnd, &s).unwrap();
        ra.run_montecarlo(Measure::Sdaa, &s).unwrap();
        assert_eq!(ra.progress().load(Ordering::Relaxed), 20);

        let m2 = &ra.calculate_stats(Measure::M2cnd).unwrap()[0];
        assert!(m2.n_sigma < -3.0, "m2cnd n_sigma {}", m2.n_sigma);
        assert_eq!(m2.percentile, 0.0);
        let Auxiliary::Neighbours(nb) = &m2.aux else {
            panic!("expected neighbours");
        };
        assert_eq!(nb.len(), 16);

        let sd = &ra.calculate_stats(Measure::Sdaa).unwrap()[0];
        assert!(sd.n_sigma > 3.0, "sdaa n_sigma {}", sd.n_sigma);
        assert!(sd.percentile >= 90.0);
    }

    #[test]
    fn trials_do_not_depend_on_thread_count() {
        let mut one = RandomnessAnalysis::new(clustered()).unwrap();
        let mut three = RandomnessAnalysis::new(clustered()).unwrap();
        one.run_montecarlo(Measure::M2cnd, &settings(1, 8)).unwrap();
        three.run_montecarlo(Measure::M2cnd, &settings(3, 8)).unwrap();
        assert_eq!(one.trials(Measure::M2cnd), three.trials(Measure::M2cnd));
    }

    #[test]
    fn matching_trial_count_is_reused() {
        let mut ra = RandomnessAnalysis::new(clustered()).unwrap();
        ra.run_montecarlo(Measure::M2cnd, &settings(2, 5)).unwrap();
        let before = ra.trials(Measure::M2cnd).cloned();
        let mut other_seed = settings(2, 5);
        other_seed.seed = 7;
        ra.run_montecarlo(Measure::M2cnd, &other_seed).unwrap();
        assert_eq!(ra.trials(Measure::M2cnd).cloned(), before);
        ra.run_montecarlo(Measure::M2cnd, &settings(2, 6)).unwrap();
        assert_eq!(ra.trials(Measure::M2cnd).unwrap().bins[0].values.len(), 6);
    }

    #[test]
    fn state_restores_trials() {
        let mut ra = RandomnessAnalysis::new(clustered()).unwrap();
        ra.run_montecarlo(Measure::M2cnd, &settings(2, 5)).unwrap();
        let path = std::env::temp_dir().join(format!("crater_age_mc_{}.json", std::process::id()));
        ra.save(&path).unwrap();

        let mut fresh = RandomnessAnalysis::new(clustered()).unwrap();
        assert!(fresh.load(&path).unwrap());
        std::fs::remove_file(&path).ok();
        assert_eq!(fresh.trials(Measure::M2cnd), ra.trials(Measure::M2cnd));
        let state = fresh.state().unwrap();
        assert!(state.measures[&Measure::M2cnd].bins[0].n_sigma.is_some());

        assert!(!fresh.load(Path::new("/nonexistent/crater_ra.json")).unwrap());
    }

    #[test]
    fn partially_restored_trials_are_completed() {
        let with_large_bin = || {
            let base = clustered();
            let mut craters = base.craters().to_vec();
            craters.push(PlacedCrater { lon: 0.5, lat: 1.5, diameter: 4.5, fraction: 1.0 });
            SpatialCount::new("two bins", craters, base.area().clone()).unwrap()
        };
        let mut full = RandomnessAnalysis::new(with_large_bin()).unwrap();
        assert_eq!(full.bins().len(), 2);
        full.run_montecarlo(Measure::M2cnd, &settings(2, 5)).unwrap();
        let mut state = full.state().unwrap();
        state.measures.get_mut(&Measure::M2cnd).unwrap().bins.truncate(1);

        let mut partial = RandomnessAnalysis::new(with_large_bin()).unwrap();
        partial.restore(&state);
        assert_eq!(partial.trials(Measure::M2cnd).unwrap().bins.len(), 1);
        partial.run_montecarlo(Measure::M2cnd, &settings(2, 5)).unwrap();
        assert_eq!(partial.progress().load(Ordering::Relaxed), 5);
        assert_eq!(partial.calculate_stats(Measure::M2cnd).unwrap().len(), 2);
        // Seeds depend only on bin and trial, so the rerun bin matches.
        assert_eq!(partial.trials(Measure::M2cnd), full.trials(Measure::M2cnd));
    }

    #[test]
    fn stats_without_trials_fail() {
        let ra = RandomnessAnalysis::new(clustered()).unwrap();
        assert!(ra.calculate_stats(Measure::Sdaa).is_err());
    }
}
