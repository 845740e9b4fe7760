//! # Injection Selector
//!
//! Decides which candidates of a catalog receive the fault and drives the
//! gateway over them. Partial and randomized runs first mirror every
//! candidate unmodified (baseline pass), then overwrite the selected ones
//! with the fault pass, so the output always holds one file per candidate.
//!
//! Selection is a scan-and-reject walk: the scan cursor runs over the
//! candidates, wrapping around, and each visited candidate is taken when a
//! draw from 1..=4 is even, until the target count is reached.

use crate::catalog::{subtract, ImageCatalog};
use crate::error::{InjectionError, Result};
use crate::faults::FaultSpec;
use crate::gateway::{FaultGateway, Pass};
use crate::write_thread::{WriteJob, WriteThread};
use itertools::Itertools;
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// How many candidates are corrupted.
pub enum InjectionMode {
    /// Every candidate
    Full,
    /// `floor(candidates * implementation_rate / 100)` candidates
    PartialDeterministic { implementation_rate: u32 },
    /// A count drawn uniformly from `0..candidates`
    Randomized,
}

impl InjectionMode {
    /// Mode picked from the randomize flag and the implementation rate.
    /// Randomize wins; otherwise a rate of 100 means full injection.
    pub fn from_flags(randomize: bool, implementation_rate: u32) -> Result<Self> {
        if !(1..=100).contains(&implementation_rate) {
            return Err(InjectionError::InvalidPercentage(implementation_rate));
        }
        Ok(match (randomize, implementation_rate) {
            (true, _) => InjectionMode::Randomized,
            (false, 100) => InjectionMode::Full,
            (false, implementation_rate) => InjectionMode::PartialDeterministic {
                implementation_rate,
            },
        })
    }

    /// Number of candidates to corrupt out of `candidates`.
    pub fn target_count<R: Rng + ?Sized>(&self, candidates: usize, rng: &mut R) -> usize {
        match *self {
            InjectionMode::Full => candidates,
            InjectionMode::PartialDeterministic {
                implementation_rate,
            } => (candidates * implementation_rate as usize / 100).min(candidates),
            InjectionMode::Randomized if candidates == 0 => 0,
            InjectionMode::Randomized => rng.gen_range(0..candidates),
        }
    }

    /// Whether the baseline mirror pass runs before the fault pass
    pub fn mirrors(&self) -> bool {
        !matches!(self, InjectionMode::Full)
    }
}

impl Display for InjectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionMode::Full => write!(f, "full"),
            InjectionMode::PartialDeterministic {
                implementation_rate,
            } => write!(f, "partial ({}%)", implementation_rate),
            InjectionMode::Randomized => write!(f, "randomized"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Selection used by partial and randomized runs.
pub enum SelectionStrategy {
    /// Scan-and-reject walk driven by the random source
    #[default]
    RandomWalk,
    /// First `target` candidates in catalog order, no randomness
    FirstN,
}

/// Outcome of one selection.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    /// Corrupted names, sorted for partial and randomized runs, catalog
    /// order for full runs
    pub corrupted_names: Vec<String>,
    /// Candidates left unmodified, in catalog order
    pub remaining_names: Vec<String>,
    /// Number of candidates after removing already corrupted names
    pub total_candidates: usize,
}

/// Positions picked by the scan-and-reject walk over `len` candidates.
///
/// The cursor visits positions in order, wrapping around, and takes a
/// position when a draw from 1..=4 is even. A position already taken is
/// passed over without a draw, so no candidate is picked twice. This consumes
/// fewer draws than a walk that draws on every visit: a seeded sequence picks
/// differently from data sets recorded with such a walk once the cursor has
/// wrapped. Early positions are favoured; for one pick out of four the odds
/// are 8/15, 4/15, 2/15 and 1/15.
///
/// # Arguments
///
/// * `len` - Number of candidates.
/// * `target` - Number of positions to pick, capped at `len`.
/// * `rng` - Random source driving the draws.
///
/// # Returns
///
/// * `Vec<usize>` - Distinct positions in pick order.
pub fn random_walk<R: Rng + ?Sized>(len: usize, target: usize, rng: &mut R) -> Vec<usize> {
    let target = target.min(len);
    let mut taken = vec![false; len];
    let mut picked = Vec::with_capacity(target);
    let mut scan_index = 0;

    while picked.len() != target {
        if !taken[scan_index] {
            let draw: u8 = rng.gen_range(1..=4);
            if draw % 2 == 0 {
                taken[scan_index] = true;
                picked.push(scan_index);
            }
        }
        scan_index = (scan_index + 1) % len;
    }
    picked
}

/// Pick the names to corrupt among `candidates`.
///
/// # Arguments
///
/// * `candidates` - Effective candidates in catalog order.
/// * `mode` - Decides the target count.
/// * `strategy` - Random walk or catalog prefix; ignored by full injection.
/// * `rng` - Random source for the target count and the walk.
///
/// # Returns
///
/// * `Vec<String>` - Picked names in pick order.
pub fn plan<R: Rng + ?Sized>(
    candidates: &[String],
    mode: InjectionMode,
    strategy: SelectionStrategy,
    rng: &mut R,
) -> Vec<String> {
    let target = mode.target_count(candidates.len(), rng);
    debug!("Target {} of {} candidates ({})", target, candidates.len(), mode);

    match (mode, strategy) {
        (InjectionMode::Full, _) => candidates.to_vec(),
        (_, SelectionStrategy::FirstN) => candidates.iter().take(target).cloned().collect(),
        (_, SelectionStrategy::RandomWalk) => random_walk(candidates.len(), target, rng)
            .into_iter()
            .map(|index| candidates[index].clone())
            .collect(),
    }
}

/// Runs selections and writes their images through a gateway.
pub struct InjectionSelector {
    gateway: Arc<dyn FaultGateway>,
    threads: usize,
    strategy: SelectionStrategy,
}

impl InjectionSelector {
    /// Creates a selector writing through `gateway` with one worker and the
    /// random walk strategy.
    pub fn new(gateway: Arc<dyn FaultGateway>) -> Self {
        Self {
            gateway,
            threads: 1,
            strategy: SelectionStrategy::default(),
        }
    }

    /// Number of parallel gateway workers (at least one)
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Select the images of `catalog` to corrupt and write all candidates to
    /// `output_dir`.
    ///
    /// Names in `already_corrupted` are removed from the catalog first. The
    /// selection is resolved completely before any file is written; the
    /// baseline pass finishes before the fault pass starts.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Images of the source directory.
    /// * `mode` - Full, partial or randomized injection.
    /// * `spec` - Fault handed to the gateway.
    /// * `already_corrupted` - Names corrupted by an earlier run, if any.
    /// * `output_dir` - Directory receiving the written images.
    /// * `rng` - Random source of the selection.
    ///
    /// # Returns
    ///
    /// * `Ok(Selection)` - Corrupted and remaining names, which partition the
    ///   effective candidates.
    /// * `Err(InjectionError)` - See below.
    ///
    /// # Errors
    ///
    /// * `EmptyCatalog` if no candidate is left.
    /// * Any gateway failure (`IOFailure`, `Image`).
    pub fn select_and_apply<R: Rng + ?Sized>(
        &self,
        catalog: &ImageCatalog,
        mode: InjectionMode,
        spec: &FaultSpec,
        already_corrupted: Option<&[String]>,
        output_dir: &Path,
        rng: &mut R,
    ) -> Result<Selection> {
        let candidates = match already_corrupted {
            Some(corrupted) => subtract(&catalog.names, corrupted),
            None => catalog.names.clone(),
        };
        if candidates.is_empty() {
            return Err(InjectionError::EmptyCatalog(catalog.directory.clone()));
        }
        info!(
            "{} candidates of {} in {}",
            candidates.len(),
            catalog.len(),
            catalog.directory.display()
        );

        let picked = plan(&candidates, mode, self.strategy, rng);
        let pool = WriteThread::with_threads(self.threads, Arc::clone(&self.gateway))?;
        let job = |name: &String, pass: Pass| WriteJob {
            name: name.clone(),
            source: catalog.path_of(name),
            destination: output_dir.join(catalog.file_name(name)),
            spec: *spec,
            pass,
        };

        if mode.mirrors() {
            let n = pool.run_batch(candidates.iter().map(|name| job(name, Pass::Baseline)).collect())?;
            debug!("Baseline pass wrote {} images", n);
        }
        let n = pool.run_batch(picked.iter().map(|name| job(name, Pass::Fault)).collect())?;
        debug!("Fault pass wrote {} images", n);

        let corrupted_names = match mode {
            InjectionMode::Full => picked,
            _ => picked.into_iter().sorted().collect(),
        };
        let remaining_names = subtract(&candidates, &corrupted_names);

        Ok(Selection {
            corrupted_names,
            remaining_names,
            total_candidates: candidates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("img{i:02}")).collect()
    }

    #[test]
    fn mode_from_flags() {
        assert_eq!(InjectionMode::Randomized, InjectionMode::from_flags(true, 40).unwrap());
        assert_eq!(InjectionMode::Full, InjectionMode::from_flags(false, 100).unwrap());
        assert_eq!(
            InjectionMode::PartialDeterministic {
                implementation_rate: 30
            },
            InjectionMode::from_flags(false, 30).unwrap()
        );
        assert!(InjectionMode::from_flags(false, 0).is_err());
    }

    #[test]
    fn partial_target_is_floored() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mode = InjectionMode::PartialDeterministic {
            implementation_rate: 30,
        };
        assert_eq!(3, mode.target_count(10, &mut rng));
        assert_eq!(2, mode.target_count(9, &mut rng));
        assert_eq!(0, mode.target_count(3, &mut rng));
    }

    #[test]
    fn randomized_target_is_below_candidates() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for _ in 0..200 {
            assert!(InjectionMode::Randomized.target_count(5, &mut rng) < 5);
        }
        assert_eq!(0, InjectionMode::Randomized.target_count(0, &mut rng));
    }

    #[test]
    fn walk_picks_exactly_target_distinct_positions() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for len in 1..30 {
            for target in 0..=len {
                let picked = random_walk(len, target, &mut rng);
                assert_eq!(target, picked.len());
                let unique: HashSet<_> = picked.iter().collect();
                assert_eq!(target, unique.len());
                assert!(picked.iter().all(|&i| i < len));
            }
        }
    }

    #[test]
    fn walk_is_reproducible_for_one_seed() {
        let a = random_walk(50, 20, &mut ChaCha8Rng::seed_from_u64(9));
        let b = random_walk(50, 20, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn walk_probability_halves_along_the_scan() {
        let mut rng = ChaCha8Rng::seed_from_u64(1234);
        let mut hits = [0usize; 4];
        let rounds = 8000;
        for _ in 0..rounds {
            hits[random_walk(4, 1, &mut rng)[0]] += 1;
        }
        // First position is favoured by the first-even-draw rule: 8/15, 4/15, 2/15, 1/15
        assert!(hits[0] > hits[1] && hits[1] > hits[2] && hits[2] > hits[3]);
        assert!(hits.iter().all(|&h| h > 0));
    }

    #[test]
    fn first_n_takes_catalog_prefix() {
        let candidates = names(10);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let picked = plan(
            &candidates,
            InjectionMode::PartialDeterministic {
                implementation_rate: 30,
            },
            SelectionStrategy::FirstN,
            &mut rng,
        );
        assert_eq!(candidates[..3].to_vec(), picked);
    }

    #[test]
    fn full_plan_is_whole_catalog() {
        let candidates = names(4);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let picked = plan(&candidates, InjectionMode::Full, SelectionStrategy::RandomWalk, &mut rng);
        assert_eq!(candidates, picked);
    }

    /// Gateway recording its calls instead of writing files
    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<(String, Pass)>>,
    }

    impl FaultGateway for RecordingGateway {
        fn inject(
            &self,
            source: &Path,
            _destination: &Path,
            _spec: &FaultSpec,
            pass: Pass,
        ) -> Result<()> {
            let name = source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.calls.lock().unwrap().push((name, pass));
            Ok(())
        }
    }

    #[test]
    fn selection_partitions_candidates_left_by_earlier_run() {
        let catalog = ImageCatalog::new("/data/normal", names(10), ".png");
        let already = vec!["img01".to_string(), "img04".to_string(), "img07".to_string()];
        let candidates = subtract(&catalog.names, &already);
        let spec = FaultSpec::normalize("Erosion", 50).unwrap();

        for mode in [
            InjectionMode::Randomized,
            InjectionMode::PartialDeterministic {
                implementation_rate: 50,
            },
        ] {
            let gateway = Arc::new(RecordingGateway::default());
            let mut rng = ChaCha8Rng::seed_from_u64(17);
            let selection = InjectionSelector::new(gateway.clone())
                .with_threads(3)
                .select_and_apply(
                    &catalog,
                    mode,
                    &spec,
                    Some(already.as_slice()),
                    Path::new("/data/faulty"),
                    &mut rng,
                )
                .unwrap();

            assert_eq!(candidates.len(), selection.total_candidates);
            let corrupted: HashSet<_> = selection.corrupted_names.iter().collect();
            assert!(selection.remaining_names.iter().all(|name| !corrupted.contains(name)));
            let union: Vec<String> = selection
                .corrupted_names
                .iter()
                .chain(selection.remaining_names.iter())
                .cloned()
                .sorted()
                .collect();
            assert_eq!(candidates, union, "{mode}");

            // Every candidate is mirrored before the first fault is written
            let calls = gateway.calls.lock().unwrap();
            let first_fault = calls
                .iter()
                .position(|(_, pass)| *pass == Pass::Fault)
                .unwrap_or(calls.len());
            assert_eq!(candidates.len(), first_fault);
            let mirrored: Vec<String> = calls[..first_fault]
                .iter()
                .map(|(name, _)| name.clone())
                .sorted()
                .collect();
            assert_eq!(candidates, mirrored);
            let faulty: Vec<String> = calls[first_fault..]
                .iter()
                .map(|(name, _)| name.clone())
                .sorted()
                .collect();
            assert_eq!(selection.corrupted_names, faulty);
        }
    }

    #[test]
    fn fully_corrupted_catalog_has_no_candidates() {
        let catalog = ImageCatalog::new("/data/normal", names(2), ".png");
        let spec = FaultSpec::normalize("g", 10).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let result = InjectionSelector::new(Arc::new(RecordingGateway::default()))
            .select_and_apply(
                &catalog,
                InjectionMode::Randomized,
                &spec,
                Some(catalog.names.as_slice()),
                Path::new("/data/faulty"),
                &mut rng,
            );
        assert!(matches!(result, Err(InjectionError::EmptyCatalog(_))));
    }
}
