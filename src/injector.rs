use crate::catalog::ImageCatalog;
use crate::error::{InjectionError, Result};
use crate::faults::FaultSpec;
use crate::gateway::FaultGateway;
use crate::ledger::{SessionLedger, SessionState};
use crate::report::RunReport;
use crate::selector::{InjectionMode, InjectionSelector, SelectionStrategy};
use crate::write_thread::StagingArea;
use log::info;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;

/// Parameters of one injection run.
///
/// # Fields
///
/// * `source_dir` - Directory of normal images.
/// * `dest_dir` - Output directory, created if absent.
/// * `fault_name` - Fault name or short code, e.g. `Erosion` or `e`.
/// * `percentage` - Fault rate in percent (1..=100).
/// * `mode` - Full, partial or randomized injection.
/// * `strategy` - Selection used by partial and randomized runs.
/// * `threads` - Parallel gateway workers.
/// * `detail` - List corrupted names in the report message.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub fault_name: String,
    pub percentage: u32,
    pub mode: InjectionMode,
    pub strategy: SelectionStrategy,
    pub threads: usize,
    pub detail: bool,
}

impl RunRequest {
    /// Request with one worker, the random walk strategy and no detail.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        dest_dir: impl Into<PathBuf>,
        fault_name: &str,
        percentage: u32,
        mode: InjectionMode,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            dest_dir: dest_dir.into(),
            fault_name: fault_name.to_string(),
            percentage,
            mode,
            strategy: SelectionStrategy::default(),
            threads: 1,
            detail: false,
        }
    }
}

/// Entry point for injection runs.
///
/// Owns the session ledger between runs; there is no global state, a caller
/// keeps the injector (or the ledger from `into_ledger`) for a repeated run.
pub struct FaultInjector {
    gateway: Arc<dyn FaultGateway>,
    ledger: SessionLedger,
}

impl FaultInjector {
    /// Creates an injector.
    ///
    /// # Arguments
    ///
    /// * `gateway` - Reads, transforms and writes single images.
    /// * `ledger` - Session ledger, usually from `SessionLedger::load`.
    pub fn new(gateway: Arc<dyn FaultGateway>, ledger: SessionLedger) -> Self {
        Self { gateway, ledger }
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    /// Hands the ledger back, including the entries of runs made here.
    pub fn into_ledger(self) -> SessionLedger {
        self.ledger
    }

    /// Run one injection.
    ///
    /// 1. Normalize the fault (`UnknownFaultKind`, `DegenerateKernel`)
    /// 2. Check the session of the output directory (`LedgerExhausted`)
    /// 3. Read the catalog; a continuing session keeps only the names the
    ///    earlier run left unmodified
    /// 4. Select and write into a staging directory, then move into place
    /// 5. Commit the ledger entry
    ///
    /// Nothing is written to the output directory or the ledger when a step fails.
    ///
    /// # Arguments
    ///
    /// * `request` - Directories, fault, mode and worker count of the run.
    /// * `rng` - Random source of the selection; seed it for reproducible runs.
    ///
    /// # Returns
    ///
    /// * `Ok(RunReport)` - Report of the committed run.
    /// * `Err(InjectionError)` - The first failing step.
    pub fn run_injection<R: Rng + ?Sized>(
        &mut self,
        request: &RunRequest,
        rng: &mut R,
    ) -> Result<RunReport> {
        let spec = FaultSpec::normalize(&request.fault_name, request.percentage)?;
        info!(
            "Inject {} at {}% ({}) from {} into {}",
            spec.kind,
            spec.percentage,
            request.mode,
            request.source_dir.display(),
            request.dest_dir.display()
        );

        let prior = match self.ledger.open_or_start(&request.dest_dir)? {
            SessionState::Fresh => None,
            SessionState::Continuing {
                corrupted_names,
                remaining_names,
                source_log,
            } => {
                info!("Continue session of {}", source_log.display());
                Some((corrupted_names, remaining_names))
            }
            SessionState::Exhausted => {
                return Err(InjectionError::LedgerExhausted(request.dest_dir.clone()))
            }
        };

        let mut catalog = ImageCatalog::read(&request.source_dir)?;
        let already_corrupted = prior.map(|(corrupted_names, remaining_names)| {
            catalog.retain_names(&remaining_names);
            corrupted_names
        });

        let staging = StagingArea::create(&request.dest_dir)?;
        let selection = InjectionSelector::new(Arc::clone(&self.gateway))
            .with_threads(request.threads)
            .with_strategy(request.strategy)
            .select_and_apply(
                &catalog,
                request.mode,
                &spec,
                already_corrupted.as_deref(),
                staging.path(),
                rng,
            )?;
        staging.commit()?;

        self.ledger.commit(
            &request.dest_dir,
            request.mode,
            &selection.corrupted_names,
            &selection.remaining_names,
            selection.total_candidates,
        )?;

        Ok(RunReport::build(
            request.mode,
            selection.total_candidates,
            &selection.corrupted_names,
            request.detail,
        ))
    }
}
