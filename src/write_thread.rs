use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{spawn, JoinHandle};

use crate::error::{InjectionError, Result};
use crate::faults::FaultSpec;
use crate::gateway::{FaultGateway, Pass};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};

/// Directory inside the destination receiving the files of a running injection.
pub const STAGING_DIR: &str = ".fi_staging";

/// One gateway call for one image.
///
/// # Fields
///
/// * `name` - Base name of the image.
/// * `source` - Image file to read.
/// * `destination` - File to write.
/// * `spec` - Fault of the current run.
/// * `pass` - Baseline copy or fault pass.
#[derive(Clone, Debug)]
pub struct WriteJob {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub spec: FaultSpec,
    pub pass: Pass,
}

type WriteResult = (String, Result<()>);

/// Pool of worker threads running gateway calls.
///
/// Jobs of one batch run in any order and in parallel; `run_batch` only
/// returns when every job of the batch has reported back, so consecutive
/// batches never overlap.
///
/// # Usage Pattern
///
/// 1. Create with `new()`
/// 2. Start worker threads with `start_worker_threads()` and a gateway
/// 3. Hand over batches with `run_batch()`
/// 4. Workers terminate when the pool is dropped
pub struct WriteThread {
    /// Sender for jobs, `None` once shutdown has begun.
    workload_sender: Option<Sender<WriteJob>>,
    /// Receiver shared by all workers.
    workload_receiver: Receiver<WriteJob>,
    /// Results reported by the workers, `None` until workers are started.
    result_receiver: Option<Receiver<WriteResult>>,
    /// Worker handles joined on drop.
    handles: Option<Vec<JoinHandle<()>>>,
}

impl WriteThread {
    /// Creates a pool with its workload channel. No worker threads are
    /// spawned at this stage.
    ///
    /// # Returns
    ///
    /// * `WriteThread` - Pool without workers; call `start_worker_threads()` next.
    pub fn new() -> Self {
        let (workload_sender, workload_receiver): (Sender<WriteJob>, Receiver<WriteJob>) =
            unbounded();

        WriteThread {
            workload_sender: Some(workload_sender),
            workload_receiver,
            result_receiver: None,
            handles: None,
        }
    }

    /// Convenience constructor returning a pool with started workers.
    ///
    /// # Arguments
    ///
    /// * `number_of_threads` - Number of worker threads to spawn (must be > 0).
    /// * `gateway` - Gateway shared by all workers.
    ///
    /// # Returns
    ///
    /// * `Ok(WriteThread)` - Pool ready for `run_batch()`.
    /// * `Err(InjectionError::WorkerPool)` - If `number_of_threads` is zero.
    pub fn with_threads(number_of_threads: usize, gateway: Arc<dyn FaultGateway>) -> Result<Self> {
        let mut pool = Self::new();
        pool.start_worker_threads(number_of_threads, gateway)?;
        Ok(pool)
    }

    /// Spawn `number_of_threads` workers, each calling `gateway` for the
    /// jobs it receives.
    ///
    /// # Arguments
    ///
    /// * `number_of_threads` - Number of worker threads to spawn (must be > 0).
    /// * `gateway` - Gateway shared by all workers.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Worker threads started.
    /// * `Err(InjectionError::WorkerPool)` - If `number_of_threads` is zero.
    pub fn start_worker_threads(
        &mut self,
        number_of_threads: usize,
        gateway: Arc<dyn FaultGateway>,
    ) -> Result<()> {
        if number_of_threads == 0 {
            return Err(InjectionError::WorkerPool(
                "Number of threads must be greater than 0".to_string(),
            ));
        }

        let (result_sender, result_receiver) = unbounded();
        self.result_receiver = Some(result_receiver);

        let mut handles = Vec::with_capacity(number_of_threads);
        for _ in 0..number_of_threads {
            let receiver = self.workload_receiver.clone();
            let result_sender: Sender<WriteResult> = result_sender.clone();
            let gateway = Arc::clone(&gateway);

            let handle = spawn(move || {
                // Loop until the workload sender is dropped
                while let Ok(job) = receiver.recv() {
                    let result = gateway.inject(&job.source, &job.destination, &job.spec, job.pass);
                    if result_sender.send((job.name, result)).is_err() {
                        break;
                    }
                }
            });
            handles.push(handle);
        }
        self.handles = Some(handles);
        debug!("Started {} write worker threads", number_of_threads);
        Ok(())
    }

    fn send_workload(&self, job: WriteJob) -> Result<()> {
        match &self.workload_sender {
            Some(sender) => sender
                .send(job)
                .map_err(|e| InjectionError::WorkerPool(format!("Failed to send job: {}", e))),
            None => Err(InjectionError::WorkerPool(
                "Workload sender channel is closed".to_string(),
            )),
        }
    }

    /// Run all `jobs` and wait for them.
    ///
    /// Every job is awaited even after a failure; the first failure is returned.
    ///
    /// # Arguments
    ///
    /// * `jobs` - Gateway calls of one pass.
    ///
    /// # Returns
    ///
    /// * `Ok(usize)` - Number of completed jobs.
    /// * `Err(InjectionError)` - First gateway failure, or `WorkerPool` if the
    ///   workers were not started or a channel broke.
    pub fn run_batch(&self, jobs: Vec<WriteJob>) -> Result<usize> {
        let receiver = self.result_receiver.as_ref().ok_or_else(|| {
            InjectionError::WorkerPool(
                "Write threads not initialized. Call start_worker_threads() first.".to_string(),
            )
        })?;

        let n_jobs = jobs.len();
        for job in jobs {
            self.send_workload(job)?;
        }

        let mut first_error = None;
        for _ in 0..n_jobs {
            match receiver.recv() {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(e))) => {
                    warn!("Write of {} failed: {}", name, e);
                    first_error.get_or_insert(e);
                }
                Err(_) => {
                    return Err(InjectionError::WorkerPool(
                        "Write result channel disconnected".to_string(),
                    ))
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(n_jobs),
        }
    }
}

impl Default for WriteThread {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WriteThread {
    fn drop(&mut self) {
        // Close the sender to signal worker threads to stop
        drop(self.workload_sender.take());

        if let Some(handles) = self.handles.take() {
            for handle in handles {
                let _ = handle.join();
            }
        }
    }
}

/// Staging directory for one run.
///
/// Files are written below `<destination>/.fi_staging` and only moved into
/// the destination by `commit`. Dropping an uncommitted area removes it, so a
/// failed run leaves the destination as it was.
pub struct StagingArea {
    staging: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl StagingArea {
    /// Create the destination if absent and an empty staging directory in it.
    ///
    /// # Arguments
    ///
    /// * `destination` - Output directory of the run.
    ///
    /// # Returns
    ///
    /// * `Ok(StagingArea)` - Staging directory ready for writes.
    /// * `Err(InjectionError::IOFailure)` - If a directory cannot be created or cleaned.
    pub fn create(destination: &Path) -> Result<Self> {
        fs::create_dir_all(destination).map_err(|e| InjectionError::io(destination, e))?;
        let staging = destination.join(STAGING_DIR);
        if staging.exists() {
            // Leftover of an interrupted run
            warn!("Remove stale staging directory {}", staging.display());
            fs::remove_dir_all(&staging).map_err(|e| InjectionError::io(&staging, e))?;
        }
        fs::create_dir(&staging).map_err(|e| InjectionError::io(&staging, e))?;

        Ok(Self {
            staging,
            destination: destination.to_path_buf(),
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Move every staged file into the destination, replacing existing files.
    /// Returns the number of moved files.
    pub fn commit(mut self) -> Result<usize> {
        let entries = fs::read_dir(&self.staging).map_err(|e| InjectionError::io(&self.staging, e))?;
        let mut moved = 0;
        for entry in entries {
            let entry = entry.map_err(|e| InjectionError::io(&self.staging, e))?;
            let target = self.destination.join(entry.file_name());
            fs::rename(entry.path(), &target).map_err(|e| InjectionError::io(&target, e))?;
            moved += 1;
        }
        fs::remove_dir(&self.staging).map_err(|e| InjectionError::io(&self.staging, e))?;
        self.committed = true;
        info!("Committed {} files to {}", moved, self.destination.display());
        Ok(moved)
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_dir_all(&self.staging) {
                warn!("Unable to remove {}: {}", self.staging.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Gateway writing the pass name instead of an image
    #[derive(Default)]
    struct MarkerGateway {
        calls: Mutex<Vec<(String, Pass)>>,
    }

    impl FaultGateway for MarkerGateway {
        fn inject(&self, source: &Path, destination: &Path, _: &FaultSpec, pass: Pass) -> Result<()> {
            if !source.exists() {
                return Err(InjectionError::io(
                    source,
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
            fs::write(destination, format!("{:?}", pass)).map_err(|e| InjectionError::io(destination, e))?;
            let name = source.file_name().unwrap().to_string_lossy().into_owned();
            self.calls.lock().unwrap().push((name, pass));
            Ok(())
        }
    }

    fn job(dir: &Path, name: &str, pass: Pass) -> WriteJob {
        WriteJob {
            name: name.to_string(),
            source: dir.join(name),
            destination: dir.join(format!("{name}.out")),
            spec: FaultSpec::normalize("Erosion", 50).unwrap(),
            pass,
        }
    }

    #[test]
    fn zero_threads_are_refused() {
        let gateway: Arc<dyn FaultGateway> = Arc::new(MarkerGateway::default());
        assert!(matches!(
            WriteThread::with_threads(0, gateway),
            Err(InjectionError::WorkerPool(_))
        ));
    }

    #[test]
    fn batch_runs_every_job() {
        let dir = TempDir::new().unwrap();
        let names: Vec<String> = (0..20).map(|i| format!("img{i}")).collect();
        for name in &names {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let gateway = Arc::new(MarkerGateway::default());
        let pool = WriteThread::with_threads(4, gateway.clone()).unwrap();

        let jobs = names.iter().map(|n| job(dir.path(), n, Pass::Baseline)).collect();
        assert_eq!(20, pool.run_batch(jobs).unwrap());
        assert_eq!(20, gateway.calls.lock().unwrap().len());
    }

    #[test]
    fn batch_reports_failure_after_draining() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), b"x").unwrap();
        let gateway = Arc::new(MarkerGateway::default());
        let pool = WriteThread::with_threads(2, gateway.clone()).unwrap();

        let jobs = vec![
            job(dir.path(), "a", Pass::Fault),
            job(dir.path(), "missing", Pass::Fault),
        ];
        assert!(matches!(
            pool.run_batch(jobs),
            Err(InjectionError::IOFailure { .. })
        ));
        assert_eq!(1, gateway.calls.lock().unwrap().len());
    }

    #[test]
    fn staging_commit_moves_files() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("out");
        let staging = StagingArea::create(&destination).unwrap();
        fs::write(staging.path().join("a.png"), b"a").unwrap();
        fs::write(staging.path().join("b.png"), b"b").unwrap();

        assert_eq!(2, staging.commit().unwrap());
        assert!(destination.join("a.png").exists());
        assert!(!destination.join(STAGING_DIR).exists());
    }

    #[test]
    fn dropped_staging_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("out");
        {
            let staging = StagingArea::create(&destination).unwrap();
            fs::write(staging.path().join("a.png"), b"a").unwrap();
        }
        assert_eq!(0, fs::read_dir(&destination).unwrap().count());
    }
}
