use crate::error::{InjectionError, Result};
use crate::faults::FaultSpec;
use log::debug;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Kind of write performed for one image.
pub enum Pass {
    /// Unmodified copy, re-encoded the way the fault family saves its output
    Baseline,
    /// Copy with the fault applied
    Fault,
}

/// Trait for the per image read, transform and write step
pub trait FaultGateway: Send + Sync {
    /// Read `source`, apply `spec` if `pass` is `Pass::Fault`, and write the
    /// result to `destination`.
    fn inject(&self, source: &Path, destination: &Path, spec: &FaultSpec, pass: Pass)
        -> Result<()>;
}

/// Gateway decoding and encoding image files with the `image` crate.
///
/// Output format follows the destination extension. Noise faults are seeded
/// from `seed` and the file name so a rerun with the same seed writes the
/// same pixels.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageGateway {
    seed: u64,
}

impl ImageGateway {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn image_seed(&self, source: &Path) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        source.file_name().hash(&mut hasher);
        hasher.finish()
    }
}

impl FaultGateway for ImageGateway {
    fn inject(
        &self,
        source: &Path,
        destination: &Path,
        spec: &FaultSpec,
        pass: Pass,
    ) -> Result<()> {
        let image = image::open(source).map_err(|e| InjectionError::Image {
            path: source.to_path_buf(),
            source: e,
        })?;

        let transform = spec.transform();
        let image = match pass {
            Pass::Baseline => image,
            Pass::Fault => transform.apply(image, spec, self.image_seed(source)),
        };

        transform
            .output_layout(image)
            .save(destination)
            .map_err(|e| InjectionError::Image {
                path: destination.to_path_buf(),
                source: e,
            })?;
        debug!("{:?} {} -> {}", pass, source.display(), destination.display());
        Ok(())
    }
}
