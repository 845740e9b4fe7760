use crate::error::{InjectionError, Result};
use clap::{builder::PossibleValue, ValueEnum};
use image::DynamicImage;
use std::fmt::{self, Debug, Display};

pub mod blur;
pub mod morphology;
pub mod noise;

pub use blur::MotionBlur;
pub use morphology::Morphology;
pub use noise::Noise;

/// Morphology and blur kernels are `floor(rate * 20)` wide.
const KERNEL_SCALE: u32 = 20;

/// Transform implementation per fault family
const TRANSFORMS: [&dyn FaultTransform; 3] = [&Noise, &Morphology, &MotionBlur];

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
/// Synthetic image faults which can be injected.
pub enum FaultKind {
    SaltPepper,
    Gaussian,
    Poisson,
    Laplace,
    Erosion,
    Dilation,
    Gradient,
    Open,
    Close,
    MotionBlur,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
/// Groups of faults sharing one transform implementation.
pub enum FaultFamily {
    /// Per-pixel noise on single channel (time-of-flight) images.
    Noise,
    /// Box structuring element operations.
    Morphology,
    /// Linear motion blur.
    Blur,
}

impl FaultKind {
    /// Parse a fault from its display name or its short code, ignoring case.
    pub fn from_name(input: &str) -> Result<Self> {
        let fault = match input.trim().to_lowercase().as_str() {
            "salt&pepper" | "salt-pepper" | "saltpepper" | "s" => FaultKind::SaltPepper,
            "gaussian" | "g" => FaultKind::Gaussian,
            "poisson" | "p" => FaultKind::Poisson,
            "laplace" | "laplacian" | "l" => FaultKind::Laplace,
            "erosion" | "e" => FaultKind::Erosion,
            "dilation" | "d" => FaultKind::Dilation,
            "gradient" | "gr" => FaultKind::Gradient,
            "open" | "o" => FaultKind::Open,
            "close" | "c" => FaultKind::Close,
            "motion-blur" | "motionblur" | "m" => FaultKind::MotionBlur,
            _ => return Err(InjectionError::UnknownFaultKind(input.to_string())),
        };
        Ok(fault)
    }

    /// Name used in reports and ledger records
    pub fn name(&self) -> &'static str {
        match self {
            FaultKind::SaltPepper => "Salt&Pepper",
            FaultKind::Gaussian => "Gaussian",
            FaultKind::Poisson => "Poisson",
            FaultKind::Laplace => "Laplace",
            FaultKind::Erosion => "Erosion",
            FaultKind::Dilation => "Dilation",
            FaultKind::Gradient => "Gradient",
            FaultKind::Open => "Open",
            FaultKind::Close => "Close",
            FaultKind::MotionBlur => "Motion-blur",
        }
    }

    fn code(&self) -> &'static str {
        match self {
            FaultKind::SaltPepper => "s",
            FaultKind::Gaussian => "g",
            FaultKind::Poisson => "p",
            FaultKind::Laplace => "l",
            FaultKind::Erosion => "e",
            FaultKind::Dilation => "d",
            FaultKind::Gradient => "gr",
            FaultKind::Open => "o",
            FaultKind::Close => "c",
            FaultKind::MotionBlur => "m",
        }
    }

    pub fn family(&self) -> FaultFamily {
        match self {
            FaultKind::SaltPepper | FaultKind::Gaussian | FaultKind::Poisson | FaultKind::Laplace => {
                FaultFamily::Noise
            }
            FaultKind::Erosion
            | FaultKind::Dilation
            | FaultKind::Gradient
            | FaultKind::Open
            | FaultKind::Close => FaultFamily::Morphology,
            FaultKind::MotionBlur => FaultFamily::Blur,
        }
    }
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ValueEnum for FaultKind {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            FaultKind::SaltPepper,
            FaultKind::Gaussian,
            FaultKind::Poisson,
            FaultKind::Laplace,
            FaultKind::Erosion,
            FaultKind::Dilation,
            FaultKind::Gradient,
            FaultKind::Open,
            FaultKind::Close,
            FaultKind::MotionBlur,
        ]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(PossibleValue::new(self.name()).alias(self.code()))
    }
}

impl FaultFamily {
    /// Get the transform implementing this family
    pub fn transform(&self) -> &'static dyn FaultTransform {
        match self {
            FaultFamily::Noise => TRANSFORMS[0],
            FaultFamily::Morphology => TRANSFORMS[1],
            FaultFamily::Blur => TRANSFORMS[2],
        }
    }
}

/// Trait for fault transform functions, one implementation per family
pub trait FaultTransform: Send + Sync + Debug {
    /// Apply `spec` to `image`. `seed` drives any noise sampling.
    fn apply(&self, image: DynamicImage, spec: &FaultSpec, seed: u64) -> DynamicImage;

    /// Convert an image into the layout this family saves, on both the
    /// baseline and the fault pass.
    fn output_layout(&self, image: DynamicImage) -> DynamicImage {
        eight_bit_layout(image)
    }
}

/// Bring `image` to the 8 bit layout closest to its own.
///
/// Gray, gray with alpha and 16 bit gray (depth maps) become `Luma8`, 16 bit
/// and float RGBA become `Rgba8`, any other layout becomes `Rgb8`. `Luma8`,
/// `Rgb8` and `Rgba8` pass through unchanged.
pub(crate) fn eight_bit_layout(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            image
        }
        DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        DynamicImage::ImageRgba16(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(image.to_rgba8())
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// A fault kind together with its user chosen percentage, normalized into
/// the units the transforms need.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaultSpec {
    pub kind: FaultKind,
    /// User-facing percentage in 1..=100
    pub percentage: u32,
    /// `percentage / 100`
    pub rate: f64,
}

impl FaultSpec {
    /// Normalize a fault name and percentage.
    ///
    /// # Errors
    ///
    /// * `UnknownFaultKind` if the name matches no fault.
    /// * `InvalidPercentage` if `percentage` is outside 1..=100.
    /// * `DegenerateKernel` if a morphology or blur fault would get a 0x0 kernel.
    pub fn normalize(fault_name: &str, percentage: u32) -> Result<Self> {
        let kind = FaultKind::from_name(fault_name)?;
        Self::new(kind, percentage)
    }

    pub fn new(kind: FaultKind, percentage: u32) -> Result<Self> {
        if !(1..=100).contains(&percentage) {
            return Err(InjectionError::InvalidPercentage(percentage));
        }
        let spec = Self {
            kind,
            percentage,
            rate: percentage as f64 / 100.0,
        };
        if spec.kind.family() != FaultFamily::Noise && spec.raw_kernel_size() == 0 {
            return Err(InjectionError::DegenerateKernel {
                fault: kind.name().to_string(),
                percentage,
            });
        }
        Ok(spec)
    }

    /// Integer form of `floor(rate * 20)`, free of float rounding at multiples of 5%.
    fn raw_kernel_size(&self) -> u32 {
        self.percentage * KERNEL_SCALE / 100
    }

    /// Intensity handed to noise transforms. Poisson takes its lambda in percent.
    pub fn intensity(&self) -> f64 {
        match self.kind {
            FaultKind::Poisson => self.rate * 100.0,
            _ => self.rate,
        }
    }

    /// Side length of the square structuring element or blur kernel.
    /// `None` for noise faults.
    pub fn kernel_size(&self) -> Option<u32> {
        match self.kind.family() {
            FaultFamily::Noise => None,
            _ => Some(self.raw_kernel_size()),
        }
    }

    pub fn transform(&self) -> &'static dyn FaultTransform {
        self.kind.family().transform()
    }
}
