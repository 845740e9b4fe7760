use super::{FaultKind, FaultSpec, FaultTransform};
use image::{DynamicImage, GrayImage};
use imageproc::noise::{gaussian_noise, salt_and_pepper_noise};
use log::warn;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp, Poisson};

/// Noise faults for time-of-flight images. Everything this family writes is
/// 8 bit grayscale.
///
/// * Salt&Pepper: each pixel replaced by black or white with probability `rate`
/// * Gaussian: additive, standard deviation `rate * 255`
/// * Poisson: random signed Poisson sample with lambda `rate * 100`
/// * Laplace: additive, scale `rate * 255`
#[derive(Clone, Copy, Debug)]
pub struct Noise;

impl FaultTransform for Noise {
    fn apply(&self, image: DynamicImage, spec: &FaultSpec, seed: u64) -> DynamicImage {
        let gray = image.to_luma8();
        let noisy = match spec.kind {
            FaultKind::SaltPepper => salt_and_pepper_noise(&gray, spec.intensity(), seed),
            FaultKind::Gaussian => gaussian_noise(&gray, 0.0, spec.intensity() * 255.0, seed),
            FaultKind::Poisson => poisson_noise(&gray, spec.intensity(), seed),
            FaultKind::Laplace => laplace_noise(&gray, spec.intensity() * 255.0, seed),
            // Not a noise fault, leave untouched
            _ => gray,
        };
        DynamicImage::ImageLuma8(noisy)
    }

    fn output_layout(&self, image: DynamicImage) -> DynamicImage {
        DynamicImage::ImageLuma8(image.to_luma8())
    }
}

fn add_noise<F>(image: &GrayImage, seed: u64, mut sample: F) -> GrayImage
where
    F: FnMut(&mut ChaCha8Rng) -> f64,
{
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let value = pixel.0[0] as f64 + sample(&mut rng);
        pixel.0[0] = value.round().clamp(0.0, 255.0) as u8;
    }
    out
}

fn poisson_noise(image: &GrayImage, lambda: f64, seed: u64) -> GrayImage {
    let poisson = match Poisson::new(lambda) {
        Ok(poisson) => poisson,
        Err(e) => {
            warn!("Poisson noise with lambda {} not possible: {}", lambda, e);
            return image.clone();
        }
    };
    add_noise(image, seed, |rng| {
        let magnitude: f64 = poisson.sample(rng);
        if rng.gen::<bool>() {
            magnitude
        } else {
            -magnitude
        }
    })
}

/// Laplace samples as the difference of two exponential samples of rate `1 / scale`.
fn laplace_noise(image: &GrayImage, scale: f64, seed: u64) -> GrayImage {
    let exp = match Exp::new(1.0 / scale) {
        Ok(exp) => exp,
        Err(e) => {
            warn!("Laplace noise with scale {} not possible: {}", scale, e);
            return image.clone();
        }
    };
    add_noise(image, seed, |rng| exp.sample(rng) - exp.sample(rng))
}
