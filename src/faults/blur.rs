use super::{eight_bit_layout, FaultSpec, FaultTransform};
use image::DynamicImage;
use imageproc::filter::horizontal_filter;

/// Horizontal motion blur: a k tap averaging kernel along each row.
#[derive(Clone, Copy, Debug)]
pub struct MotionBlur;

impl MotionBlur {
    fn kernel(k: u32) -> Vec<f32> {
        let k = k.max(1);
        vec![1.0 / k as f32; k as usize]
    }
}

impl FaultTransform for MotionBlur {
    fn apply(&self, image: DynamicImage, spec: &FaultSpec, _seed: u64) -> DynamicImage {
        let kernel = Self::kernel(spec.kernel_size().unwrap_or(1));
        match eight_bit_layout(image) {
            DynamicImage::ImageLuma8(gray) => {
                DynamicImage::ImageLuma8(horizontal_filter(&gray, &kernel))
            }
            DynamicImage::ImageRgba8(rgba) => {
                DynamicImage::ImageRgba8(horizontal_filter(&rgba, &kernel))
            }
            other => DynamicImage::ImageRgb8(horizontal_filter(&other.to_rgb8(), &kernel)),
        }
    }
}
