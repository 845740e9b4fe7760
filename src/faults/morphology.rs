use super::{eight_bit_layout, FaultKind, FaultSpec, FaultTransform};
use image::{DynamicImage, ImageBuffer, Pixel};
use std::ops::Range;

/// Erosion and dilation are repeated this many times.
const ITERATIONS: usize = 5;

/// Morphology faults with a k x k box structuring element anchored at its centre.
///
/// Erosion and dilation run `ITERATIONS` times, gradient is `dilate - erode`,
/// open and close run once. Colour layout of the input is kept.
#[derive(Clone, Copy, Debug)]
pub struct Morphology;

impl FaultTransform for Morphology {
    fn apply(&self, image: DynamicImage, spec: &FaultSpec, _seed: u64) -> DynamicImage {
        // FaultSpec::new refuses zero sized kernels
        let k = spec.kernel_size().unwrap_or(1).max(1);
        match eight_bit_layout(image) {
            DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(morph(&gray, spec.kind, k)),
            DynamicImage::ImageRgba8(rgba) => {
                DynamicImage::ImageRgba8(morph(&rgba, spec.kind, k))
            }
            DynamicImage::ImageRgb8(rgb) => DynamicImage::ImageRgb8(morph(&rgb, spec.kind, k)),
            other => DynamicImage::ImageRgb8(morph(&other.to_rgb8(), spec.kind, k)),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Extremum {
    Min,
    Max,
}

impl Extremum {
    fn pick(self, a: u8, b: u8) -> u8 {
        match self {
            Extremum::Min => a.min(b),
            Extremum::Max => a.max(b),
        }
    }
}

type Buffer<P> = ImageBuffer<P, Vec<u8>>;

fn morph<P>(image: &Buffer<P>, kind: FaultKind, k: u32) -> Buffer<P>
where
    P: Pixel<Subpixel = u8>,
{
    match kind {
        FaultKind::Erosion => repeat(image, ITERATIONS, |img| erode(img, k)),
        FaultKind::Dilation => repeat(image, ITERATIONS, |img| dilate(img, k)),
        FaultKind::Open => dilate(&erode(image, k), k),
        FaultKind::Close => erode(&dilate(image, k), k),
        FaultKind::Gradient => {
            let mut out = dilate(image, k);
            let eroded = erode(image, k);
            for (value, low) in out.iter_mut().zip(eroded.iter()) {
                *value = value.saturating_sub(*low);
            }
            out
        }
        _ => image.clone(),
    }
}

fn repeat<P, F>(image: &Buffer<P>, times: usize, op: F) -> Buffer<P>
where
    P: Pixel<Subpixel = u8>,
    F: Fn(&Buffer<P>) -> Buffer<P>,
{
    (0..times).fold(image.clone(), |img, _| op(&img))
}

pub(crate) fn erode<P>(image: &Buffer<P>, k: u32) -> Buffer<P>
where
    P: Pixel<Subpixel = u8>,
{
    let rows = box_pass(image, k, Extremum::Min, true);
    box_pass(&rows, k, Extremum::Min, false)
}

pub(crate) fn dilate<P>(image: &Buffer<P>, k: u32) -> Buffer<P>
where
    P: Pixel<Subpixel = u8>,
{
    let rows = box_pass(image, k, Extremum::Max, true);
    box_pass(&rows, k, Extremum::Max, false)
}

/// Positions covered by a k wide window anchored at `k / 2`, clipped to the image.
fn window(pos: u32, k: u32, len: u32) -> Range<u32> {
    let anchor = k / 2;
    pos.saturating_sub(anchor)..(pos + (k - anchor)).min(len)
}

/// One separable pass of a box min/max filter along rows or columns.
fn box_pass<P>(image: &Buffer<P>, k: u32, op: Extremum, horizontal: bool) -> Buffer<P>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    let channels = P::CHANNEL_COUNT as usize;
    let mut out = image.clone();

    for y in 0..height {
        for x in 0..width {
            let range = if horizontal {
                window(x, k, width)
            } else {
                window(y, k, height)
            };
            let target = out.get_pixel_mut(x, y).channels_mut();
            for (c, value) in target.iter_mut().enumerate().take(channels) {
                *value = range
                    .clone()
                    .map(|i| {
                        let pixel = if horizontal {
                            image.get_pixel(i, y)
                        } else {
                            image.get_pixel(x, i)
                        };
                        pixel.channels()[c]
                    })
                    .fold(*value, |acc, v| op.pick(acc, v));
            }
        }
    }
    out
}
