use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

// An L1 ball of radius k equals k passes of the 3x3 cross.
fn radius(iterations: u32) -> u8 {
    u8::try_from(iterations).unwrap_or(u8::MAX)
}

/// Clears every pixel within `iterations` cross steps of the background.
/// Pixels outside the image do not count as background.
pub fn erode(mask: &GrayImage, iterations: u32) -> GrayImage {
    morphology::erode(mask, Norm::L1, radius(iterations))
}

/// Sets every pixel within `iterations` cross steps of the foreground
pub fn dilate(mask: &GrayImage, iterations: u32) -> GrayImage {
    morphology::dilate(mask, Norm::L1, radius(iterations))
}

/// Erode then dilate, removing specks smaller than the kernel
pub fn open(mask: &GrayImage, iterations: u32) -> GrayImage {
    morphology::open(mask, Norm::L1, radius(iterations))
}

/// Sum of all mask intensities
pub fn mask_sum(mask: &GrayImage) -> u64 {
    mask.as_raw().iter().map(|&v| v as u64).sum()
}
