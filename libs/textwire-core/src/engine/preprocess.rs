use image::{DynamicImage, GrayImage, Luma};

/// Denoise and binarization only run on images strictly larger than this
/// in both dimensions; tiny glyphs lose too much detail otherwise.
const MIN_FILTER_DIMENSION: u32 = 100;
const BINARY_THRESHOLD: u8 = 128;

/// Deterministic cleanup applied before recognition: 8-bit grayscale, then
/// for large enough images a 3x3 median denoise and a binary threshold at
/// mid-intensity.
pub fn clean_image(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();

    if width <= MIN_FILTER_DIMENSION || height <= MIN_FILTER_DIMENSION {
        return gray;
    }

    let denoised = median_filter_3x3(&gray);
    threshold(&denoised, BINARY_THRESHOLD)
}

fn median_filter_3x3(src: &GrayImage) -> GrayImage {
    let (width, height) = src.dimensions();

    GrayImage::from_fn(width, height, |x, y| {
        let mut window = [0u8; 9];
        let mut count = 0usize;

        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64 {
                    window[count] = src.get_pixel(nx as u32, ny as u32)[0];
                    count += 1;
                }
            }
        }

        let window = &mut window[..count];
        window.sort_unstable();
        Luma([window[count / 2]])
    })
}

fn threshold(src: &GrayImage, cutoff: u8) -> GrayImage {
    GrayImage::from_fn(src.width(), src.height(), |x, y| {
        if src.get_pixel(x, y)[0] < cutoff {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}
