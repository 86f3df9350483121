//! Helpers shared by the integration tests.

use std::io::Cursor;

use image::{ImageFormat, RgbImage};

/// Encode a PNG whose pixels are pseudo-random so it does not compress far
/// below `3 * width * height` bytes.
pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9 ^ width.wrapping_mul(31) ^ height;
    let img = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        image::Rgb([r, g, b])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
