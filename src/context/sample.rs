//! Placeholder sample input
//!
//! Written when no sample image is configured. The entry point opens it
//! with an image decoder that sniffs content, so a binary PPM under the
//! `.jpg` name decodes fine.

pub const SAMPLE_WIDTH: usize = 224;
pub const SAMPLE_HEIGHT: usize = 224;

const BLUE: [u8; 3] = [0, 0, 255];

/// Solid blue 224x224 binary PPM (P6).
pub fn placeholder_image() -> Vec<u8> {
    let header = format!("P6\n{} {}\n255\n", SAMPLE_WIDTH, SAMPLE_HEIGHT);
    let mut data = Vec::with_capacity(header.len() + SAMPLE_WIDTH * SAMPLE_HEIGHT * 3);
    data.extend_from_slice(header.as_bytes());
    for _ in 0..SAMPLE_WIDTH * SAMPLE_HEIGHT {
        data.extend_from_slice(&BLUE);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_layout() {
        let data = placeholder_image();
        let header = b"P6\n224 224\n255\n";
        assert!(data.starts_with(header));
        assert_eq!(data.len(), header.len() + 224 * 224 * 3);
        assert_eq!(&data[header.len()..header.len() + 3], &[0, 0, 255]);
        assert_eq!(&data[data.len() - 3..], &[0, 0, 255]);
    }
}
