use crate::error::PredictError;
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, Ix4};
use std::path::Path;

pub const INPUT_SIZE: u32 = 224;

/// Per-channel statistics of the distribution the backbone was pretrained on.
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub fn load_image(path: &Path) -> Result<DynamicImage, PredictError> {
    let image_reader = image::ImageReader::open(path)
        .map_err(|e| PredictError::Decode(format!("Error opening {:?}: {}", path, e)))?
        .with_guessed_format()
        .map_err(|e| PredictError::Decode(format!("Error reading {:?}: {}", path, e)))?;

    image_reader
        .decode()
        .map_err(|e| PredictError::Decode(format!("Error decoding image: {}", e)))
}

/// RGB, 224x224, scaled to [0,1] and normalized, laid out NCHW.
pub fn to_input_tensor(image: &DynamicImage) -> Array<f32, Ix4> {
    let size = INPUT_SIZE as usize;
    let img = image
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();

    let mut input = Array::zeros((1, 3, size, size));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        for (channel, value) in pixel.0.iter().enumerate() {
            let scaled = (*value as f32) / 255.;
            input[[0, channel, y, x]] = (scaled - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
        }
    }

    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};
    use std::io::Cursor;

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    #[test]
    fn test_to_input_tensor() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 60, Rgb([255, 0, 0]));
        let image = image::load_from_memory(&encode_png(DynamicImage::ImageRgb8(img))).unwrap();

        let input = to_input_tensor(&image);

        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        let red = (1.0 - CHANNEL_MEAN[0]) / CHANNEL_STD[0];
        let green = (0.0 - CHANNEL_MEAN[1]) / CHANNEL_STD[1];
        let blue = (0.0 - CHANNEL_MEAN[2]) / CHANNEL_STD[2];
        assert!((input[[0, 0, 10, 10]] - red).abs() < 1e-5);
        assert!((input[[0, 1, 200, 30]] - green).abs() < 1e-5);
        assert!((input[[0, 2, 223, 223]] - blue).abs() < 1e-5);
    }

    #[test]
    fn test_grayscale_is_expanded_to_three_channels() {
        let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_pixel(32, 32, Luma([128]));
        let input = to_input_tensor(&DynamicImage::ImageLuma8(img));

        let value = 128.0 / 255.0;
        for channel in 0..3 {
            let expected = (value - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel];
            assert!((input[[0, channel, 100, 100]] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_load_image_rejects_text() -> Result<(), Box<dyn std::error::Error>> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.jpg");
        std::fs::write(&path, b"this is not an image")?;

        let result = load_image(&path);
        assert!(matches!(result, Err(PredictError::Decode(_))));
        Ok(())
    }

    #[test]
    fn test_load_image_missing_file() {
        let result = load_image(Path::new("./no/such/scan.png"));
        assert!(matches!(result, Err(PredictError::Decode(_))));
    }
}
