//! Raster transforms.

use std::path::Path;

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, ImageResult, RgbaImage};

use super::options::{FitMode, NormalizedOptions, Rgb};
use crate::error::{FileError, FileResult};

const FILTER: FilterType = FilterType::Lanczos3;

/// Renders a source image into a derived variant.
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    /// Reads `source`, applies `options`, and writes `target` as `format`.
    async fn transform(
        &self,
        source: &Path,
        target: &Path,
        options: &NormalizedOptions,
        format: ImageFormat,
    ) -> FileResult<()>;
}

/// Decodes, auto-rotates, resizes and re-encodes with the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterTransformer;

#[async_trait]
impl ImageTransformer for RasterTransformer {
    async fn transform(
        &self,
        source: &Path,
        target: &Path,
        options: &NormalizedOptions,
        format: ImageFormat,
    ) -> FileResult<()> {
        let (source, target, options) = (source.to_path_buf(), target.to_path_buf(), *options);
        tokio::task::spawn_blocking(move || render(&source, &target, &options, format))
            .await
            .map_err(|e| FileError::backend(Some("ImageProcessing".into()), e.to_string()))?
            .map_err(|e| FileError::backend(Some("ImageProcessing".into()), e.to_string()))
    }
}

fn render(
    source: &Path,
    target: &Path,
    options: &NormalizedOptions,
    format: ImageFormat,
) -> ImageResult<()> {
    let mut decoder = ImageReader::open(source)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);

    if options.needs_resize() {
        img = resize(img, options);
    }

    encodable(img, format).save_with_format(target, format)
}

/// Applies size, fit and background.
pub(crate) fn resize(img: DynamicImage, options: &NormalizedOptions) -> DynamicImage {
    let Some((width, height)) = target_box(img.width(), img.height(), options) else {
        return match options.background {
            Some(bg) => flatten(&img, bg),
            None => img,
        };
    };

    match options.fit {
        FitMode::Cover => img.resize_to_fill(width, height, FILTER),
        FitMode::Fill => img.resize_exact(width, height, FILTER),
        FitMode::Inside => img.resize(width, height, FILTER),
        FitMode::Outside => {
            let scale = f64::max(
                f64::from(width) / f64::from(img.width()),
                f64::from(height) / f64::from(img.height()),
            );
            let w = (f64::from(img.width()) * scale).round().max(1.0) as u32;
            let h = (f64::from(img.height()) * scale).round().max(1.0) as u32;
            img.resize_exact(w, h, FILTER)
        }
        FitMode::Contain => {
            let inner = img.resize(width, height, FILTER);
            let fill = options.background.map_or([0, 0, 0, 0], Rgb::to_rgba);
            let mut canvas = RgbaImage::from_pixel(width, height, image::Rgba(fill));
            let x = i64::from(width.saturating_sub(inner.width()) / 2);
            let y = i64::from(height.saturating_sub(inner.height()) / 2);
            imageops::overlay(&mut canvas, &inner.to_rgba8(), x, y);
            DynamicImage::ImageRgba8(canvas)
        }
    }
}

/// Requested box. A missing side follows the source aspect ratio; `None`
/// when no side was requested.
fn target_box(src_w: u32, src_h: u32, options: &NormalizedOptions) -> Option<(u32, u32)> {
    let scaled = |num: u32, a: u32, b: u32| -> u32 {
        ((f64::from(num) * f64::from(a) / f64::from(b.max(1))).round() as u32).max(1)
    };
    match (options.width, options.height) {
        (Some(w), Some(h)) => Some((w, h)),
        (Some(w), None) => Some((w, scaled(w, src_h, src_w))),
        (None, Some(h)) => Some((scaled(h, src_w, src_h), h)),
        (None, None) => None,
    }
}

fn flatten(img: &DynamicImage, bg: Rgb) -> DynamicImage {
    let mut canvas = RgbaImage::from_pixel(img.width(), img.height(), image::Rgba(bg.to_rgba()));
    imageops::overlay(&mut canvas, &img.to_rgba8(), 0, 0);
    DynamicImage::ImageRgba8(canvas)
}

/// Converts to a pixel layout the target encoder accepts.
fn encodable(img: DynamicImage, format: ImageFormat) -> DynamicImage {
    match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        ImageFormat::Gif | ImageFormat::WebP | ImageFormat::Bmp => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        _ => match img {
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                DynamicImage::ImageRgba8(img.to_rgba8())
            }
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use rstest::rstest;

    fn opts(width: Option<u32>, height: Option<u32>, fit: FitMode) -> NormalizedOptions {
        NormalizedOptions {
            width,
            height,
            background: None,
            fit,
        }
    }

    fn source(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, image::Rgba([200, 10, 10, 255])))
    }

    #[rstest]
    #[case(FitMode::Contain, (5, 5))]
    #[case(FitMode::Cover, (5, 5))]
    #[case(FitMode::Fill, (5, 5))]
    #[case(FitMode::Inside, (5, 3))]
    #[case(FitMode::Outside, (8, 5))]
    fn test_fit_dimensions(#[case] fit: FitMode, #[case] expected: (u32, u32)) {
        let out = resize(source(40, 25), &opts(Some(5), Some(5), fit));
        assert_eq!(out.dimensions(), expected);
    }

    #[test]
    fn test_single_side_keeps_aspect() {
        let out = resize(source(40, 20), &opts(Some(10), None, FitMode::Contain));
        assert_eq!(out.dimensions(), (10, 5));
        let out = resize(source(40, 20), &opts(None, Some(10), FitMode::Fill));
        assert_eq!(out.dimensions(), (20, 10));
    }

    #[test]
    fn test_contain_letterboxes_with_background() {
        let mut o = opts(Some(10), Some(10), FitMode::Contain);
        o.background = Rgb::parse("00ff00");
        let out = resize(source(20, 10), &o).to_rgba8();
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.get_pixel(0, 0).0, [0, 255, 0, 255]);
        assert_eq!(out.get_pixel(5, 5).0, [200, 10, 10, 255]);
    }

    #[test]
    fn test_contain_without_background_is_transparent() {
        let out = resize(source(20, 10), &opts(Some(10), Some(10), FitMode::Contain)).to_rgba8();
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn test_background_only_flattens_in_place() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, image::Rgba([0, 0, 0, 0])));
        let o = NormalizedOptions {
            width: None,
            height: None,
            background: Rgb::parse("#0000ff"),
            fit: FitMode::Contain,
        };
        let out = resize(img, &o).to_rgba8();
        assert_eq!(out.dimensions(), (4, 3));
        assert_eq!(out.get_pixel(1, 1).0, [0, 0, 255, 255]);
    }

    #[tokio::test]
    async fn test_transform_writes_requested_format() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.png");
        source(10, 10).save_with_format(&src, ImageFormat::Png).unwrap();
        let dst = dir.path().join("out.jpg");

        RasterTransformer
            .transform(&src, &dst, &opts(Some(5), Some(5), FitMode::Contain), ImageFormat::Jpeg)
            .await
            .unwrap();

        let out = image::open(&dst).unwrap();
        assert_eq!(out.dimensions(), (5, 5));
        assert_eq!(
            ImageFormat::from_path(&dst).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[tokio::test]
    async fn test_transform_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.png");
        tokio::fs::write(&src, b"not an image").await.unwrap();

        let err = RasterTransformer
            .transform(&src, &dir.path().join("out.png"), &opts(None, None, FitMode::Contain), ImageFormat::Png)
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::StorageBackend { .. }));
    }
}
