use std::io::Cursor;

use anyhow::{bail, Context};
use image::{codecs::bmp::BmpEncoder, ExtendedColorType, ImageFormat, Rgba, RgbaImage};

use crate::bitmap::{Bitmap, PixelFormat};

/// All offscreen rendering happens at this DPI, so one unit is one pixel.
pub const RENDER_DPI: f64 = 96.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Shrinks every edge by `by`, never below zero size.
    pub fn inset(&self, by: u32) -> Self {
        Self::new(
            self.x + by as i32,
            self.y + by as i32,
            self.width.saturating_sub(by * 2),
            self.height.saturating_sub(by * 2),
        )
    }
}

/// A presentation object that can lay itself out and draw into an offscreen
/// target. Built fresh for every render.
pub trait RenderSurface {
    /// Finalizes a surface that never joined a live window tree.
    fn initialize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn measure(&mut self, available: Size) -> anyhow::Result<Size>;

    fn arrange(&mut self, bounds: Rect) -> anyhow::Result<()>;

    /// Applies any pending visual updates before drawing.
    fn update_layout(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn draw(&self, target: &mut DrawTarget) -> anyhow::Result<()>;
}

/// Straight-alpha RGBA canvas at a fixed DPI.
pub struct DrawTarget {
    image: RgbaImage,
    dpi: f64,
}

impl DrawTarget {
    pub fn new(size: Size, dpi: f64) -> Self {
        Self {
            image: RgbaImage::new(size.width, size.height),
            dpi,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    pub fn dpi(&self) -> f64 {
        self.dpi
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        for px in self.image.pixels_mut() {
            *px = Rgba(color);
        }
    }

    /// Source-over fill, clipped to the target.
    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 4]) {
        let (w, h) = (self.image.width() as i64, self.image.height() as i64);
        let x0 = (rect.x as i64).clamp(0, w);
        let y0 = (rect.y as i64).clamp(0, h);
        let x1 = (rect.x as i64 + rect.width as i64).clamp(0, w);
        let y1 = (rect.y as i64 + rect.height as i64).clamp(0, h);

        for y in y0..y1 {
            for x in x0..x1 {
                let dst = self.image.get_pixel_mut(x as u32, y as u32);
                *dst = Rgba(blend_over(color, dst.0));
            }
        }
    }

    /// Outline of `thickness` pixels drawn inside `rect`.
    pub fn stroke_rect(&mut self, rect: Rect, thickness: u32, color: [u8; 4]) {
        let t = thickness.min(rect.width / 2).min(rect.height / 2);
        if t == 0 {
            return;
        }
        let bottom = rect.y + rect.height as i32 - t as i32;
        let right = rect.x + rect.width as i32 - t as i32;
        let inner_h = rect.height - t * 2;

        self.fill_rect(Rect::new(rect.x, rect.y, rect.width, t), color);
        self.fill_rect(Rect::new(rect.x, bottom, rect.width, t), color);
        self.fill_rect(Rect::new(rect.x, rect.y + t as i32, t, inner_h), color);
        self.fill_rect(Rect::new(right, rect.y + t as i32, t, inner_h), color);
    }

    /// Copies `source` with its top-left corner at `origin`, clipped.
    pub fn blit(&mut self, source: &RgbaImage, origin: Point) {
        for (sx, sy, px) in source.enumerate_pixels() {
            let x = origin.x as i64 + sx as i64;
            let y = origin.y as i64 + sy as i64;
            if x < 0 || y < 0 || x >= self.image.width() as i64 || y >= self.image.height() as i64 {
                continue;
            }
            self.image.put_pixel(x as u32, y as u32, *px);
        }
    }

    fn into_format(mut self, format: PixelFormat) -> RgbaImage {
        for px in self.image.pixels_mut() {
            let [r, g, b, a] = px.0;
            let premul = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
            px.0 = match format {
                PixelFormat::Pbgra32 => [premul(r), premul(g), premul(b), a],
                PixelFormat::Bgr32 => [premul(r), premul(g), premul(b), 255],
            };
        }
        self.image
    }
}

fn blend_over(src: [u8; 4], dst: [u8; 4]) -> [u8; 4] {
    let sa = src[3] as u32;
    if sa == 255 {
        return src;
    }
    if sa == 0 {
        return dst;
    }

    let da = dst[3] as u32;
    let out_a = sa + da * (255 - sa) / 255;
    if out_a == 0 {
        return [0, 0, 0, 0];
    }

    let channel = |s: u8, d: u8| {
        let num = s as u32 * sa + d as u32 * da * (255 - sa) / 255;
        (num / out_a).min(255) as u8
    };

    [
        channel(src[0], dst[0]),
        channel(src[1], dst[1]),
        channel(src[2], dst[2]),
        out_a as u8,
    ]
}

/// Lays out `surface` at `target`, rasterizes it at [`RENDER_DPI`], and round
/// trips the pixels through a BMP stream into the returned bitmap.
pub fn render(
    surface: &mut dyn RenderSurface,
    target: Size,
    format: PixelFormat,
) -> anyhow::Result<Bitmap> {
    render_inner(surface, target, format)
        .with_context(|| format!("size: {target}, format: {format:?}"))
}

fn render_inner(
    surface: &mut dyn RenderSurface,
    target: Size,
    format: PixelFormat,
) -> anyhow::Result<Bitmap> {
    if target.is_empty() {
        bail!("render target must have a positive width and height");
    }

    surface.measure(target).context("measure failed")?;
    surface
        .arrange(Rect::from_size(target))
        .context("arrange failed")?;
    surface.update_layout().context("layout update failed")?;

    let mut draw_target = DrawTarget::new(target, RENDER_DPI);
    surface.draw(&mut draw_target).context("draw failed")?;
    let pixels = draw_target.into_format(format);

    let encoded = encode_bmp(&pixels)?;
    let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Bmp)
        .context("decoding bmp stream failed")?
        .into_rgba8();

    if decoded.width() != target.width || decoded.height() != target.height {
        bail!(
            "decoded bitmap is {}x{}, expected {}",
            decoded.width(),
            decoded.height(),
            target
        );
    }

    Ok(Bitmap::new(decoded, format))
}

fn encode_bmp(pixels: &RgbaImage) -> anyhow::Result<Vec<u8>> {
    let mut stream = Cursor::new(Vec::new());
    BmpEncoder::new(&mut stream)
        .encode(
            pixels.as_raw(),
            pixels.width(),
            pixels.height(),
            ExtendedColorType::Rgba8,
        )
        .context("encoding bmp stream failed")?;
    Ok(stream.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Solid {
        color: [u8; 4],
        measured: Option<Size>,
        arranged: Option<Rect>,
        refreshed: bool,
    }

    impl Solid {
        fn new(color: [u8; 4]) -> Self {
            Self {
                color,
                measured: None,
                arranged: None,
                refreshed: false,
            }
        }
    }

    impl RenderSurface for Solid {
        fn measure(&mut self, available: Size) -> anyhow::Result<Size> {
            self.measured = Some(available);
            Ok(available)
        }

        fn arrange(&mut self, bounds: Rect) -> anyhow::Result<()> {
            self.arranged = Some(bounds);
            Ok(())
        }

        fn update_layout(&mut self) -> anyhow::Result<()> {
            self.refreshed = true;
            Ok(())
        }

        fn draw(&self, target: &mut DrawTarget) -> anyhow::Result<()> {
            assert_eq!(target.dpi(), RENDER_DPI);
            target.clear(self.color);
            Ok(())
        }
    }

    struct Broken;

    impl RenderSurface for Broken {
        fn measure(&mut self, available: Size) -> anyhow::Result<Size> {
            Ok(available)
        }

        fn arrange(&mut self, _bounds: Rect) -> anyhow::Result<()> {
            Err(anyhow!("layout cycle"))
        }

        fn draw(&self, _target: &mut DrawTarget) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_render_lays_out_at_target_size() {
        let mut surface = Solid::new([200, 100, 50, 255]);
        let bitmap = render(&mut surface, Size::new(196, 106), PixelFormat::Bgr32).unwrap();

        assert_eq!(bitmap.size(), Size::new(196, 106));
        assert_eq!(surface.measured, Some(Size::new(196, 106)));
        assert_eq!(surface.arranged, Some(Rect::new(0, 0, 196, 106)));
        assert!(surface.refreshed);
        assert_eq!(bitmap.image().get_pixel(10, 10).0, [200, 100, 50, 255]);
    }

    #[test]
    fn test_opaque_format_drops_alpha() {
        let mut surface = Solid::new([200, 100, 50, 0]);
        let bitmap = render(&mut surface, Size::new(4, 4), PixelFormat::Bgr32).unwrap();
        assert_eq!(bitmap.image().get_pixel(0, 0).0[3], 255);
        assert_eq!(bitmap.format(), PixelFormat::Bgr32);
    }

    #[test]
    fn test_premultiplied_format_keeps_alpha() {
        let mut surface = Solid::new([200, 100, 50, 128]);
        let bitmap = render(&mut surface, Size::new(4, 4), PixelFormat::Pbgra32).unwrap();
        let px = bitmap.image().get_pixel(1, 1).0;
        assert_eq!(px[3], 128);
        assert_eq!(px[0], 100);
        assert_eq!(px[1], 50);
        assert_eq!(px[2], 25);
    }

    #[test]
    fn test_empty_target_is_rejected_with_size_context() {
        let mut surface = Solid::new([0, 0, 0, 255]);
        let err = render(&mut surface, Size::new(0, 106), PixelFormat::Bgr32).unwrap_err();
        assert!(format!("{err:#}").contains("size: 0x106"));
        assert!(surface.measured.is_none());
    }

    #[test]
    fn test_surface_errors_propagate_with_context() {
        let err = render(&mut Broken, Size::new(8, 8), PixelFormat::Pbgra32).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("arrange failed"));
        assert!(text.contains("layout cycle"));
        assert!(text.contains("8x8"));
    }

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut target = DrawTarget::new(Size::new(4, 4), RENDER_DPI);
        target.fill_rect(Rect::new(-2, -2, 4, 4), [255, 0, 0, 255]);
        assert_eq!(target.image().get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(target.image().get_pixel(2, 2).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_blit_is_clipped_to_target() {
        let mut target = DrawTarget::new(Size::new(4, 4), RENDER_DPI);
        let source = RgbaImage::from_pixel(3, 3, Rgba([9, 8, 7, 255]));
        target.blit(&source, Point::new(2, -1));

        assert_eq!(target.image().get_pixel(2, 0).0, [9, 8, 7, 255]);
        assert_eq!(target.image().get_pixel(3, 1).0, [9, 8, 7, 255]);
        assert_eq!(target.image().get_pixel(3, 2).0, [0, 0, 0, 0]);
        assert_eq!(target.image().get_pixel(1, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn test_stroke_rect_leaves_interior() {
        let mut target = DrawTarget::new(Size::new(6, 6), RENDER_DPI);
        target.stroke_rect(Rect::new(0, 0, 6, 6), 1, [0, 255, 0, 255]);
        assert_eq!(target.image().get_pixel(0, 3).0, [0, 255, 0, 255]);
        assert_eq!(target.image().get_pixel(5, 5).0, [0, 255, 0, 255]);
        assert_eq!(target.image().get_pixel(3, 3).0, [0, 0, 0, 0]);
    }
}
