use image::RgbaImage;

use crate::{compositor::Compositor, renderer::Size};

/// Pixel layout the bitmap was rasterized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Opaque 32bpp, alpha forced to 255. Thumbnail default.
    Bgr32,
    /// Premultiplied 32bpp with alpha, composited over the desktop.
    Pbgra32,
}

/// Decoded render output. Owned exclusively by whoever holds it; dropping it
/// frees the pixel buffer.
#[derive(Debug, Clone)]
pub struct Bitmap {
    image: RgbaImage,
    format: PixelFormat,
}

impl Bitmap {
    pub fn new(image: RgbaImage, format: PixelFormat) -> Self {
        Self { image, format }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Top-down BGRA rows, the layout a 32bpp DIB section expects.
    pub fn to_bgra(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.image.as_raw().len());
        for px in self.image.pixels() {
            let [r, g, b, a] = px.0;
            out.extend_from_slice(&[b, g, r, a]);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Thumbnail,
    LivePreview,
}

impl Slot {
    pub fn name(self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::LivePreview => "live preview",
        }
    }
}

/// The two most recent renders. Only reachable through `&mut`, so callers keep
/// it behind the same lock as the render that feeds it.
#[derive(Debug, Default)]
pub struct BitmapSlotStore {
    thumbnail: Option<Bitmap>,
    live_preview: Option<Bitmap>,
}

impl BitmapSlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: Slot) -> Option<&Bitmap> {
        match slot {
            Slot::Thumbnail => self.thumbnail.as_ref(),
            Slot::LivePreview => self.live_preview.as_ref(),
        }
    }

    /// Stores `bitmap` and hands back the previous occupant for the caller to drop.
    #[must_use = "the previous bitmap should be dropped deliberately"]
    pub fn replace(&mut self, slot: Slot, bitmap: Bitmap) -> Option<Bitmap> {
        let cell = match slot {
            Slot::Thumbnail => &mut self.thumbnail,
            Slot::LivePreview => &mut self.live_preview,
        };
        cell.replace(bitmap)
    }

    pub fn clear(&mut self) -> Vec<Bitmap> {
        self.thumbnail
            .take()
            .into_iter()
            .chain(self.live_preview.take())
            .collect()
    }
}

/// Raw native bitmap handle value (an `HBITMAP` on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitmapHandle(pub isize);

/// Native handle that is released through its compositor when dropped, on
/// every exit path of the handoff.
pub struct OwnedBitmapHandle<'a> {
    handle: BitmapHandle,
    compositor: &'a dyn Compositor,
}

impl<'a> OwnedBitmapHandle<'a> {
    pub fn create(compositor: &'a dyn Compositor, bitmap: &Bitmap) -> anyhow::Result<Self> {
        let handle = compositor.create_bitmap_handle(bitmap)?;
        Ok(Self { handle, compositor })
    }

    pub fn handle(&self) -> BitmapHandle {
        self.handle
    }
}

impl Drop for OwnedBitmapHandle<'_> {
    fn drop(&mut self) {
        self.compositor.release_bitmap_handle(self.handle);
    }
}
