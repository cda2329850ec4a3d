//! Outbound window-manager surface and the host window it talks about.
//!
//! Kept free of Win32 types so the bridge can run against a recording fake;
//! the DWM-backed implementations live in `win32`.

use crate::{
    bitmap::{Bitmap, BitmapHandle},
    renderer::{Point, RenderSurface, Size},
};

/// Compositor wants an iconic thumbnail (`WM_DWMSENDICONICTHUMBNAIL`).
pub const WM_DWMSENDICONICTHUMBNAIL: u32 = 0x0323;
/// Compositor wants a live preview (`WM_DWMSENDICONICLIVEPREVIEWBITMAP`).
pub const WM_DWMSENDICONICLIVEPREVIEWBITMAP: u32 = 0x0326;
pub const WM_SYSCOMMAND: u32 = 0x0112;

pub const COMPOSITION_MESSAGES: [u32; 2] =
    [WM_DWMSENDICONICTHUMBNAIL, WM_DWMSENDICONICLIVEPREVIEWBITMAP];

/// Native top-level window identifier. Zero is never a resolved handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    pub fn new(raw: isize) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

pub trait Compositor: Send + Sync {
    /// Adds or removes `message` from the process message-filter allow list.
    fn set_message_allowed(&self, message: u32, allowed: bool) -> anyhow::Result<()>;

    /// Opts the window in or out of application-supplied thumbnails and previews.
    fn set_custom_preview(&self, window: WindowHandle, enabled: bool) -> anyhow::Result<()>;

    fn create_bitmap_handle(&self, bitmap: &Bitmap) -> anyhow::Result<BitmapHandle>;

    fn release_bitmap_handle(&self, handle: BitmapHandle);

    fn set_iconic_thumbnail(&self, window: WindowHandle, bitmap: BitmapHandle) -> anyhow::Result<()>;

    fn set_live_preview_bitmap(
        &self,
        window: WindowHandle,
        bitmap: BitmapHandle,
        offset: Point,
    ) -> anyhow::Result<()>;

    /// Drops cached thumbnails and previews so the compositor asks again.
    fn invalidate_iconic_bitmaps(&self, window: WindowHandle) -> anyhow::Result<()>;
}

/// The application's main window, as seen by the badge pipeline.
pub trait HostWindow: Send + Sync {
    /// `None` until the window exists.
    fn resolve_handle(&self) -> Option<WindowHandle>;

    /// Current size of `window`, the handle returned by `resolve_handle`.
    fn actual_size(&self, window: WindowHandle) -> Option<Size>;

    /// `window` as a live render surface.
    fn live_surface(&self, window: WindowHandle) -> anyhow::Result<Box<dyn RenderSurface>>;
}
