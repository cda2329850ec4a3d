//! DWM, GDI and window-subclass plumbing behind the `Compositor` and
//! `HostWindow` seams.

use std::{ffi::c_void, mem, ptr, sync::Arc, sync::OnceLock};

use anyhow::{anyhow, bail, Context};
use image::{Rgba, RgbaImage};
use windows::{
    core::{BOOL, PCWSTR},
    Win32::{
        Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM},
        Graphics::{
            Dwm::{
                DwmInvalidateIconicBitmaps, DwmSetIconicLivePreviewBitmap, DwmSetIconicThumbnail,
                DwmSetWindowAttribute, DWMWA_FORCE_ICONIC_REPRESENTATION, DWMWA_HAS_ICONIC_BITMAP,
            },
            Gdi::{
                CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GetDC, ReleaseDC,
                SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC,
                HGDIOBJ,
            },
        },
        Storage::Xps::{PrintWindow, PRINT_WINDOW_FLAGS},
        System::LibraryLoader::GetModuleHandleW,
        UI::{
            Shell::{DefSubclassProc, RemoveWindowSubclass, SetWindowSubclass},
            WindowsAndMessaging::{
                ChangeWindowMessageFilter, CreateWindowExW, DefWindowProcW, FindWindowW,
                GetWindowRect, GetWindowThreadProcessId, PostQuitMessage, RegisterClassW,
                ShowWindow, CW_USEDEFAULT, MSGFLT_ADD, MSGFLT_REMOVE, SW_SHOW, WINDOW_EX_STYLE,
                WM_DESTROY, WM_NCDESTROY, WNDCLASSW, WS_OVERLAPPEDWINDOW, WS_VISIBLE,
            },
        },
    },
};

use crate::{
    bitmap::{Bitmap, BitmapHandle},
    compositor::{Compositor, HostWindow, WindowHandle},
    debug,
    dispatcher::{dispatch, Dispatch},
    error, info,
    renderer::{DrawTarget, Point, Rect, RenderSurface, Size},
    service::BadgeService,
    utility::to_wstring,
};

const BADGE_SUBCLASS_ID: usize = 0x5B_AD6E;
// PW_RENDERFULLCONTENT, captures DirectComposition content too
const PW_RENDERFULLCONTENT: PRINT_WINDOW_FLAGS = PRINT_WINDOW_FLAGS(2);

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut c_void)
}

fn hbitmap(handle: BitmapHandle) -> HBITMAP {
    HBITMAP(handle.0 as *mut c_void)
}

fn bitmap_info(size: Size) -> BITMAPINFO {
    BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: size.width as i32,
            biHeight: -(size.height as i32), // top-down
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// 32bpp top-down DIB section. Returns the bitmap and its pixel pointer.
unsafe fn create_dib(dc: Option<HDC>, size: Size) -> anyhow::Result<(HBITMAP, *mut u8)> {
    let bmi = bitmap_info(size);
    let mut bits: *mut c_void = ptr::null_mut();
    let bitmap = CreateDIBSection(dc, &bmi, DIB_RGB_COLORS, &mut bits, None, 0)
        .with_context(|| format!("CreateDIBSection {size} failed"))?;

    if bits.is_null() {
        let _ = DeleteObject(bitmap.into());
        bail!("CreateDIBSection {size} returned no pixel buffer");
    }

    Ok((bitmap, bits as *mut u8))
}

/* =========================
   COMPOSITOR
   ========================= */

/// Desktop Window Manager backed compositor.
#[derive(Debug, Default, Clone, Copy)]
pub struct DwmCompositor;

impl DwmCompositor {
    fn set_bool_attribute(
        window: WindowHandle,
        attribute: windows::Win32::Graphics::Dwm::DWMWINDOWATTRIBUTE,
        value: bool,
    ) -> anyhow::Result<()> {
        let value = BOOL::from(value);
        unsafe {
            DwmSetWindowAttribute(
                hwnd(window),
                attribute,
                &value as *const BOOL as *const c_void,
                mem::size_of::<BOOL>() as u32,
            )
        }
        .with_context(|| format!("DwmSetWindowAttribute({}) failed", attribute.0))
    }
}

impl Compositor for DwmCompositor {
    fn set_message_allowed(&self, message: u32, allowed: bool) -> anyhow::Result<()> {
        let flag = if allowed { MSGFLT_ADD } else { MSGFLT_REMOVE };
        unsafe { ChangeWindowMessageFilter(message, flag) }
            .with_context(|| format!("ChangeWindowMessageFilter(0x{message:04X}) failed"))
    }

    fn set_custom_preview(&self, window: WindowHandle, enabled: bool) -> anyhow::Result<()> {
        Self::set_bool_attribute(window, DWMWA_FORCE_ICONIC_REPRESENTATION, enabled)?;
        Self::set_bool_attribute(window, DWMWA_HAS_ICONIC_BITMAP, enabled)
    }

    fn create_bitmap_handle(&self, bitmap: &Bitmap) -> anyhow::Result<BitmapHandle> {
        let pixels = bitmap.to_bgra();
        unsafe {
            let (dib, bits) = create_dib(None, bitmap.size())?;
            ptr::copy_nonoverlapping(pixels.as_ptr(), bits, pixels.len());
            Ok(BitmapHandle(dib.0 as isize))
        }
    }

    fn release_bitmap_handle(&self, handle: BitmapHandle) {
        unsafe {
            let _ = DeleteObject(hbitmap(handle).into());
        }
    }

    fn set_iconic_thumbnail(&self, window: WindowHandle, bitmap: BitmapHandle) -> anyhow::Result<()> {
        unsafe { DwmSetIconicThumbnail(hwnd(window), hbitmap(bitmap), 0) }
            .context("DwmSetIconicThumbnail failed")
    }

    fn set_live_preview_bitmap(
        &self,
        window: WindowHandle,
        bitmap: BitmapHandle,
        offset: Point,
    ) -> anyhow::Result<()> {
        let client = POINT {
            x: offset.x,
            y: offset.y,
        };
        unsafe {
            DwmSetIconicLivePreviewBitmap(
                hwnd(window),
                hbitmap(bitmap),
                Some(&client as *const POINT),
                0,
            )
        }
        .context("DwmSetIconicLivePreviewBitmap failed")
    }

    fn invalidate_iconic_bitmaps(&self, window: WindowHandle) -> anyhow::Result<()> {
        unsafe { DwmInvalidateIconicBitmaps(hwnd(window)) }.context("DwmInvalidateIconicBitmaps failed")
    }
}

/* =========================
   HOST WINDOW
   ========================= */

/// Finds this process's top-level window by class name. Resolves to `None`
/// until that window has been created.
pub struct MainWindowLocator {
    class_name: Vec<u16>,
}

impl MainWindowLocator {
    pub fn by_class(class_name: &str) -> Self {
        Self {
            class_name: to_wstring(class_name),
        }
    }
}

impl HostWindow for MainWindowLocator {
    fn resolve_handle(&self) -> Option<WindowHandle> {
        let found = unsafe { FindWindowW(PCWSTR(self.class_name.as_ptr()), PCWSTR::null()) }.ok()?;

        let mut pid = 0u32;
        unsafe {
            let _ = GetWindowThreadProcessId(found, Some(&mut pid));
        }
        if pid != std::process::id() {
            return None;
        }

        WindowHandle::new(found.0 as isize)
    }

    fn actual_size(&self, window: WindowHandle) -> Option<Size> {
        window_rect(hwnd(window)).map(|r| {
            Size::new(
                (r.right - r.left).max(0) as u32,
                (r.bottom - r.top).max(0) as u32,
            )
        })
    }

    fn live_surface(&self, window: WindowHandle) -> anyhow::Result<Box<dyn RenderSurface>> {
        Ok(Box::new(WindowCapture::new(window)))
    }
}

fn window_rect(hwnd: HWND) -> Option<RECT> {
    unsafe {
        let mut rect = RECT::default();
        if GetWindowRect(hwnd, &mut rect).is_ok() {
            Some(rect)
        } else {
            None
        }
    }
}

/// The live window as a render surface, captured with `PrintWindow`.
pub struct WindowCapture {
    window: WindowHandle,
    bounds: Option<Rect>,
}

impl WindowCapture {
    pub fn new(window: WindowHandle) -> Self {
        Self {
            window,
            bounds: None,
        }
    }
}

/// Screen DC, memory DC and the DIB selected into it, torn down in reverse.
struct CaptureCanvas {
    screen_dc: HDC,
    mem_dc: HDC,
    bitmap: HBITMAP,
    old: HGDIOBJ,
    bits: *mut u8,
}

impl CaptureCanvas {
    unsafe fn new(size: Size) -> anyhow::Result<Self> {
        let screen_dc = GetDC(None);
        let mem_dc = CreateCompatibleDC(Some(screen_dc));
        let (bitmap, bits) = match create_dib(Some(screen_dc), size) {
            Ok(dib) => dib,
            Err(e) => {
                let _ = DeleteDC(mem_dc);
                let _ = ReleaseDC(None, screen_dc);
                return Err(e);
            }
        };
        let old = SelectObject(mem_dc, bitmap.into());

        Ok(Self {
            screen_dc,
            mem_dc,
            bitmap,
            old,
            bits,
        })
    }
}

impl Drop for CaptureCanvas {
    fn drop(&mut self) {
        unsafe {
            let _ = SelectObject(self.mem_dc, self.old);
            let _ = DeleteObject(self.bitmap.into());
            let _ = DeleteDC(self.mem_dc);
            let _ = ReleaseDC(None, self.screen_dc);
        }
    }
}

impl RenderSurface for WindowCapture {
    fn measure(&mut self, available: Size) -> anyhow::Result<Size> {
        Ok(available)
    }

    fn arrange(&mut self, bounds: Rect) -> anyhow::Result<()> {
        self.bounds = Some(bounds);
        Ok(())
    }

    fn draw(&self, target: &mut DrawTarget) -> anyhow::Result<()> {
        let size = target.size();
        if size.is_empty() {
            bail!("capture target is empty");
        }

        unsafe {
            let canvas = CaptureCanvas::new(size)?;
            if !PrintWindow(hwnd(self.window), canvas.mem_dc, PW_RENDERFULLCONTENT).as_bool() {
                bail!("PrintWindow failed for 0x{:X}", self.window.0);
            }

            let len = size.width as usize * size.height as usize * 4;
            let bgra = std::slice::from_raw_parts(canvas.bits, len);
            let row = size.width as usize * 4;
            // GDI leaves alpha undefined; a captured window is opaque
            let captured = RgbaImage::from_fn(size.width, size.height, |x, y| {
                let i = y as usize * row + x as usize * 4;
                Rgba([bgra[i + 2], bgra[i + 1], bgra[i], 255])
            });
            target.blit(&captured, Point::default());
        }

        debug!("[BADGES][CAPTURE] Captured window at {}", size);
        Ok(())
    }
}

/* =========================
   MESSAGE HOOK
   ========================= */

/// Subclasses `window` so its messages flow through [`dispatch`]. The hook
/// keeps `service` alive until the window is destroyed.
pub fn install_message_hook(window: WindowHandle, service: Arc<BadgeService>) -> anyhow::Result<()> {
    let ref_data = Arc::into_raw(service) as usize;
    let ok = unsafe {
        SetWindowSubclass(
            hwnd(window),
            Some(badge_subclass_proc),
            BADGE_SUBCLASS_ID,
            ref_data,
        )
    };

    if !ok.as_bool() {
        unsafe {
            drop(Arc::from_raw(ref_data as *const BadgeService));
        }
        bail!("SetWindowSubclass failed for 0x{:X}", window.0);
    }

    info!("[BADGES][HOOK] Subclass installed on 0x{:X}", window.0);
    Ok(())
}

unsafe extern "system" fn badge_subclass_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
    _id: usize,
    ref_data: usize,
) -> LRESULT {
    if msg == WM_NCDESTROY {
        let _ = RemoveWindowSubclass(hwnd, Some(badge_subclass_proc), BADGE_SUBCLASS_ID);
        let service = Arc::from_raw(ref_data as *const BadgeService);
        service.shutdown();
        drop(service);
        info!("[BADGES][HOOK] Subclass removed");
        return DefSubclassProc(hwnd, msg, wparam, lparam);
    }

    let service = &*(ref_data as *const BadgeService);
    match dispatch(service, msg, wparam.0, lparam.0) {
        Dispatch::Handled(result) => LRESULT(result),
        Dispatch::Unhandled => DefSubclassProc(hwnd, msg, wparam, lparam),
    }
}

/* =========================
   DEMO HOST WINDOW
   ========================= */

fn ensure_window_class(class_name: &[u16]) -> anyhow::Result<HINSTANCE> {
    static CLASS_ONCE: OnceLock<()> = OnceLock::new();

    let hinstance = unsafe {
        GetModuleHandleW(None)
            .map(|h| HINSTANCE(h.0))
            .context("GetModuleHandleW failed")?
    };

    if CLASS_ONCE.get().is_none() {
        let wc = WNDCLASSW {
            lpfnWndProc: Some(host_window_proc),
            hInstance: hinstance,
            lpszClassName: PCWSTR(class_name.as_ptr()),
            ..Default::default()
        };

        if unsafe { RegisterClassW(&wc) } == 0 {
            error!("[BADGES][HOST] RegisterClassW failed");
            bail!("RegisterClassW failed");
        }
        let _ = CLASS_ONCE.set(());
    }

    Ok(hinstance)
}

unsafe extern "system" fn host_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == WM_DESTROY {
        PostQuitMessage(0);
        return LRESULT(0);
    }
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

/// Creates and shows a plain top-level window of `class_name`.
pub fn create_host_window(class_name: &str, title: &str) -> anyhow::Result<WindowHandle> {
    let class = to_wstring(class_name);
    let title = to_wstring(title);
    let hinstance = ensure_window_class(&class)?;

    let created = unsafe {
        CreateWindowExW(
            WINDOW_EX_STYLE(0),
            PCWSTR(class.as_ptr()),
            PCWSTR(title.as_ptr()),
            WS_OVERLAPPEDWINDOW | WS_VISIBLE,
            CW_USEDEFAULT,
            CW_USEDEFAULT,
            960,
            600,
            None,
            None,
            Some(hinstance),
            None,
        )
    }
    .context("CreateWindowExW failed")?;

    unsafe {
        let _ = ShowWindow(created, SW_SHOW);
    }

    WindowHandle::new(created.0 as isize).ok_or_else(|| anyhow!("CreateWindowExW returned null"))
}
