//! Application-rendered taskbar thumbnails and live previews for a host window.
//!
//! The compositor asks for images with `WM_DWMSENDICONICTHUMBNAIL` and
//! `WM_DWMSENDICONICLIVEPREVIEWBITMAP`. [`dispatcher::dispatch`] routes those
//! to [`service::BadgeService`], which renders, stores and hands the bitmaps
//! back. Repeated failures switch the feature off for the rest of the process.

pub mod logging;

pub mod badge_view;
pub mod bitmap;
pub mod compositor;
pub mod data_loaders;
pub mod dispatcher;
pub mod failure_guard;
pub mod renderer;
pub mod service;
pub mod throttle;
pub mod utility;
#[cfg(windows)]
pub mod win32;

pub use badge_view::{BadgeContext, BadgeTemplate, DebugMode, DefaultBadgeTemplate};
pub use compositor::{Compositor, HostWindow, WindowHandle};
pub use data_loaders::config::BadgeConfig;
pub use dispatcher::{dispatch, Dispatch};
pub use service::{BadgeService, BridgeState, LifecycleEvent};
