use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, Mutex, MutexGuard, OnceLock, Weak,
};

use anyhow::{anyhow, Context};

use crate::{
    badge_view::{BadgeContext, BadgeTemplate, DebugMode},
    bitmap::{BitmapSlotStore, OwnedBitmapHandle, PixelFormat, Slot},
    compositor::{
        Compositor, HostWindow, WindowHandle, COMPOSITION_MESSAGES, WM_DWMSENDICONICLIVEPREVIEWBITMAP,
        WM_DWMSENDICONICTHUMBNAIL,
    },
    data_loaders::config::BadgeConfig,
    debug,
    failure_guard::{FailureGuard, GuardOutcome},
    info,
    renderer::{render, Point},
    throttle::{CancellationToken, InvocationThrottle},
    warn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgeState {
    Uninitialized = 0,
    Hooked = 1,
    Rendering = 2,
    /// Terminal.
    Disabled = 3,
}

impl BridgeState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Hooked,
            2 => Self::Rendering,
            3 => Self::Disabled,
            _ => Self::Uninitialized,
        }
    }
}

/// Host notifications that may change what the badge should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    SolutionOpened,
    SolutionClosed,
    ActiveDocumentChanged,
    ActiveConfigChanged,
    DebuggerRunMode,
    DebuggerDesignMode,
    DebuggerBreakMode,
}

struct BridgeInner {
    slots: BitmapSlotStore,
    context: BadgeContext,
}

/// Owns the compositor bridge: hook state, bitmap slots, failure guard and the
/// refresh throttle. Shared between the UI thread that receives composition
/// messages and the throttle worker.
pub struct BadgeService {
    config: BadgeConfig,
    compositor: Arc<dyn Compositor>,
    host: Arc<dyn HostWindow>,
    template: Arc<dyn BadgeTemplate>,
    inner: Mutex<BridgeInner>,
    window: OnceLock<WindowHandle>,
    state: AtomicU8,
    guard: FailureGuard,
    throttle: InvocationThrottle,
}

impl BadgeService {
    pub fn new(
        config: BadgeConfig,
        compositor: Arc<dyn Compositor>,
        host: Arc<dyn HostWindow>,
        template: Arc<dyn BadgeTemplate>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let throttle = InvocationThrottle::new(
                config.throttle.min_interval(),
                config.throttle.max_interval(),
                move |ct| {
                    if let Some(service) = weak.upgrade() {
                        service.refresh(ct);
                    }
                },
            );

            Self {
                guard: FailureGuard::new(config.failures.ceiling, config.failures.policy()),
                config,
                compositor,
                host,
                template,
                inner: Mutex::new(BridgeInner {
                    slots: BitmapSlotStore::new(),
                    context: BadgeContext::default(),
                }),
                window: OnceLock::new(),
                state: AtomicU8::new(BridgeState::Uninitialized as u8),
                throttle,
            }
        })
    }

    pub fn state(&self) -> BridgeState {
        BridgeState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn failure_count(&self) -> u32 {
        self.guard.failure_count()
    }

    pub fn context(&self) -> BadgeContext {
        self.lock().context.clone()
    }

    fn lock(&self) -> MutexGuard<'_, BridgeInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /* =========================
       WINDOW HANDLE
       ========================= */

    /// Resolves the host window once and caches it for the process lifetime.
    /// `None` means the window doesn't exist yet.
    pub fn resolve_window_handle(&self) -> Option<WindowHandle> {
        if let Some(handle) = self.window.get() {
            return Some(*handle);
        }

        let inner = self.lock();
        self.resolve_locked(&inner)
    }

    fn resolve_locked(&self, _inner: &BridgeInner) -> Option<WindowHandle> {
        if let Some(handle) = self.window.get() {
            return Some(*handle);
        }

        let handle = self.host.resolve_handle()?;
        let _ = self.window.set(handle);
        info!("[BADGES] Resolved main window handle 0x{:X}", handle.0);
        Some(handle)
    }

    /* =========================
       REFRESH
       ========================= */

    pub fn request_refresh(&self) {
        self.throttle.invoke();
    }

    fn refresh(&self, ct: &CancellationToken) {
        if ct.is_cancelled() {
            debug!("[BADGES][REFRESH] Superseded before start");
            return;
        }
        self.invalidate_current_badge();
    }

    /// Asks the compositor to drop its cached badge. No-op until the window exists.
    pub fn invalidate_current_badge(&self) {
        let Some(window) = self.resolve_window_handle() else {
            debug!("[BADGES][REFRESH] Main window not ready, skipping invalidate");
            return;
        };

        if let Err(e) = self.compositor.invalidate_iconic_bitmaps(window) {
            warn!("[BADGES][REFRESH] Invalidate failed: {:#}", e);
        }
    }

    pub fn on_lifecycle_event(&self, event: LifecycleEvent) {
        {
            let mut inner = self.lock();
            let context = &mut inner.context;
            match event {
                LifecycleEvent::SolutionOpened => context.solution_open = true,
                LifecycleEvent::SolutionClosed => {
                    context.solution_open = false;
                    context.debug_mode = DebugMode::Design;
                }
                LifecycleEvent::DebuggerRunMode => context.debug_mode = DebugMode::Run,
                LifecycleEvent::DebuggerDesignMode => context.debug_mode = DebugMode::Design,
                LifecycleEvent::DebuggerBreakMode => context.debug_mode = DebugMode::Break,
                LifecycleEvent::ActiveDocumentChanged | LifecycleEvent::ActiveConfigChanged => {}
            }
        }

        debug!("[BADGES][EVENT] {:?}", event);
        self.request_refresh();
    }

    /* =========================
       HOOKS
       ========================= */

    /// Allows both composition messages, runs `attach` to install the window
    /// hook, then opts the window into custom previews. Runs once.
    pub fn initialize_hooks<F>(&self, attach: F) -> anyhow::Result<()>
    where
        F: FnOnce(WindowHandle) -> anyhow::Result<()>,
    {
        if self.state() != BridgeState::Uninitialized {
            return Ok(());
        }

        if !self.config.enabled {
            info!("[BADGES] Custom previews disabled in config, leaving default behaviour");
            return Ok(());
        }

        let window = self
            .resolve_window_handle()
            .ok_or_else(|| anyhow!("main window handle is not available yet"))?;

        let hooked = self.install(window, attach);
        if let Err(e) = hooked {
            for message in COMPOSITION_MESSAGES {
                let _ = self.compositor.set_message_allowed(message, false);
            }
            return Err(e);
        }

        self.state
            .store(BridgeState::Hooked as u8, Ordering::SeqCst);
        info!("[BADGES] Hooks installed for window 0x{:X}", window.0);
        Ok(())
    }

    fn install<F>(&self, window: WindowHandle, attach: F) -> anyhow::Result<()>
    where
        F: FnOnce(WindowHandle) -> anyhow::Result<()>,
    {
        for message in COMPOSITION_MESSAGES {
            self.compositor
                .set_message_allowed(message, true)
                .with_context(|| format!("allowing WM 0x{message:04X}"))?;
        }

        attach(window).context("attaching message hook")?;

        self.compositor
            .set_custom_preview(window, true)
            .context("enabling custom preview")?;
        Ok(())
    }

    /* =========================
       COMPOSITION REQUESTS
       ========================= */

    /// Services one composition message inside the failure guard. Returns
    /// false when the bridge isn't accepting messages.
    pub fn on_composition_message(&self, message: u32) -> bool {
        if self
            .state
            .compare_exchange(
                BridgeState::Hooked as u8,
                BridgeState::Rendering as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!(
                "[BADGES] Ignoring WM 0x{:04X} in state {:?}",
                message,
                self.state()
            );
            return false;
        }

        let context = serde_json::to_string(&self.context()).unwrap_or_default();
        let outcome = self.guard.guard(message, &context, || match message {
            WM_DWMSENDICONICTHUMBNAIL => self.send_iconic_thumbnail(),
            WM_DWMSENDICONICLIVEPREVIEWBITMAP => self.send_live_preview(),
            other => Err(anyhow!("not a composition message: 0x{other:04X}")),
        });

        let _ = self.state.compare_exchange(
            BridgeState::Rendering as u8,
            BridgeState::Hooked as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );

        if let GuardOutcome::CeilingReached { .. } = outcome {
            self.disable();
        }

        true
    }

    fn send_iconic_thumbnail(&self) -> anyhow::Result<()> {
        let mut inner = self.lock();
        let window = self
            .resolve_locked(&inner)
            .ok_or_else(|| anyhow!("main window handle is not available"))?;

        let mut view = self.template.build_view(&inner.context);
        view.initialize().context("initializing badge view")?;
        let bitmap = render(view.as_mut(), self.config.thumbnail.size(), PixelFormat::Bgr32)?;

        drop(inner.slots.replace(Slot::Thumbnail, bitmap));
        self.hand_off(&inner, Slot::Thumbnail, |handle| {
            self.compositor.set_iconic_thumbnail(window, handle)
        })
    }

    fn send_live_preview(&self) -> anyhow::Result<()> {
        let mut inner = self.lock();
        let window = self
            .resolve_locked(&inner)
            .ok_or_else(|| anyhow!("main window handle is not available"))?;

        let size = self
            .host
            .actual_size(window)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("main window has no size"))?;
        let mut surface = self.host.live_surface(window)?;
        let bitmap = render(surface.as_mut(), size, PixelFormat::Pbgra32)?;

        drop(inner.slots.replace(Slot::LivePreview, bitmap));

        let offset = Point::new(
            self.config.live_preview.offset_x,
            self.config.live_preview.offset_y,
        );
        self.hand_off(&inner, Slot::LivePreview, |handle| {
            self.compositor.set_live_preview_bitmap(window, handle, offset)
        })
    }

    fn hand_off<F>(&self, inner: &BridgeInner, slot: Slot, send: F) -> anyhow::Result<()>
    where
        F: FnOnce(crate::bitmap::BitmapHandle) -> anyhow::Result<()>,
    {
        let bitmap = inner
            .slots
            .get(slot)
            .ok_or_else(|| anyhow!("{} slot is empty", slot.name()))?;

        let owned = OwnedBitmapHandle::create(self.compositor.as_ref(), bitmap)
            .with_context(|| format!("creating {} handle", slot.name()))?;
        send(owned.handle()).with_context(|| format!("handing {} to compositor", slot.name()))
    }

    /* =========================
       TEARDOWN
       ========================= */

    fn disable(&self) {
        let previous = self.state.swap(BridgeState::Disabled as u8, Ordering::SeqCst);
        if previous == BridgeState::Disabled as u8 {
            return;
        }

        for message in COMPOSITION_MESSAGES {
            if let Err(e) = self.compositor.set_message_allowed(message, false) {
                warn!("[BADGES] Failed to remove filter for WM 0x{:04X}: {:#}", message, e);
            }
        }

        if let Some(window) = self.resolve_window_handle() {
            if let Err(e) = self.compositor.set_custom_preview(window, false) {
                warn!("[BADGES] Failed to restore default preview: {:#}", e);
            }
        }

        warn!("[BADGES] Custom previews permanently disabled");
        self.request_refresh();
    }

    /// Frees both slots and stops the throttle worker.
    pub fn shutdown(&self) {
        let dropped = self.lock().slots.clear();
        debug!("[BADGES] Shutdown released {} bitmap(s)", dropped.len());
        self.throttle.shutdown();
    }
}
