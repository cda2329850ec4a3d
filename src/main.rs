#![cfg_attr(windows, windows_subsystem = "windows")]

use solution_badges::{
    error, info, logging,
    utility::{app_root_dir, config_path},
    BadgeConfig,
};

pub const DEBUG_NAME: &str = "BADGES";

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use solution_badges::{
        win32::{create_host_window, install_message_hook, DwmCompositor, MainWindowLocator},
        BadgeService, DefaultBadgeTemplate, LifecycleEvent,
    };
    use windows::Win32::UI::HiDpi::{
        SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE, WM_QUIT,
    };

    const HOST_CLASS: &str = "SolutionBadgesHostWindow";

    let config = load_config();
    unsafe {
        if SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2).is_err() {
            solution_badges::warn!("[{}] Failed to set per-monitor DPI awareness", DEBUG_NAME);
        }
    }

    let service = BadgeService::new(
        config.clone(),
        Arc::new(DwmCompositor),
        Arc::new(MainWindowLocator::by_class(HOST_CLASS)),
        Arc::new(DefaultBadgeTemplate::default()),
    );

    // window doesn't exist yet, so this refresh is a no-op
    service.request_refresh();

    let window = create_host_window(HOST_CLASS, "Solution Badges")?;
    let hook_service = Arc::clone(&service);
    if let Err(e) = service.initialize_hooks(move |handle| install_message_hook(handle, hook_service)) {
        error!("[{}] Failed to initialize hooks: {:#}", DEBUG_NAME, e);
    }
    info!("[{}] Host window 0x{:X} ready", DEBUG_NAME, window.0);

    service.on_lifecycle_event(LifecycleEvent::SolutionOpened);

    // cycle the debugger state so the badge visibly changes
    let demo_events = [
        LifecycleEvent::DebuggerRunMode,
        LifecycleEvent::DebuggerBreakMode,
        LifecycleEvent::DebuggerDesignMode,
        LifecycleEvent::ActiveDocumentChanged,
    ];
    let mut next_event = 0usize;
    let mut last_event = Instant::now();

    loop {
        unsafe {
            let mut msg = MSG::default();
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    info!("[{}] WM_QUIT received, shutting down", DEBUG_NAME);
                    service.shutdown();
                    return Ok(());
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }

        if last_event.elapsed() >= Duration::from_secs(5) {
            last_event = Instant::now();
            service.on_lifecycle_event(demo_events[next_event % demo_events.len()]);
            next_event += 1;
        }

        thread::sleep(Duration::from_millis(8));
    }
}

#[cfg(not(windows))]
fn main() -> anyhow::Result<()> {
    let _config = load_config();
    error!("[{}] Taskbar badges need the Windows desktop compositor", DEBUG_NAME);
    anyhow::bail!("solution-badges only runs on Windows")
}

fn load_config() -> BadgeConfig {
    let path = config_path();
    let config = BadgeConfig::load(&path).unwrap_or_default();

    let logging_ready = logging::init(config.debug, &config.log_level, None)
        || app_root_dir().is_some_and(|root| {
            logging::init(
                config.debug,
                &config.log_level,
                Some(root.join("solution-badges.log")),
            )
        });
    if !logging_ready {
        eprintln!("[{}] File logging unavailable, diagnostics are discarded", DEBUG_NAME);
    }

    std::panic::set_hook(Box::new(|panic_info| {
        error!("[{}] Panic: {}", DEBUG_NAME, panic_info);
    }));

    info!("!---------- [{}] Starting Solution Badges ----------!", DEBUG_NAME);
    info!("[{}] Config loaded from {}", DEBUG_NAME, path.display());
    if let Some(log) = logging::log_path() {
        info!("[{}] Logging to {}", DEBUG_NAME, log.display());
    }
    config
}
