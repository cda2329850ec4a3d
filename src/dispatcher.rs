use crate::{
    compositor::{WM_DWMSENDICONICLIVEPREVIEWBITMAP, WM_DWMSENDICONICTHUMBNAIL, WM_SYSCOMMAND},
    debug,
    service::BadgeService,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Let the default window procedure see the message.
    Unhandled,
    Handled(isize),
}

/// Routes one window message. Only the two composition requests are acted on;
/// everything else passes through untouched.
pub fn dispatch(service: &BadgeService, msg: u32, wparam: usize, _lparam: isize) -> Dispatch {
    match msg {
        WM_DWMSENDICONICTHUMBNAIL | WM_DWMSENDICONICLIVEPREVIEWBITMAP => {
            if service.on_composition_message(msg) {
                Dispatch::Handled(0)
            } else {
                Dispatch::Unhandled
            }
        }
        WM_SYSCOMMAND => {
            // reserved for title-bar menu commands
            debug!("[BADGES][WM] SYSCOMMAND 0x{:X}", wparam);
            Dispatch::Unhandled
        }
        _ => Dispatch::Unhandled,
    }
}
