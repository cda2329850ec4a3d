use anyhow::bail;
use serde::Serialize;

use crate::renderer::{DrawTarget, Rect, RenderSurface, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugMode {
    #[default]
    Design,
    Run,
    Break,
}

/// State the badge reflects, also attached to failure diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BadgeContext {
    pub solution_open: bool,
    pub debug_mode: DebugMode,
}

/// Builds the detached view rendered for the iconic thumbnail.
pub trait BadgeTemplate: Send + Sync {
    fn build_view(&self, context: &BadgeContext) -> Box<dyn RenderSurface>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgePalette {
    pub background: [u8; 4],
    pub border: [u8; 4],
    pub accent: [u8; 4],
    pub idle: [u8; 4],
}

impl Default for BadgePalette {
    fn default() -> Self {
        Self {
            background: [0x2D, 0x2D, 0x30, 0xFF],
            border: [0x3F, 0x3F, 0x46, 0xFF],
            accent: [0x68, 0x21, 0x7A, 0xFF],
            idle: [0x55, 0x55, 0x55, 0xFF],
        }
    }
}

fn mode_color(mode: DebugMode) -> [u8; 4] {
    match mode {
        DebugMode::Design => [0x00, 0x7A, 0xCC, 0xFF],
        DebugMode::Run => [0xCA, 0x51, 0x00, 0xFF],
        DebugMode::Break => [0xE5, 0x14, 0x00, 0xFF],
    }
}

/// Simple block-drawn badge: background, border, accent bar and a strip in the
/// debugger mode colour.
pub struct BadgeView {
    context: BadgeContext,
    palette: BadgePalette,
    initialized: bool,
    bounds: Option<Rect>,
}

impl BadgeView {
    pub fn new(context: BadgeContext, palette: BadgePalette) -> Self {
        Self {
            context,
            palette,
            initialized: false,
            bounds: None,
        }
    }
}

impl RenderSurface for BadgeView {
    fn initialize(&mut self) -> anyhow::Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn measure(&mut self, available: Size) -> anyhow::Result<Size> {
        if !self.initialized {
            bail!("badge view measured before initialization");
        }
        Ok(available)
    }

    fn arrange(&mut self, bounds: Rect) -> anyhow::Result<()> {
        self.bounds = Some(bounds);
        Ok(())
    }

    fn draw(&self, target: &mut DrawTarget) -> anyhow::Result<()> {
        let Some(bounds) = self.bounds else {
            bail!("badge view drawn before arrange");
        };

        target.clear(self.palette.background);
        target.stroke_rect(bounds, 2, self.palette.border);

        let inner = bounds.inset(6);
        let bar_height = (inner.height / 4).max(1);
        let bar = if self.context.solution_open {
            self.palette.accent
        } else {
            self.palette.idle
        };
        target.fill_rect(Rect::new(inner.x, inner.y, inner.width, bar_height), bar);

        let strip_height = (inner.height / 6).max(1);
        let strip_y = inner.y + inner.height as i32 - strip_height as i32;
        target.fill_rect(
            Rect::new(inner.x, strip_y, inner.width, strip_height),
            mode_color(self.context.debug_mode),
        );

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefaultBadgeTemplate {
    pub palette: BadgePalette,
}

impl BadgeTemplate for DefaultBadgeTemplate {
    fn build_view(&self, context: &BadgeContext) -> Box<dyn RenderSurface> {
        Box::new(BadgeView::new(context.clone(), self.palette))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bitmap::PixelFormat, renderer::render};

    #[test]
    fn test_view_requires_initialization() {
        let mut view = BadgeView::new(BadgeContext::default(), BadgePalette::default());
        assert!(render(&mut view, Size::new(196, 106), PixelFormat::Bgr32).is_err());
    }

    #[test]
    fn test_strip_follows_debug_mode() {
        let template = DefaultBadgeTemplate::default();
        let context = BadgeContext {
            solution_open: true,
            debug_mode: DebugMode::Break,
        };
        let mut view = template.build_view(&context);
        view.initialize().unwrap();
        let bitmap = render(view.as_mut(), Size::new(196, 106), PixelFormat::Bgr32).unwrap();

        // bottom strip sits just inside the 6px inset
        let px = bitmap.image().get_pixel(98, 106 - 7).0;
        assert_eq!(px, mode_color(DebugMode::Break));

        let bar = bitmap.image().get_pixel(98, 7).0;
        assert_eq!(bar, BadgePalette::default().accent);
    }

    #[test]
    fn test_context_serializes_for_diagnostics() {
        let context = BadgeContext {
            solution_open: false,
            debug_mode: DebugMode::Run,
        };
        let json = serde_json::to_string(&context).unwrap();
        assert_eq!(json, r#"{"solution_open":false,"debug_mode":"run"}"#);
    }
}
