//! Canvas 2D backend (browser)

use glam::Vec2;
use web_sys::CanvasRenderingContext2d;

use super::{Color, RenderSurface};

pub struct CanvasSurface {
    ctx: CanvasRenderingContext2d,
}

impl CanvasSurface {
    pub fn new(ctx: CanvasRenderingContext2d) -> Self {
        Self { ctx }
    }
}

impl RenderSurface for CanvasSurface {
    fn clear(&mut self, width: f32, height: f32, color: Color) {
        self.ctx.set_shadow_blur(0.0);
        self.ctx.set_fill_style_str(&color.css());
        self.ctx.fill_rect(0.0, 0.0, width as f64, height as f64);
    }

    fn grid_line(&mut self, from: Vec2, to: Vec2, color: Color) {
        self.ctx.set_stroke_style_str(&color.css());
        self.ctx.set_line_width(1.0);
        self.ctx.begin_path();
        self.ctx.move_to(from.x as f64, from.y as f64);
        self.ctx.line_to(to.x as f64, to.y as f64);
        self.ctx.stroke();
    }

    fn fill_cell(&mut self, origin: Vec2, size: f32, color: Color, glow: f32) {
        let css = color.css();
        self.ctx.set_fill_style_str(&css);
        if glow > 0.0 {
            self.ctx.set_shadow_color(&css);
        }
        self.ctx.set_shadow_blur(glow as f64);
        self.ctx
            .fill_rect(origin.x as f64, origin.y as f64, size as f64, size as f64);
        self.ctx.set_shadow_blur(0.0);
    }
}
