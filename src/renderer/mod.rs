//! Rendering
//!
//! The simulation is drawn through a small `RenderSurface` contract (clear,
//! grid line, filled cell), so the same frame code drives the browser
//! canvas and the command recorder used by tests and the headless binary.

#[cfg(target_arch = "wasm32")]
pub mod canvas;

#[cfg(target_arch = "wasm32")]
pub use canvas::CanvasSurface;

use glam::Vec2;

use crate::sim::GameState;

/// 24-bit sRGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn hex(rgb: u32) -> Self {
        Self {
            r: ((rgb >> 16) & 0xff) as u8,
            g: ((rgb >> 8) & 0xff) as u8,
            b: (rgb & 0xff) as u8,
        }
    }

    /// CSS `#rrggbb` form
    pub fn css(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Arcade palette
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub background: Color,
    pub grid_line: Color,
    pub head: Color,
    pub body: Color,
    pub food: Color,
    pub obstacle: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: Color::hex(0x121212),
            grid_line: Color::hex(0x1E1E24),
            head: Color::hex(0x39FF14),
            body: Color::hex(0x8A2BE2),
            food: Color::hex(0xFF4500),
            obstacle: Color::hex(0xF0F0F0),
        }
    }
}

/// Glow radius (px) of the snake head
pub const HEAD_GLOW: f32 = 15.0;
/// Glow radius (px) of food
pub const FOOD_GLOW: f32 = 10.0;
/// Gap left between neighbouring cells (px)
pub const CELL_GAP: f32 = 2.0;

/// Drawing primitives a frame needs
pub trait RenderSurface {
    fn clear(&mut self, width: f32, height: f32, color: Color);
    fn grid_line(&mut self, from: Vec2, to: Vec2, color: Color);
    /// Fill a square with its top-left corner at `origin`; `glow` is a blur radius
    fn fill_cell(&mut self, origin: Vec2, size: f32, color: Color, glow: f32);
}

/// Draw one frame of `state`.
///
/// Order: background, grid, obstacles, food, body, head last.
pub fn draw_frame<R: RenderSurface>(
    surface: &mut R,
    state: &GameState,
    palette: &Palette,
    cell_size: f32,
) {
    let width = state.grid.width as f32 * cell_size;
    let height = state.grid.height as f32 * cell_size;
    surface.clear(width, height, palette.background);

    for i in 0..=state.grid.width {
        let x = i as f32 * cell_size;
        surface.grid_line(Vec2::new(x, 0.0), Vec2::new(x, height), palette.grid_line);
    }
    for j in 0..=state.grid.height {
        let y = j as f32 * cell_size;
        surface.grid_line(Vec2::new(0.0, y), Vec2::new(width, y), palette.grid_line);
    }

    let size = (cell_size - CELL_GAP).max(1.0);
    let origin = |p: crate::sim::Point| Vec2::new(p.x as f32, p.y as f32) * cell_size;

    for obstacle in &state.obstacles {
        surface.fill_cell(origin(*obstacle), size, palette.obstacle, 0.0);
    }
    if let Some(food) = state.food {
        surface.fill_cell(origin(food), size, palette.food, FOOD_GLOW);
    }
    for segment in state.snake.iter().skip(1).rev() {
        surface.fill_cell(origin(*segment), size, palette.body, 0.0);
    }
    surface.fill_cell(origin(state.head()), size, palette.head, HEAD_GLOW);
}

/// A recorded drawing call
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear { width: f32, height: f32, color: Color },
    Line { from: Vec2, to: Vec2, color: Color },
    Cell { origin: Vec2, size: f32, color: Color, glow: f32 },
}

/// Surface that records commands instead of drawing
#[derive(Debug, Default)]
pub struct CommandBuffer {
    pub commands: Vec<DrawCommand>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filled cells, in draw order
    pub fn cells(&self) -> impl Iterator<Item = (Vec2, Color)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Cell { origin, color, .. } => Some((*origin, *color)),
            _ => None,
        })
    }
}

impl RenderSurface for CommandBuffer {
    fn clear(&mut self, width: f32, height: f32, color: Color) {
        self.commands.clear();
        self.commands.push(DrawCommand::Clear {
            width,
            height,
            color,
        });
    }

    fn grid_line(&mut self, from: Vec2, to: Vec2, color: Color) {
        self.commands.push(DrawCommand::Line { from, to, color });
    }

    fn fill_cell(&mut self, origin: Vec2, size: f32, color: Color, glow: f32) {
        self.commands.push(DrawCommand::Cell {
            origin,
            size,
            color,
            glow,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::CELL_SIZE;
    use crate::settings::GameConfig;
    use crate::sim::Point;

    #[test]
    fn test_color_css() {
        assert_eq!(Color::hex(0x8A2BE2).css(), "#8a2be2");
        assert_eq!(Palette::default().head, Color { r: 0x39, g: 0xff, b: 0x14 });
    }

    #[test]
    fn test_frame_layout() {
        let mut state = GameState::new(&GameConfig::default(), 3);
        state.snake = [Point::new(5, 5), Point::new(4, 5), Point::new(3, 5)].into();
        state.food = Some(Point::new(10, 2));
        state.obstacles = vec![Point::new(0, 0)];

        let palette = Palette::default();
        let mut buffer = CommandBuffer::new();
        draw_frame(&mut buffer, &state, &palette, CELL_SIZE as f32);

        assert!(matches!(
            buffer.commands[0],
            DrawCommand::Clear { width, .. } if width == 360.0
        ));
        let lines = buffer
            .commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { .. }))
            .count();
        assert_eq!(lines, 19 * 2);

        let cells: Vec<(Vec2, Color)> = buffer.cells().collect();
        assert_eq!(cells.len(), 5);
        assert_eq!(cells[0], (Vec2::ZERO, palette.obstacle));
        assert_eq!(cells[1], (Vec2::new(200.0, 40.0), palette.food));
        // Head drawn last so it sits on top
        assert_eq!(cells[4], (Vec2::new(100.0, 100.0), palette.head));
        assert_eq!(cells[2].1, palette.body);
    }

    #[test]
    fn test_buffer_reset_each_frame() {
        let state = GameState::new(&GameConfig::default(), 3);
        let mut buffer = CommandBuffer::new();
        draw_frame(&mut buffer, &state, &Palette::default(), 20.0);
        let first = buffer.commands.len();
        draw_frame(&mut buffer, &state, &Palette::default(), 20.0);
        assert_eq!(buffer.commands.len(), first);
    }
}
