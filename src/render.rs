//! Optional render side channel of the episode driver.
//!
//! Rendering never influences the simulation. A failing renderer is logged and ignored.

use std::io::{self, Write};

use crate::simulation::{Geometry, SimulationState};

pub trait Renderer: Send {
    /// Draw one frame.
    fn render(&mut self, state: &SimulationState) -> io::Result<()>;

    /// Called once when an episode is torn down.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self, _state: &SimulationState) -> io::Result<()> {
        Ok(())
    }
}

/// Coarse ASCII view of the pitch: `|` goal line, `#` bar, `o` puck.
pub struct TextRenderer<W: Write + Send> {
    out: W,
    geometry: Geometry,
    columns: usize,
    rows: usize,
}

impl<W: Write + Send> TextRenderer<W> {
    pub fn new(out: W, geometry: Geometry) -> Self {
        Self {
            out,
            geometry,
            columns: 64,
            rows: 24,
        }
    }

    pub fn with_size(mut self, columns: usize, rows: usize) -> Self {
        self.columns = columns.max(2);
        self.rows = rows.max(2);
        self
    }

    fn column(&self, x: f64) -> usize {
        scale(x, self.columns)
    }

    fn row(&self, y: f64) -> usize {
        scale(y, self.rows)
    }

    /// The frame as text, one line per row, top row is y = -1.
    pub fn frame(&self, state: &SimulationState) -> String {
        let mut grid = vec![vec![' '; self.columns]; self.rows];

        let goal = self.column(self.geometry.goal_x);
        for row in grid.iter_mut() {
            row[goal] = '|';
        }

        let (bar_x, bar_y) = state.bar_position;
        let half = self.geometry.bar_length / 2.0;
        let bar_col = self.column(bar_x);
        for row in self.row(bar_y - half)..=self.row(bar_y + half) {
            grid[row][bar_col] = '#';
        }

        let (puck_x, puck_y) = state.puck_position;
        grid[self.row(puck_y)][self.column(puck_x)] = 'o';

        let mut text = String::with_capacity((self.columns + 1) * self.rows);
        for row in grid {
            text.extend(row);
            text.push('\n');
        }
        text
    }
}

fn scale(v: f64, cells: usize) -> usize {
    let cell = ((v.clamp(-1.0, 1.0) + 1.0) / 2.0 * cells as f64) as usize;
    cell.min(cells - 1)
}

impl<W: Write + Send> Renderer for TextRenderer<W> {
    fn render(&mut self, state: &SimulationState) -> io::Result<()> {
        let frame = self.frame(state);
        writeln!(
            self.out,
            "step {:>3}  theta {:.0}  v_ind {:+}",
            state.step_count, state.theta, state.velocity_indicator
        )?;
        self.out.write_all(frame.as_bytes())?;
        self.out.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_frame_shows_everything() {
        let geometry = Geometry::default();
        let renderer = TextRenderer::new(Vec::new(), geometry).with_size(40, 20);
        let frame = renderer.frame(&geometry.start_state());
        let lines: Vec<&str> = frame.lines().collect();
        assert_eq!(lines.len(), 20);
        assert_eq!(frame.matches('o').count(), 1);
        assert!(frame.contains('#'));
        assert!(lines.iter().all(|l| l.contains('|') || l.contains('#')));
        // puck on the left half, middle row
        let puck_line = lines.iter().position(|l| l.contains('o')).unwrap();
        assert_eq!(puck_line, 10);
        assert!(lines[puck_line].find('o').unwrap() < 20);
    }

    #[test]
    fn render_writes_header_and_frame() {
        let geometry = Geometry::default();
        let mut renderer = TextRenderer::new(Vec::new(), geometry).with_size(10, 4);
        renderer.render(&geometry.start_state()).unwrap();
        let text = String::from_utf8(renderer.out.clone()).unwrap();
        assert!(text.starts_with("step   0"));
        assert_eq!(text.lines().count(), 5);
    }
}
