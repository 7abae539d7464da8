//! Renderer contract and a headless implementation

use tracing::{debug, info};

use super::sync::RenderFrame;
use crate::ws::protocol::SimConfig;

/// Draws one frame. Positions arrive in metres; scale with
/// `SimConfig::to_pixels` for screen space.
pub trait Renderer: Send {
    fn draw(&mut self, frame: &RenderFrame, config: &SimConfig);
}

/// Logs the interpolated scene instead of drawing it
#[derive(Debug)]
pub struct TracingRenderer {
    frames: u64,
    /// Emit a summary at `info` every this many frames
    summary_every: u64,
}

impl TracingRenderer {
    pub fn new(summary_every: u64) -> Self {
        Self {
            frames: 0,
            summary_every: summary_every.max(1),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Default for TracingRenderer {
    fn default() -> Self {
        Self::new(60)
    }
}

impl Renderer for TracingRenderer {
    fn draw(&mut self, frame: &RenderFrame, config: &SimConfig) {
        self.frames += 1;

        let state = match frame {
            RenderFrame::Connecting => {
                if self.frames % self.summary_every == 1 {
                    info!("Connecting...");
                }
                return;
            }
            RenderFrame::Interpolated(state) => state,
        };

        let ball_px = (config.to_pixels(state.ball.x), config.to_pixels(state.ball.y));
        debug!(frame = self.frames, ball_x = ball_px.0, ball_y = ball_px.1, "Frame");

        if self.frames % self.summary_every == 0 {
            let me = state
                .players
                .get(&state.me)
                .map(|p| (config.to_pixels(p.x), config.to_pixels(p.y)));
            info!(
                phase = ?state.phase,
                red = state.score.red,
                blue = state.score.blue,
                time_left_s = state.time_left_ms / 1000,
                winner = ?state.winner,
                players = state.players.len(),
                ball = ?ball_px,
                me = ?me,
                "Match"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames_including_connecting() {
        let mut renderer = TracingRenderer::new(0);
        let config = SimConfig::default();
        renderer.draw(&RenderFrame::Connecting, &config);
        renderer.draw(&RenderFrame::Connecting, &config);
        assert_eq!(renderer.frames(), 2);
    }
}
