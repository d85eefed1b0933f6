use crate::error::{StillcastError, StillcastResult};

/// What the renderer shows at a given output time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FramePlan {
    /// A single clip, no transition in progress.
    Hold(usize),
    /// Crossfade between two adjacent clips; `t` is the normalized progress
    /// into the fade window (0 = all `from`, 1 = all `to`).
    Blend { from: usize, to: usize, t: f64 },
}

/// Placement of per-track clips on the output timeline. Clip `i + 1` starts
/// `fade_sec` before clip `i` ends, so adjacent clips overlap for exactly one
/// fade window.
#[derive(Clone, Debug)]
pub struct PlaylistLayout {
    starts_sec: Vec<f64>,
    durations_sec: Vec<f64>,
    fade_sec: f64,
    total_sec: f64,
}

impl PlaylistLayout {
    pub fn plan(durations_sec: &[f64], fade_sec: f64) -> StillcastResult<Self> {
        if durations_sec.is_empty() {
            return Err(StillcastError::validation(
                "playlist must contain at least one clip",
            ));
        }
        if !(fade_sec.is_finite() && fade_sec >= 0.0) {
            return Err(StillcastError::validation(
                "crossfade duration must be finite and >= 0",
            ));
        }
        for (idx, &dur) in durations_sec.iter().enumerate() {
            if !(dur.is_finite() && dur > 0.0) {
                return Err(StillcastError::validation(format!(
                    "clip {idx} duration must be finite and > 0, got {dur}"
                )));
            }
            if fade_sec > dur {
                return Err(StillcastError::validation(format!(
                    "crossfade ({fade_sec}s) exceeds clip {idx} duration ({dur}s)"
                )));
            }
        }

        let mut starts_sec = Vec::with_capacity(durations_sec.len());
        let mut cursor = 0.0f64;
        for &dur in durations_sec {
            starts_sec.push(cursor);
            cursor += dur - fade_sec;
        }
        let total_sec = cursor + fade_sec;

        Ok(Self {
            starts_sec,
            durations_sec: durations_sec.to_vec(),
            fade_sec,
            total_sec,
        })
    }

    pub fn clip_count(&self) -> usize {
        self.durations_sec.len()
    }

    pub fn fade_sec(&self) -> f64 {
        self.fade_sec
    }

    pub fn total_sec(&self) -> f64 {
        self.total_sec
    }

    pub fn start_sec(&self, clip: usize) -> f64 {
        self.starts_sec[clip]
    }

    pub fn duration_sec(&self, clip: usize) -> f64 {
        self.durations_sec[clip]
    }

    pub fn total_frames(&self, fps: u32) -> u64 {
        (self.total_sec * f64::from(fps)).ceil() as u64
    }

    /// Resolve the frame plan at output time `t_sec`. Times beyond the end
    /// hold the last clip.
    pub fn at(&self, t_sec: f64) -> FramePlan {
        let n = self.starts_sec.len();
        let t = t_sec.max(0.0);

        // Last clip whose start is <= t.
        let mut idx = 0;
        for (i, &start) in self.starts_sec.iter().enumerate() {
            if start <= t {
                idx = i;
            } else {
                break;
            }
        }

        // Inside the overlap window the incoming clip has already started, so
        // `idx` points at it and the outgoing clip is still on screen.
        if self.fade_sec > 0.0 && idx > 0 && idx < n {
            let prev_end = self.starts_sec[idx - 1] + self.durations_sec[idx - 1];
            if t < prev_end {
                let t_norm = (t - self.starts_sec[idx]) / self.fade_sec;
                return FramePlan::Blend {
                    from: idx - 1,
                    to: idx,
                    t: t_norm.clamp(0.0, 1.0),
                };
            }
        }

        FramePlan::Hold(idx)
    }
}
