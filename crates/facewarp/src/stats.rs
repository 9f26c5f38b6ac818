//! Frame rate and per-stage timing of the render loop.

use std::{
    fmt,
    time::{Duration, Instant},
};

/// Weight of the newest measurement in a stage's moving average.
const EMA_ALPHA: f32 = 0.3;

/// How often [`FrameStats::end_frame`] produces a report.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// A timed part of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Detect,
    Draw,
    Capture,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Upload, Stage::Detect, Stage::Draw, Stage::Capture];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Detect => "detect",
            Stage::Draw => "draw",
            Stage::Capture => "capture",
        }
    }
}

/// Moving average of a stage in milliseconds, `None` until the first measurement.
#[derive(Debug, Clone, Copy, Default)]
struct StageTime {
    avg_ms: Option<f32>,
}

/// Counts frames and averages stage durations between two reports.
#[derive(Debug)]
pub struct FrameStats {
    frames: u32,
    since: Option<Instant>,
    stages: [StageTime; Stage::ALL.len()],
}

/// Summary of the frames since the previous report.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub fps: f32,
    /// Average milliseconds per stage, in [`Stage::ALL`] order. `None` for stages that did not
    /// run.
    pub stages: [Option<f32>; Stage::ALL.len()],
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} fps", self.fps)?;
        for (stage, avg) in Stage::ALL.iter().zip(&self.stages) {
            if let Some(avg) = avg {
                write!(f, ", {} {avg:.1}ms", stage.as_str())?;
            }
        }
        Ok(())
    }
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            frames: 0,
            since: None,
            stages: [StageTime::default(); Stage::ALL.len()],
        }
    }

    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let ms = elapsed.as_secs_f32() * 1000.0;
        let time = &mut self.stages[stage as usize];
        time.avg_ms = Some(match time.avg_ms {
            Some(prev) => EMA_ALPHA * ms + (1.0 - EMA_ALPHA) * prev,
            None => ms,
        });
    }

    /// Runs `f` and records how long it took.
    pub fn measure<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let res = f();
        self.record(stage, start.elapsed());
        res
    }

    /// Counts a finished frame at `now`.
    ///
    /// Once a report interval has passed since the first frame counted, returns the summary of
    /// all frames since then and starts over.
    pub fn end_frame(&mut self, now: Instant) -> Option<Report> {
        self.frames += 1;
        let since = *self.since.get_or_insert(now);
        let elapsed = now.saturating_duration_since(since);
        if elapsed < REPORT_INTERVAL {
            return None;
        }

        let report = Report {
            fps: self.frames as f32 / elapsed.as_secs_f32(),
            stages: self.stages.map(|time| time.avg_ms),
        };
        *self = Self::new();
        self.since = Some(now);
        Some(report)
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_average_favors_older_samples() {
        let mut stats = FrameStats::new();
        stats.record(Stage::Draw, Duration::from_millis(10));
        stats.record(Stage::Draw, Duration::from_millis(20));
        assert_eq!(stats.measure(Stage::Upload, || 7), 7);

        let start = Instant::now();
        assert_eq!(stats.end_frame(start), None);
        let report = stats.end_frame(start + Duration::from_secs(2)).unwrap();
        assert_eq!(report.fps, 1.0);
        assert_eq!(report.stages[Stage::Detect as usize], None);
        // 0.3 * 20 + 0.7 * 10
        let draw = report.stages[Stage::Draw as usize].unwrap();
        assert!((draw - 13.0).abs() < 1e-4, "{draw}");
        assert!(report.stages[Stage::Upload as usize].is_some());
    }

    #[test]
    fn reports_once_per_interval() {
        let mut stats = FrameStats::new();
        let start = Instant::now();
        let reports = (0..=60)
            .filter_map(|i| stats.end_frame(start + Duration::from_millis(i * 50)))
            .collect::<Vec<_>>();
        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].fps, 21.0);
        // The frame that closed a report is not counted again.
        assert_eq!(reports[1].fps, 20.0);
        assert_eq!(reports[0].to_string(), "21 fps");
    }

    #[test]
    fn report_lists_stages_that_ran() {
        let report = Report {
            fps: 29.6,
            stages: [Some(1.24), None, Some(4.0), None],
        };
        assert_eq!(report.to_string(), "30 fps, upload 1.2ms, draw 4.0ms");
    }
}
