//! The timeline cursor.

use chronoweave_core::event::{Season, TimelinePoint};

use super::config::{BatchMode, SimulationConfig};

/// The ordered steps a run walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    start_year: i32,
    end_year: i32,
    mode: BatchMode,
}

impl Timeline {
    /// The timeline described by `config`.
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            start_year: config.start_year,
            end_year: config.end_year,
            mode: config.batch_mode,
        }
    }

    /// Steps in strictly increasing chronological order.
    pub fn points(&self) -> impl Iterator<Item = TimelinePoint> + use<> {
        let mode = self.mode;
        (self.start_year..=self.end_year).flat_map(move |year| {
            let seasons: &'static [Option<Season>] = match mode {
                BatchMode::Quality => &[
                    Some(Season::Spring),
                    Some(Season::Summer),
                    Some(Season::Autumn),
                    Some(Season::Winter),
                ],
                BatchMode::Speed => &[None],
            };
            seasons
                .iter()
                .map(move |season| TimelinePoint { year, season: *season })
        })
    }

    /// Number of steps in the timeline.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        let years = usize::try_from(self.end_year - self.start_year + 1).unwrap_or(0);
        match self.mode {
            BatchMode::Quality => years * Season::ALL.len(),
            BatchMode::Speed => years,
        }
    }

    /// Returns `true` when `point` is the last step of its year.
    #[must_use]
    pub fn ends_year(point: TimelinePoint) -> bool {
        point.season.is_none_or(|season| season == Season::Winter)
    }

    /// Whole years completed once `year` ends, counting from the start year.
    #[must_use]
    pub fn years_elapsed(&self, year: i32) -> u32 {
        u32::try_from(year - self.start_year + 1).unwrap_or(0)
    }
}
