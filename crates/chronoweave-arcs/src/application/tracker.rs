//! The arc tracker.
//!
//! Owns every arc for one run and turns generator reports into ordered
//! [`ArcUpdate`]s. Reports are applied strictly in the order given, so when
//! several beats land in one batch they are fulfilled (and phases advanced)
//! in the order the generator listed them.

use chronoweave_core::generator::{ArcContext, BeatProgress, TensionReport};
use tracing::debug;

use crate::domain::arc::{BeatOutcome, CharacterArc, MasterArc};
use crate::domain::updates::{ArcChange, ArcUpdate};

/// Arc state for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArcTracker {
    arcs: Vec<CharacterArc>,
    master: Option<MasterArc>,
    seed_updates: Vec<ArcUpdate>,
}

impl ArcTracker {
    /// Takes ownership of the seeded arcs. Fulfillment is recomputed from
    /// the beats, so a seed's stored value is never trusted. Arcs seeded on
    /// a phase with nothing left to fulfill are advanced at once; those
    /// moves are held for [`ArcTracker::take_seed_updates`].
    #[must_use]
    pub fn new(arcs: Vec<CharacterArc>, master: Option<MasterArc>) -> Self {
        let mut arcs = arcs;
        let mut master = master;
        let mut seed_updates = Vec::new();
        for arc in &mut arcs {
            arc.refresh_fulfillment();
            if let Some(from) = arc.settle() {
                let to = arc.current_phase;
                debug!(character_id = %arc.character_id, from, to, "seeded arc advanced past complete phases");
                seed_updates.push(character_update(arc, ArcChange::PhaseAdvanced { from, to }, to));
            }
        }
        if let Some(master) = master.as_mut()
            && let Some(from) = master.settle()
        {
            let to = master.current_act;
            debug!(from, to, "seeded master arc advanced past complete acts");
            seed_updates.push(master_update(master, ArcChange::PhaseAdvanced { from, to }, to));
        }
        Self {
            arcs,
            master,
            seed_updates,
        }
    }

    /// Phase moves made while settling the seeded arcs. Drained on first call.
    pub fn take_seed_updates(&mut self) -> Vec<ArcUpdate> {
        std::mem::take(&mut self.seed_updates)
    }

    /// Character arcs in seed order.
    #[must_use]
    pub fn arcs(&self) -> &[CharacterArc] {
        &self.arcs
    }

    /// The arc for a character.
    #[must_use]
    pub fn arc(&self, character_id: &str) -> Option<&CharacterArc> {
        self.arcs.iter().find(|a| a.character_id == character_id)
    }

    /// The master arc, if the run has one.
    #[must_use]
    pub fn master(&self) -> Option<&MasterArc> {
        self.master.as_ref()
    }

    /// Generator context for a character's arc.
    #[must_use]
    pub fn context_for(&self, character_id: &str) -> Option<ArcContext> {
        self.arc(character_id).map(CharacterArc::context)
    }

    /// Generator context for the master arc.
    #[must_use]
    pub fn master_context(&self) -> Option<ArcContext> {
        self.master.as_ref().map(MasterArc::context)
    }

    /// Applies beat reports in order.
    pub fn apply_beats(&mut self, progress: &[BeatProgress]) -> Vec<ArcUpdate> {
        let mut updates = Vec::new();
        for report in progress {
            match report.character_id.as_deref() {
                Some(character_id) => self.apply_character_beat(character_id, &report.beat, &mut updates),
                None => self.apply_master_beat(&report.beat, &mut updates),
            }
        }
        updates
    }

    /// Applies tension readings in order, then the master reading.
    pub fn apply_tension(
        &mut self,
        reports: &[TensionReport],
        master_tension: Option<u8>,
    ) -> Vec<ArcUpdate> {
        let mut updates = Vec::new();
        for report in reports {
            let Some(arc) = self
                .arcs
                .iter_mut()
                .find(|a| a.character_id == report.character_id)
            else {
                debug!(character_id = %report.character_id, "tension report for untracked arc ignored");
                continue;
            };
            if let Some(previous) = arc.set_tension(report.tension) {
                updates.push(character_update(
                    arc,
                    ArcChange::TensionChanged {
                        from: previous,
                        to: arc.tension,
                    },
                    arc.current_phase,
                ));
            }
        }

        if let (Some(master), Some(tension)) = (self.master.as_mut(), master_tension) {
            if let Some(previous) = master.set_tension(tension) {
                updates.push(master_update(
                    master,
                    ArcChange::TensionChanged {
                        from: previous,
                        to: master.overall_tension,
                    },
                    master.current_act,
                ));
            }
        }
        updates
    }

    /// Releases the arcs for the run's final state.
    #[must_use]
    pub fn into_parts(self) -> (Vec<CharacterArc>, Option<MasterArc>) {
        (self.arcs, self.master)
    }

    fn apply_character_beat(&mut self, character_id: &str, beat: &str, updates: &mut Vec<ArcUpdate>) {
        let Some(arc) = self.arcs.iter_mut().find(|a| a.character_id == character_id) else {
            debug!(character_id, beat, "beat reported for untracked arc ignored");
            return;
        };
        match arc.fulfill_beat(beat) {
            BeatOutcome::Fulfilled {
                phase_index,
                beat,
                advanced_to,
            } => {
                updates.push(character_update(arc, ArcChange::BeatFulfilled { beat }, phase_index));
                if let Some(to) = advanced_to {
                    updates.push(character_update(
                        arc,
                        ArcChange::PhaseAdvanced {
                            from: phase_index,
                            to,
                        },
                        to,
                    ));
                }
            }
            BeatOutcome::NotPending => {
                debug!(character_id, beat, "beat not pending in current phase");
            }
        }
    }

    fn apply_master_beat(&mut self, beat: &str, updates: &mut Vec<ArcUpdate>) {
        let Some(master) = self.master.as_mut() else {
            debug!(beat, "master beat reported but run has no master arc");
            return;
        };
        match master.fulfill_beat(beat) {
            BeatOutcome::Fulfilled {
                phase_index,
                beat,
                advanced_to,
            } => {
                updates.push(master_update(master, ArcChange::BeatFulfilled { beat }, phase_index));
                if let Some(to) = advanced_to {
                    updates.push(master_update(
                        master,
                        ArcChange::PhaseAdvanced {
                            from: phase_index,
                            to,
                        },
                        to,
                    ));
                }
            }
            BeatOutcome::NotPending => {
                debug!(beat, "master beat not pending in current act");
            }
        }
    }
}

fn character_update(arc: &CharacterArc, change: ArcChange, phase_index: usize) -> ArcUpdate {
    ArcUpdate {
        character_id: Some(arc.character_id.clone()),
        change,
        phase_index,
        phase_name: arc.phases.get(phase_index).map(|p| p.name.clone()),
        tension: arc.tension,
        fulfillment: arc.fulfillment,
    }
}

fn master_update(master: &MasterArc, change: ArcChange, act_index: usize) -> ArcUpdate {
    ArcUpdate {
        character_id: None,
        change,
        phase_index: act_index,
        phase_name: master.acts.get(act_index).map(|a| a.name.clone()),
        tension: master.overall_tension,
        fulfillment: master.fulfillment(),
    }
}
