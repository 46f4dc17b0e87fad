//! Turns per-tick blob centroids into touches with stable ids.
//!
//! Every detection is matched to the nearest tracked object within
//! `distance_threshold`. Unmatched detections become candidates; a candidate
//! that keeps being matched for `raise_after_ticks` ticks is confirmed and
//! becomes visible to consumers. An object that goes `eliminate_after_ticks`
//! ticks without a match is eliminated and its id reported once, so that
//! consumers can retire the touch.
//!
//! Objects live in an arena indexed by id. An object's [`Lifecycle`] says
//! whether it is still a candidate or already confirmed, so there is no
//! second collection to keep in sync.

use crate::Point;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

/// Tuning for a [`Tracker`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Largest distance, in surface pixels, at which a detection still
    /// matches an existing object.
    pub distance_threshold: f32,
    /// Ticks without a match after which an object is eliminated.
    pub eliminate_after_ticks: u8,
    /// Ticks of continued matching after which a candidate is confirmed.
    pub raise_after_ticks: u8,
    /// Size of the id pool.
    pub max_objects: u8,
    /// Fraction of the remaining distance the reported position moves
    /// towards the matched position on each pull.
    pub smoothing: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 15.0,
            eliminate_after_ticks: 4,
            raise_after_ticks: 4,
            max_objects: 10,
            smoothing: 0.2,
        }
    }
}

/// Where an object is in its life.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lifecycle {
    /// Seen, but not yet long enough to be reported.
    Candidate {
        /// Ticks on which the candidate has been matched since it appeared.
        candidate_age: u8,
    },
    /// Reported to consumers.
    Confirmed {
        /// The position consumers see.
        smoothed: Point,
    },
}

/// One tracked object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedObject {
    /// Id in `[0, max_objects)`.
    pub id: u8,
    /// Latest matched detection; used for matching, never smoothed.
    pub position: Point,
    /// Candidate or confirmed.
    pub state: Lifecycle,
    /// Ticks since the object was last matched.
    pub life_age: u8,
}

impl TrackedObject {
    /// Whether the object is still a candidate.
    pub fn is_candidate(&self) -> bool {
        matches!(self.state, Lifecycle::Candidate { .. })
    }
}

/// A confirmed touch as consumers see it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    /// Stable id.
    pub id: u8,
    /// Smoothed position.
    pub position: Point,
}

/// What changed for consumers on one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerDelta {
    /// Every confirmed touch, ordered by id.
    pub confirmed: Vec<Touch>,
    /// Ids eliminated by the last tick.
    pub eliminated: Vec<u8>,
}

/// The multi-object tracker.
#[derive(Debug, Clone)]
pub struct Tracker {
    config: TrackerConfig,
    slots: Vec<Option<TrackedObject>>,
    eliminated: Vec<u8>,
    dropped: u64,
}

impl Tracker {
    /// Instantiates an empty tracker.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            slots: vec![None; config.max_objects as usize],
            eliminated: Vec::new(),
            dropped: 0,
        }
    }

    /// The tracker's tuning.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Detections dropped because the id pool was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Every live object, candidates included, ordered by id.
    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.slots.iter().flatten()
    }

    /// Looks up a live object by id.
    pub fn object(&self, id: u8) -> Option<&TrackedObject> {
        self.slots.get(id as usize).and_then(Option::as_ref)
    }

    /// Ids eliminated by the last [`Tracker::tick`].
    pub fn eliminated(&self) -> &[u8] {
        &self.eliminated
    }

    fn nearest(&self, point: Point) -> Option<(usize, f32)> {
        self.objects()
            .map(|o| (o.id as usize, o.position.distance(&point)))
            .fold(None, |best, (id, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((id, d)),
            })
    }

    /// Matches one detection. Returns the id it was assigned, or `None` if
    /// it was unmatched and the id pool is exhausted.
    pub fn update(&mut self, point: Point) -> Option<u8> {
        match self.nearest(point) {
            Some((slot, d)) if d <= self.config.distance_threshold => {
                let object = self.slots[slot].as_mut()?;
                if let Lifecycle::Candidate { candidate_age } = &mut object.state {
                    *candidate_age = candidate_age.saturating_add(1);
                }
                object.life_age = 0;
                object.position = point;
                trace!("detection {} matched object {}", point, object.id);
                Some(object.id)
            }
            _ => {
                let Some(slot) = self.slots.iter().position(Option::is_none) else {
                    self.dropped += 1;
                    debug!("no free id for detection at {}", point);
                    return None;
                };
                let id = slot as u8;
                self.slots[slot] = Some(TrackedObject {
                    id,
                    position: point,
                    state: Lifecycle::Candidate { candidate_age: 0 },
                    life_age: 0,
                });
                debug!("new candidate {} at {}", id, point);
                Some(id)
            }
        }
    }

    /// Matches a tick's detections in order.
    pub fn update_all(&mut self, points: &[Point]) -> Vec<Option<u8>> {
        points.iter().map(|&p| self.update(p)).collect()
    }

    /// End-of-tick housekeeping: eliminate stale objects, confirm candidates
    /// that have lasted, then age everything that is left. Returns the ids
    /// eliminated on this tick.
    pub fn tick(&mut self) -> &[u8] {
        let TrackerConfig {
            eliminate_after_ticks,
            raise_after_ticks,
            ..
        } = self.config;

        self.eliminated.clear();
        for slot in &mut self.slots {
            if slot.is_some_and(|o| o.life_age >= eliminate_after_ticks) {
                if let Some(object) = slot.take() {
                    debug!("eliminated {}", object.id);
                    self.eliminated.push(object.id);
                }
            }
        }

        for object in self.slots.iter_mut().flatten() {
            if let Lifecycle::Candidate { candidate_age } = object.state {
                if candidate_age >= raise_after_ticks {
                    debug!("confirmed {} at {}", object.id, object.position);
                    object.state = Lifecycle::Confirmed {
                        smoothed: object.position,
                    };
                    object.life_age = 0;
                }
            }
        }

        for object in self.slots.iter_mut().flatten() {
            object.life_age = object.life_age.saturating_add(1);
        }

        &self.eliminated
    }

    /// Pulls the consumer view: each confirmed touch's reported position
    /// moves part of the way towards its latest match, and the ids from the
    /// last elimination are attached.
    pub fn delta(&mut self) -> TrackerDelta {
        let gain = self.config.smoothing;
        let confirmed = self
            .slots
            .iter_mut()
            .flatten()
            .filter_map(|object| match &mut object.state {
                Lifecycle::Confirmed { smoothed } => {
                    smoothed.x += (object.position.x - smoothed.x) * gain;
                    smoothed.y += (object.position.y - smoothed.y) * gain;
                    Some(Touch {
                        id: object.id,
                        position: *smoothed,
                    })
                }
                Lifecycle::Candidate { .. } => None,
            })
            .collect();

        TrackerDelta {
            confirmed,
            eliminated: self.eliminated.clone(),
        }
    }
}
