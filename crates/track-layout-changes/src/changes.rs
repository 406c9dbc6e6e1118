//! Calculated change results and their merging
//!
//! The same entity is usually discovered by several independent paths (a direct
//! edit, a reference line change reaching it, a switch linked to it). Merging folds
//! those into one entry per entity id with commutative, associative combination, so
//! partial results can be merged in any order and still produce identical output.

use crate::address::{KmNumber, TrackMeter};
use crate::diff::AddressChanges;
use crate::layout::{
    ExternalIds, JointNumber, KmPostId, LocationTrackId, Oid, ReferenceLineId, SwitchId,
    TrackNumberId,
};
use crate::{ChangeError, Result};
use geo::Coord;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The entities a calculation is asked about
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangeRequest {
    pub track_numbers: Vec<TrackNumberId>,
    pub reference_lines: Vec<ReferenceLineId>,
    pub km_posts: Vec<KmPostId>,
    pub location_tracks: Vec<LocationTrackId>,
    pub switches: Vec<SwitchId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackNumberChange {
    pub track_number_id: TrackNumberId,
    pub changed_km_numbers: BTreeSet<KmNumber>,
    pub is_start_changed: bool,
    pub is_end_changed: bool,
}

impl TrackNumberChange {
    pub fn new(track_number_id: TrackNumberId, address_changes: AddressChanges) -> Self {
        Self {
            track_number_id,
            changed_km_numbers: address_changes.changed_km_numbers,
            is_start_changed: address_changes.start_point_changed,
            is_end_changed: address_changes.end_point_changed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationTrackChange {
    pub location_track_id: LocationTrackId,
    pub changed_km_numbers: BTreeSet<KmNumber>,
    pub is_start_changed: bool,
    pub is_end_changed: bool,
}

impl LocationTrackChange {
    pub fn new(location_track_id: LocationTrackId, address_changes: AddressChanges) -> Self {
        Self {
            location_track_id,
            changed_km_numbers: address_changes.changed_km_numbers,
            is_start_changed: address_changes.start_point_changed,
            is_end_changed: address_changes.end_point_changed,
        }
    }
}

/// Before/after delta of one switch joint, as observed on one location track
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SwitchJointChange {
    pub number: JointNumber,
    pub is_removed: bool,
    pub address: TrackMeter,
    pub point: Coord<f64>,
    pub location_track_id: LocationTrackId,
    pub location_track_external_id: Option<Oid>,
    pub track_number_id: TrackNumberId,
    pub track_number_external_id: Option<Oid>,
}

impl SwitchJointChange {
    /// Total order used to keep merged joint lists deterministic
    fn order(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then(self.location_track_id.cmp(&other.location_track_id))
            .then(self.is_removed.cmp(&other.is_removed))
            .then(
                self.address
                    .partial_cmp(&other.address)
                    .unwrap_or(Ordering::Equal),
            )
            .then(self.point.x.total_cmp(&other.point.x))
            .then(self.point.y.total_cmp(&other.point.y))
            .then(self.track_number_id.cmp(&other.track_number_id))
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SwitchChange {
    pub switch_id: SwitchId,
    pub changed_joints: Vec<SwitchJointChange>,
}

impl SwitchChange {
    /// A switch reported as touched, without geometry-derived joint detail
    pub fn touched(switch_id: SwitchId) -> Self {
        Self {
            switch_id,
            changed_joints: Vec::new(),
        }
    }
}

/// Result of one change calculation, each list sorted by entity id
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalculatedChanges {
    pub track_number_changes: Vec<TrackNumberChange>,
    pub location_track_changes: Vec<LocationTrackChange>,
    pub switch_changes: Vec<SwitchChange>,
}

/// Calculated changes partitioned by whether the request named the entity
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitChanges {
    pub direct: CalculatedChanges,
    pub indirect: CalculatedChanges,
}

impl CalculatedChanges {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.track_number_changes.is_empty()
            && self.location_track_changes.is_empty()
            && self.switch_changes.is_empty()
    }

    /// Check that no entity appears twice in the same list
    pub fn validate(&self) -> Result<()> {
        check_unique(
            "track number",
            self.track_number_changes.iter().map(|c| c.track_number_id),
        )?;
        check_unique(
            "location track",
            self.location_track_changes
                .iter()
                .map(|c| c.location_track_id),
        )?;
        check_unique("switch", self.switch_changes.iter().map(|c| c.switch_id))
    }

    /// Partition into entities named by the request and those found by propagation
    ///
    /// Track numbers reached through a requested km post or reference line count as
    /// indirect.
    pub fn split_by_request(&self, request: &ChangeRequest) -> SplitChanges {
        let (direct_tns, indirect_tns) = self
            .track_number_changes
            .iter()
            .cloned()
            .partition(|c| request.track_numbers.contains(&c.track_number_id));
        let (direct_lts, indirect_lts) = self
            .location_track_changes
            .iter()
            .cloned()
            .partition(|c| request.location_tracks.contains(&c.location_track_id));
        let (direct_switches, indirect_switches) = self
            .switch_changes
            .iter()
            .cloned()
            .partition(|c| request.switches.contains(&c.switch_id));
        SplitChanges {
            direct: CalculatedChanges {
                track_number_changes: direct_tns,
                location_track_changes: direct_lts,
                switch_changes: direct_switches,
            },
            indirect: CalculatedChanges {
                track_number_changes: indirect_tns,
                location_track_changes: indirect_lts,
                switch_changes: indirect_switches,
            },
        }
    }

    /// Drop entities that have never been synced to the external register
    pub fn retain_registered(&mut self, external_ids: &ExternalIds) {
        self.track_number_changes
            .retain(|c| external_ids.track_number(c.track_number_id).is_some());
        self.location_track_changes
            .retain(|c| external_ids.location_track(c.location_track_id).is_some());
        self.switch_changes
            .retain(|c| external_ids.switch(c.switch_id).is_some());
    }
}

fn check_unique<T>(kind: &'static str, ids: impl Iterator<Item = T>) -> Result<()>
where
    T: std::hash::Hash + Eq + std::fmt::Display,
{
    let mut seen = HashSet::new();
    for id in ids {
        if let Some(id) = seen.replace(id) {
            return Err(ChangeError::DuplicateChange {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Merge track number changes by id: union of kilometers, OR of end flags
pub fn merge_track_number_changes(
    changes: impl IntoIterator<Item = TrackNumberChange>,
) -> Vec<TrackNumberChange> {
    let mut merged: BTreeMap<TrackNumberId, TrackNumberChange> = BTreeMap::new();
    for change in changes {
        match merged.get_mut(&change.track_number_id) {
            Some(existing) => {
                existing.changed_km_numbers.extend(change.changed_km_numbers);
                existing.is_start_changed |= change.is_start_changed;
                existing.is_end_changed |= change.is_end_changed;
            }
            None => {
                merged.insert(change.track_number_id, change);
            }
        }
    }
    merged.into_values().collect()
}

/// Merge location track changes by id: union of kilometers, OR of end flags
pub fn merge_location_track_changes(
    changes: impl IntoIterator<Item = LocationTrackChange>,
) -> Vec<LocationTrackChange> {
    let mut merged: BTreeMap<LocationTrackId, LocationTrackChange> = BTreeMap::new();
    for change in changes {
        match merged.get_mut(&change.location_track_id) {
            Some(existing) => {
                existing.changed_km_numbers.extend(change.changed_km_numbers);
                existing.is_start_changed |= change.is_start_changed;
                existing.is_end_changed |= change.is_end_changed;
            }
            None => {
                merged.insert(change.location_track_id, change);
            }
        }
    }
    merged.into_values().collect()
}

/// Merge switch changes by id into the union of their distinct joint changes
pub fn merge_switch_changes(changes: impl IntoIterator<Item = SwitchChange>) -> Vec<SwitchChange> {
    let mut joints_by_switch: BTreeMap<SwitchId, Vec<SwitchJointChange>> = BTreeMap::new();
    for change in changes {
        let joints = joints_by_switch.entry(change.switch_id).or_default();
        for joint in change.changed_joints {
            if !joints.contains(&joint) {
                joints.push(joint);
            }
        }
    }
    joints_by_switch
        .into_iter()
        .map(|(switch_id, mut changed_joints)| {
            changed_joints.sort_by(SwitchJointChange::order);
            SwitchChange {
                switch_id,
                changed_joints,
            }
        })
        .collect()
}
