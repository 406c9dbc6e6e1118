//! Switch joint change extraction for one location track
//!
//! The joints a track is linked to are collected from both compared states: joints
//! at the ends of segments linked to a switch, and the presentation joint of a switch
//! the track topologically starts or ends at. The two collections are then compared
//! independently in both directions: joints whose number disappeared are reported as
//! removed, joints that are new or sit at a new address are reported as changed.

use crate::address::TrackMeter;
use crate::changes::{SwitchChange, SwitchJointChange, merge_switch_changes};
use crate::geocoding::GeocodingContext;
use crate::layout::{
    ExternalIds, LayoutAlignment, LayoutSegment, LayoutSwitch, LocationTrack, SwitchId,
    SwitchJoint, SwitchStructure, SwitchStructureId,
};
use crate::{ChangeError, Result};
use geo::Coord;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};

/// A switch joint as observed on a track: the joint, the track point it is linked at
/// and that point's address
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SwitchJointData {
    pub joint: SwitchJoint,
    pub address: TrackMeter,
    pub point: Coord<f64>,
}

/// Joints observed on one track, grouped by switch
pub(crate) type TrackSwitchJoints = BTreeMap<SwitchId, SmallVec<[SwitchJointData; 4]>>;

/// One compared state of a location track
#[derive(Clone, Copy)]
pub struct TrackState<'a> {
    pub track: &'a LocationTrack,
    pub alignment: &'a LayoutAlignment,
    pub context: &'a dyn GeocodingContext,
}

/// Collect the switch joints linked to a track in one state
///
/// Segments referring to a switch that no longer resolves are skipped. A topology link
/// only counts when it points at the presentation joint of the switch.
pub(crate) fn collect_switch_joints<FS, FT>(
    state: TrackState<'_>,
    fetch_switch: FS,
    fetch_structure: FT,
) -> Result<TrackSwitchJoints>
where
    FS: Fn(SwitchId) -> Result<Option<LayoutSwitch>>,
    FT: Fn(SwitchStructureId) -> Result<Option<SwitchStructure>>,
{
    let mut switches: HashMap<SwitchId, Option<LayoutSwitch>> = HashMap::new();
    let mut lookup = |id: SwitchId| -> Result<Option<LayoutSwitch>> {
        if let Some(switch) = switches.get(&id) {
            return Ok(switch.clone());
        }
        let switch = fetch_switch(id)?;
        switches.insert(id, switch.clone());
        Ok(switch)
    };

    let mut joints = TrackSwitchJoints::new();

    for segment in &state.alignment.segments {
        let Some(switch_id) = segment.switch_id else {
            continue;
        };
        let Some(switch) = lookup(switch_id)? else {
            tracing::debug!(
                "Skipping segment of track {} linked to missing switch {}",
                state.track.id,
                switch_id
            );
            continue;
        };
        let matching = matching_joints(segment, &switch, state.context);
        if !matching.is_empty() {
            joints.entry(switch.id).or_default().extend(matching);
        }
    }

    for (link, point) in state.track.topology_links(state.alignment) {
        let Some(switch) = lookup(link.switch_id)? else {
            continue;
        };
        let structure = fetch_structure(switch.structure_id)?
            .ok_or(ChangeError::MissingSwitchStructure(switch.structure_id))?;
        let joint = switch
            .joint(link.joint_number)
            .ok_or(ChangeError::InvalidTopologyJoint {
                switch_id: link.switch_id,
                joint_number: link.joint_number,
            })?;
        if structure.presentation_joint_number != joint.number {
            continue;
        }
        if let Some(address) = state.context.address(point) {
            joints.entry(link.switch_id).or_default().push(SwitchJointData {
                joint: *joint,
                address,
                point,
            });
        }
    }

    Ok(joints)
}

/// Joints of a switch located at either end of a segment linked to it
fn matching_joints(
    segment: &LayoutSegment,
    switch: &LayoutSwitch,
    context: &dyn GeocodingContext,
) -> SmallVec<[SwitchJointData; 4]> {
    switch
        .joints
        .iter()
        .filter_map(|joint| {
            let point = match Some(joint.number) {
                number if number == segment.start_joint_number => segment.start(),
                number if number == segment.end_joint_number => segment.end(),
                _ => None,
            }?;
            let address = context.address(point)?;
            Some(SwitchJointData {
                joint: *joint,
                address,
                point,
            })
        })
        .collect()
}

/// Joints of `joints` that have no counterpart in `others` for the same switch
fn joint_differences<'a>(
    joints: &'a TrackSwitchJoints,
    others: &TrackSwitchJoints,
    same: impl Fn(&SwitchJointData, &SwitchJointData) -> bool,
) -> Vec<(SwitchId, Vec<&'a SwitchJointData>)> {
    joints
        .iter()
        .map(|(switch_id, switch_joints)| {
            let remaining: Vec<&SwitchJointData> = match others.get(switch_id) {
                Some(other_joints) => switch_joints
                    .iter()
                    .filter(|joint| !other_joints.iter().any(|other| same(joint, other)))
                    .collect(),
                None => switch_joints.iter().collect(),
            };
            (*switch_id, remaining)
        })
        .filter(|(_, remaining)| !remaining.is_empty())
        .collect()
}

fn joint_change(
    data: &SwitchJointData,
    is_removed: bool,
    track: &LocationTrack,
    external_ids: &ExternalIds,
) -> SwitchJointChange {
    SwitchJointChange {
        number: data.joint.number,
        is_removed,
        address: data.address.clone(),
        point: data.point,
        location_track_id: track.id,
        location_track_external_id: external_ids.location_track(track.id).cloned(),
        track_number_id: track.track_number_id,
        track_number_external_id: external_ids.track_number(track.track_number_id).cloned(),
    }
}

/// Switch changes implied by the difference between two states of one track
///
/// Removal is matched by joint number only and is attributed to the old track;
/// change is matched by joint and address and is attributed to the current track.
/// A joint that moved is therefore reported as changed, and a joint that moved to
/// another track is reported as removed on the old one.
pub(crate) fn track_switch_changes(
    old: Option<(&LocationTrack, &TrackSwitchJoints)>,
    current: (&LocationTrack, &TrackSwitchJoints),
    external_ids: &ExternalIds,
) -> Vec<SwitchChange> {
    let (current_track, current_joints) = current;
    let empty = TrackSwitchJoints::new();
    let old_joints = old.map_or(&empty, |(_, joints)| joints);

    let removed = old.into_iter().flat_map(|(old_track, _)| {
        joint_differences(old_joints, current_joints, |joint, other| {
            joint.joint.number == other.joint.number
        })
        .into_iter()
        .map(move |(switch_id, joints)| SwitchChange {
            switch_id,
            changed_joints: joints
                .into_iter()
                .map(|data| joint_change(data, true, old_track, external_ids))
                .collect(),
        })
    });

    let changed = joint_differences(current_joints, old_joints, |joint, other| {
        joint.joint == other.joint && joint.address.is_same(&other.address)
    })
    .into_iter()
    .map(|(switch_id, joints)| SwitchChange {
        switch_id,
        changed_joints: joints
            .into_iter()
            .map(|data| joint_change(data, false, current_track, external_ids))
            .collect(),
    });

    merge_switch_changes(
        removed
            .chain(changed)
            .filter(|change| !change.changed_joints.is_empty()),
    )
}

/// Every joint linked to a track, reported as a non-removed change
pub(crate) fn all_joint_changes(
    track: &LocationTrack,
    joints: &TrackSwitchJoints,
    external_ids: &ExternalIds,
) -> Vec<SwitchChange> {
    merge_switch_changes(joints.iter().map(|(switch_id, switch_joints)| SwitchChange {
        switch_id: *switch_id,
        changed_joints: switch_joints
            .iter()
            .map(|data| joint_change(data, false, track, external_ids))
            .collect(),
    }))
}
