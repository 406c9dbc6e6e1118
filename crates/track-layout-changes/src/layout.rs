//! Layout entities consumed by change detection
//!
//! These are read-only snapshots of the rows a layout source hands out: location
//! tracks and their segmented alignments, switches with their joints, and the switch
//! structures that define which joint presents a switch.

use geo::{Coord, LineString};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! layout_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

layout_id!(
    /// Id of a track number (a named rail line owning one reference line)
    TrackNumberId
);
layout_id!(
    /// Id of a reference line
    ReferenceLineId
);
layout_id!(
    /// Id of a km post
    KmPostId
);
layout_id!(
    /// Id of a location track
    LocationTrackId
);
layout_id!(
    /// Id of a switch
    SwitchId
);
layout_id!(
    /// Id of a switch structure in the switch library
    SwitchStructureId
);
layout_id!(
    /// Number of a joint within a switch structure
    JointNumber
);

/// Identifier of an entity in the external asset register
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Oid(pub String);

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External register ids of the entities that have been synced at least once
#[derive(Clone, Debug, Default)]
pub struct ExternalIds {
    pub track_numbers: HashMap<TrackNumberId, Oid>,
    pub location_tracks: HashMap<LocationTrackId, Oid>,
    pub switches: HashMap<SwitchId, Oid>,
}

impl ExternalIds {
    pub fn is_empty(&self) -> bool {
        self.track_numbers.is_empty() && self.location_tracks.is_empty() && self.switches.is_empty()
    }

    #[inline]
    pub fn track_number(&self, id: TrackNumberId) -> Option<&Oid> {
        self.track_numbers.get(&id)
    }

    #[inline]
    pub fn location_track(&self, id: LocationTrackId) -> Option<&Oid> {
        self.location_tracks.get(&id)
    }

    #[inline]
    pub fn switch(&self, id: SwitchId) -> Option<&Oid> {
        self.switches.get(&id)
    }
}

/// A continuous piece of alignment geometry, optionally linked to a switch
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutSegment {
    pub geometry: LineString<f64>,
    pub switch_id: Option<SwitchId>,
    /// Switch joint located at the first point of this segment
    pub start_joint_number: Option<JointNumber>,
    /// Switch joint located at the last point of this segment
    pub end_joint_number: Option<JointNumber>,
}

impl LayoutSegment {
    /// Create a segment without switch linking
    pub fn new(points: Vec<Coord<f64>>) -> Self {
        Self {
            geometry: LineString::new(points),
            switch_id: None,
            start_joint_number: None,
            end_joint_number: None,
        }
    }

    /// Link this segment to a switch with the joints at its start and end
    pub fn with_switch(
        mut self,
        switch_id: SwitchId,
        start_joint_number: Option<JointNumber>,
        end_joint_number: Option<JointNumber>,
    ) -> Self {
        self.switch_id = Some(switch_id);
        self.start_joint_number = start_joint_number;
        self.end_joint_number = end_joint_number;
        self
    }

    #[inline]
    pub fn start(&self) -> Option<Coord<f64>> {
        self.geometry.0.first().copied()
    }

    #[inline]
    pub fn end(&self) -> Option<Coord<f64>> {
        self.geometry.0.last().copied()
    }
}

/// The ordered segments forming the geometry of a track or reference line
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutAlignment {
    pub segments: Vec<LayoutSegment>,
}

impl LayoutAlignment {
    pub fn new(segments: Vec<LayoutSegment>) -> Self {
        Self { segments }
    }

    /// First point of the first segment
    #[inline]
    pub fn start(&self) -> Option<Coord<f64>> {
        self.segments.first().and_then(LayoutSegment::start)
    }

    /// Last point of the last segment
    #[inline]
    pub fn end(&self) -> Option<Coord<f64>> {
        self.segments.last().and_then(LayoutSegment::end)
    }

    /// All points along the alignment, without repeating shared segment ends
    pub fn points(&self) -> Vec<Coord<f64>> {
        let mut points: Vec<Coord<f64>> = Vec::new();
        for segment in &self.segments {
            for &coord in segment.geometry.coords() {
                if points.last() != Some(&coord) {
                    points.push(coord);
                }
            }
        }
        points
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.geometry.0.is_empty())
    }
}

/// Lifecycle state of a layout asset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LayoutState {
    InUse,
    NotInUse,
    Deleted,
}

/// A topological link from a track end to a switch joint
///
/// The track ends at the switch without owning a segment linked to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TopologySwitch {
    pub switch_id: SwitchId,
    pub joint_number: JointNumber,
}

/// An operational track addressed against its track number's reference line
#[derive(Clone, Debug, PartialEq)]
pub struct LocationTrack {
    pub id: LocationTrackId,
    pub track_number_id: TrackNumberId,
    pub state: LayoutState,
    pub topology_start_switch: Option<TopologySwitch>,
    pub topology_end_switch: Option<TopologySwitch>,
}

impl LocationTrack {
    pub fn new(id: LocationTrackId, track_number_id: TrackNumberId) -> Self {
        Self {
            id,
            track_number_id,
            state: LayoutState::InUse,
            topology_start_switch: None,
            topology_end_switch: None,
        }
    }

    /// Deleted tracks have no addressable geometry
    #[inline]
    pub fn exists(&self) -> bool {
        self.state != LayoutState::Deleted
    }

    /// Topology switch links paired with the alignment end they attach to
    pub fn topology_links(
        &self,
        alignment: &LayoutAlignment,
    ) -> SmallVec<[(TopologySwitch, Coord<f64>); 2]> {
        let mut links = SmallVec::new();
        if let (Some(link), Some(start)) = (self.topology_start_switch, alignment.start()) {
            links.push((link, start));
        }
        if let (Some(link), Some(end)) = (self.topology_end_switch, alignment.end()) {
            links.push((link, end));
        }
        links
    }
}

/// A named connection point of a switch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwitchJoint {
    pub number: JointNumber,
    pub location: Coord<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutSwitch {
    pub id: SwitchId,
    pub structure_id: SwitchStructureId,
    pub joints: Vec<SwitchJoint>,
}

impl LayoutSwitch {
    pub fn joint(&self, number: JointNumber) -> Option<&SwitchJoint> {
        self.joints.iter().find(|joint| joint.number == number)
    }
}

/// Switch library type information needed by change detection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchStructure {
    pub id: SwitchStructureId,
    /// The joint that represents the switch when tracks link to it topologically
    pub presentation_joint_number: JointNumber,
}
