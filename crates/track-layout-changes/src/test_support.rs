//! In-memory collaborators for unit tests
//!
//! `StraightGeocoding` addresses points against a reference line lying on the x axis,
//! and `InMemoryLayout` serves layout snapshots per moment from hash maps.

use crate::address::{AddressPoint, AlignmentAddresses, KmNumber, TrackMeter};
use crate::geocoding::GeocodingContext;
use crate::layout::{
    ExternalIds, JointNumber, KmPostId, LayoutAlignment, LayoutSegment, LayoutSwitch,
    LocationTrack, LocationTrackId, ReferenceLineId, SwitchId, SwitchJoint, SwitchStructure,
    SwitchStructureId, TrackNumberId,
};
use crate::source::{LayoutMoment, LayoutSource, TrackWithAlignment};
use crate::utils::{DEFAULT_TRACK_METER_DECIMALS, round_to};
use crate::{ChangeError, Result};
use geo::Coord;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Spacing of the generated reference line address points
const REFERENCE_LINE_STEP: f64 = 100.0;

pub fn coord(x: f64) -> Coord<f64> {
    Coord { x, y: 0.0 }
}

/// A straight alignment along the x axis with a vertex every `step` meters
pub fn straight_alignment(from: f64, to: f64, step: f64) -> LayoutAlignment {
    let mut points = Vec::new();
    let mut x = from;
    while x < to {
        points.push(coord(x));
        x += step;
    }
    points.push(coord(to));
    LayoutAlignment::new(vec![LayoutSegment::new(points)])
}

/// A switch of structure 1 with joints at the given x positions
pub fn switch_with_joints(id: u32, joints: &[(u32, f64)]) -> LayoutSwitch {
    LayoutSwitch {
        id: SwitchId(id),
        structure_id: SwitchStructureId(1),
        joints: joints
            .iter()
            .map(|&(number, x)| SwitchJoint {
                number: JointNumber(number),
                location: coord(x),
            })
            .collect(),
    }
}

/// Geocoding against a reference line from `start_x` to `end_x` on the x axis
#[derive(Clone, Debug)]
pub struct StraightGeocoding {
    start_x: f64,
    end_x: f64,
    /// Km posts as (km number, x), ordered by x
    km_posts: Vec<(KmNumber, f64)>,
}

impl StraightGeocoding {
    pub fn new(start_x: f64, end_x: f64, km_posts: &[(u32, f64)]) -> Self {
        let mut km_posts: Vec<(KmNumber, f64)> = km_posts
            .iter()
            .map(|&(km, x)| (KmNumber::new(km), x))
            .collect();
        km_posts.sort_by(|a, b| a.1.total_cmp(&b.1));
        Self {
            start_x,
            end_x,
            km_posts,
        }
    }

    fn address_point(&self, point: Coord<f64>) -> Option<AddressPoint> {
        self.address(point)
            .map(|address| AddressPoint::new(point, address))
    }

    fn addresses_of(&self, points: &[Coord<f64>]) -> Option<AlignmentAddresses> {
        let start = self.address_point(*points.first()?)?;
        let end = self.address_point(*points.last()?)?;
        let inner: &[Coord<f64>] = if points.len() > 2 {
            &points[1..points.len() - 1]
        } else {
            &[]
        };
        let mid_points = inner
            .iter()
            .filter_map(|&point| self.address_point(point))
            .collect();
        Some(AlignmentAddresses::new(start, end, mid_points))
    }
}

impl GeocodingContext for StraightGeocoding {
    fn reference_line_addresses(&self) -> Option<AlignmentAddresses> {
        let alignment = straight_alignment(self.start_x, self.end_x, REFERENCE_LINE_STEP);
        self.addresses_of(&alignment.points())
    }

    fn address_points(&self, alignment: &LayoutAlignment) -> Option<AlignmentAddresses> {
        self.addresses_of(&alignment.points())
    }

    fn address(&self, point: Coord<f64>) -> Option<TrackMeter> {
        if point.x < self.start_x || point.x > self.end_x {
            return None;
        }
        let (km_number, post_x) = self.km_posts.iter().rev().find(|(_, x)| *x <= point.x)?;
        let meters = round_to(point.x - post_x, DEFAULT_TRACK_METER_DECIMALS);
        TrackMeter::new(km_number.clone(), meters).ok()
    }
}

/// Layout rows of one moment
#[derive(Clone, Default)]
pub struct LayoutSnapshot {
    pub geocoding: HashMap<TrackNumberId, Arc<StraightGeocoding>>,
    pub tracks: HashMap<LocationTrackId, TrackWithAlignment>,
    pub switches: HashMap<SwitchId, LayoutSwitch>,
    pub km_posts: HashMap<KmPostId, TrackNumberId>,
    pub reference_lines: HashMap<ReferenceLineId, TrackNumberId>,
}

impl LayoutSnapshot {
    pub fn with_geocoding(mut self, id: TrackNumberId, context: StraightGeocoding) -> Self {
        self.geocoding.insert(id, Arc::new(context));
        self
    }

    pub fn with_track(mut self, track: LocationTrack, alignment: LayoutAlignment) -> Self {
        self.tracks.insert(track.id, (track, alignment));
        self
    }

    pub fn with_switch(mut self, switch: LayoutSwitch) -> Self {
        self.switches.insert(switch.id, switch);
        self
    }

    pub fn with_km_post(mut self, id: KmPostId, track_number_id: TrackNumberId) -> Self {
        self.km_posts.insert(id, track_number_id);
        self
    }

    pub fn with_reference_line(mut self, id: ReferenceLineId, track_number_id: TrackNumberId) -> Self {
        self.reference_lines.insert(id, track_number_id);
        self
    }
}

/// A `LayoutSource` serving snapshots from memory
///
/// Draft lookups fall back to the official snapshot row by row. A moment can be set
/// to fail every lookup, standing in for a storage error.
#[derive(Default)]
pub struct InMemoryLayout {
    pub snapshots: HashMap<LayoutMoment, LayoutSnapshot>,
    pub structures: HashMap<SwitchStructureId, SwitchStructure>,
    pub external_ids: ExternalIds,
    pub failing_moment: Option<LayoutMoment>,
    pub geocoding_lookups: AtomicUsize,
}

impl InMemoryLayout {
    /// An empty layout with one switch structure (id 1) presented by joint 1
    pub fn new() -> Self {
        let mut layout = Self::default();
        layout.structures.insert(
            SwitchStructureId(1),
            SwitchStructure {
                id: SwitchStructureId(1),
                presentation_joint_number: JointNumber(1),
            },
        );
        layout
    }

    pub fn with_snapshot(mut self, moment: LayoutMoment, snapshot: LayoutSnapshot) -> Self {
        self.snapshots.insert(moment, snapshot);
        self
    }

    fn check(&self, moment: LayoutMoment) -> Result<()> {
        if self.failing_moment == Some(moment) {
            return Err(ChangeError::from_source(format!("storage unavailable ({moment})")));
        }
        Ok(())
    }

    /// Find a row in the snapshot of `moment`, falling back to official for drafts
    fn find<T: Clone>(
        &self,
        moment: LayoutMoment,
        get: impl Fn(&LayoutSnapshot) -> Option<&T>,
    ) -> Result<Option<T>> {
        self.check(moment)?;
        let found = self.snapshots.get(&moment).and_then(&get);
        let found = match (found, moment) {
            (None, LayoutMoment::Draft) => self.snapshots.get(&LayoutMoment::Official).and_then(&get),
            (found, _) => found,
        };
        Ok(found.cloned())
    }
}

impl LayoutSource for InMemoryLayout {
    fn geocoding_context(
        &self,
        track_number_id: TrackNumberId,
        moment: LayoutMoment,
    ) -> Result<Option<Arc<dyn GeocodingContext>>> {
        self.geocoding_lookups.fetch_add(1, Ordering::Relaxed);
        let context = self.find(moment, |s| s.geocoding.get(&track_number_id))?;
        Ok(context.map(|c| c as Arc<dyn GeocodingContext>))
    }

    fn location_track(
        &self,
        id: LocationTrackId,
        moment: LayoutMoment,
    ) -> Result<Option<TrackWithAlignment>> {
        self.find(moment, |s| s.tracks.get(&id))
    }

    fn switch(&self, id: SwitchId, moment: LayoutMoment) -> Result<Option<LayoutSwitch>> {
        self.find(moment, |s| s.switches.get(&id))
    }

    fn switch_structure(&self, id: SwitchStructureId) -> Result<Option<SwitchStructure>> {
        Ok(self.structures.get(&id).copied())
    }

    fn location_tracks_for_track_number(
        &self,
        track_number_id: TrackNumberId,
        moment: LayoutMoment,
    ) -> Result<Vec<TrackWithAlignment>> {
        self.check(moment)?;
        let mut tracks: HashMap<LocationTrackId, &TrackWithAlignment> = HashMap::new();
        if moment == LayoutMoment::Draft {
            if let Some(official) = self.snapshots.get(&LayoutMoment::Official) {
                tracks.extend(official.tracks.iter().map(|(id, t)| (*id, t)));
            }
        }
        if let Some(snapshot) = self.snapshots.get(&moment) {
            tracks.extend(snapshot.tracks.iter().map(|(id, t)| (*id, t)));
        }
        let mut tracks: Vec<TrackWithAlignment> = tracks
            .into_values()
            .filter(|(track, _)| track.track_number_id == track_number_id)
            .cloned()
            .collect();
        tracks.sort_by_key(|(track, _)| track.id);
        Ok(tracks)
    }

    fn km_post_track_number(
        &self,
        id: KmPostId,
        moment: LayoutMoment,
    ) -> Result<Option<TrackNumberId>> {
        self.find(moment, |s| s.km_posts.get(&id))
    }

    fn reference_line_track_number(
        &self,
        id: ReferenceLineId,
        moment: LayoutMoment,
    ) -> Result<Option<TrackNumberId>> {
        self.find(moment, |s| s.reference_lines.get(&id))
    }

    fn external_ids(&self) -> Result<ExternalIds> {
        Ok(self.external_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_straight_geocoding_addresses() {
        let context = StraightGeocoding::new(0.0, 3000.0, &[(1, 0.0), (2, 1000.0)]);
        assert_eq!(
            context.address(coord(1234.5)).map(|a| a.to_string()),
            Some("0002+0234.500".to_string())
        );
        assert!(context.address(coord(-1.0)).is_none());
        assert!(context.address(coord(3000.1)).is_none());

        let addresses = context.reference_line_addresses().unwrap();
        assert_eq!(addresses.all_points().len(), 31);
        assert_eq!(addresses.km_numbers().len(), 2);
    }

    #[test]
    fn test_draft_falls_back_to_official() {
        let official = LayoutSnapshot::default()
            .with_switch(switch_with_joints(1, &[(1, 10.0)]))
            .with_switch(switch_with_joints(2, &[(1, 20.0)]));
        let draft = LayoutSnapshot::default().with_switch(switch_with_joints(2, &[(1, 25.0)]));
        let layout = InMemoryLayout::new()
            .with_snapshot(LayoutMoment::Official, official)
            .with_snapshot(LayoutMoment::Draft, draft);

        let switch = |id, moment| layout.switch(SwitchId(id), moment).unwrap().unwrap();
        assert_eq!(switch(1, LayoutMoment::Draft).joints[0].location, coord(10.0));
        assert_eq!(switch(2, LayoutMoment::Draft).joints[0].location, coord(25.0));
        assert_eq!(switch(2, LayoutMoment::Official).joints[0].location, coord(20.0));
    }

    #[test]
    fn test_failing_moment() {
        let layout = InMemoryLayout {
            failing_moment: Some(LayoutMoment::Draft),
            ..InMemoryLayout::new()
        };
        assert!(layout.switch(SwitchId(1), LayoutMoment::Official).unwrap().is_none());
        assert!(matches!(
            layout.switch(SwitchId(1), LayoutMoment::Draft),
            Err(ChangeError::Source(_))
        ));
    }
}
