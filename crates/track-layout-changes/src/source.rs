//! Layout source collaborator boundary
//!
//! The `LayoutSource` trait is everything change detection reads from storage. All
//! lookups are synchronous and read-only; the caller guarantees both compared states
//! stay consistent for the duration of one calculation.

use crate::Result;
use crate::geocoding::GeocodingContext;
use crate::layout::{
    ExternalIds, KmPostId, LayoutAlignment, LayoutSwitch, LocationTrack, LocationTrackId,
    ReferenceLineId, SwitchId, SwitchStructure, SwitchStructureId, TrackNumberId,
};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Which version of the layout a lookup reads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayoutMoment {
    /// The latest published state
    Official,
    /// The latest draft state, falling back to official rows without a draft
    Draft,
    /// The published state as it was at the given instant
    OfficialAt(SystemTime),
}

impl fmt::Display for LayoutMoment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutMoment::Official => f.write_str("official"),
            LayoutMoment::Draft => f.write_str("draft"),
            LayoutMoment::OfficialAt(moment) => write!(f, "official at {moment:?}"),
        }
    }
}

/// A location track row together with its geometry
pub type TrackWithAlignment = (LocationTrack, LayoutAlignment);

/// Read access to layout snapshots
///
/// Lookups return `Ok(None)` for entities that do not exist in the requested state.
/// Errors are reserved for genuine failures (e.g. storage errors) and are propagated
/// to the caller unchanged.
pub trait LayoutSource: Sync {
    /// Geocoding context of a track number, `None` if it cannot be built
    fn geocoding_context(
        &self,
        track_number_id: TrackNumberId,
        moment: LayoutMoment,
    ) -> Result<Option<Arc<dyn GeocodingContext>>>;

    fn location_track(
        &self,
        id: LocationTrackId,
        moment: LayoutMoment,
    ) -> Result<Option<TrackWithAlignment>>;

    fn switch(&self, id: SwitchId, moment: LayoutMoment) -> Result<Option<LayoutSwitch>>;

    /// Switch library structures are not versioned
    fn switch_structure(&self, id: SwitchStructureId) -> Result<Option<SwitchStructure>>;

    /// All location tracks addressed against a track number
    fn location_tracks_for_track_number(
        &self,
        track_number_id: TrackNumberId,
        moment: LayoutMoment,
    ) -> Result<Vec<TrackWithAlignment>>;

    fn km_post_track_number(
        &self,
        id: KmPostId,
        moment: LayoutMoment,
    ) -> Result<Option<TrackNumberId>>;

    fn reference_line_track_number(
        &self,
        id: ReferenceLineId,
        moment: LayoutMoment,
    ) -> Result<Option<TrackNumberId>>;

    /// External register ids known at the time of the call
    fn external_ids(&self) -> Result<ExternalIds>;
}
