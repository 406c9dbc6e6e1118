//! Geocoding collaborator boundary
//!
//! Address computation from raw geometry lives outside this crate. Change detection
//! only needs a resolved context per track number and moment that can annotate
//! alignments with addresses and resolve single points.

use crate::address::{AlignmentAddresses, KmNumber, TrackMeter};
use crate::layout::{LayoutAlignment, LocationTrack};
use geo::Coord;
use std::ops::RangeInclusive;

/// A reference line plus km posts, resolved for one track number at one moment
pub trait GeocodingContext: Send + Sync {
    /// Address points of the reference line itself
    fn reference_line_addresses(&self) -> Option<AlignmentAddresses>;

    /// Address points of an arbitrary alignment, `None` if it cannot be addressed
    fn address_points(&self, alignment: &LayoutAlignment) -> Option<AlignmentAddresses>;

    /// Address of a single point, `None` outside the addressable range
    fn address(&self, point: Coord<f64>) -> Option<TrackMeter>;
}

/// Address points of a location track, treating deleted tracks as having no geometry
pub fn track_addresses(
    context: Option<&dyn GeocodingContext>,
    track: &LocationTrack,
    alignment: &LayoutAlignment,
) -> Option<AlignmentAddresses> {
    if !track.exists() {
        return None;
    }
    context?.address_points(alignment)
}

/// Kilometer range between the addresses of the alignment ends
pub fn alignment_km_range(
    context: &dyn GeocodingContext,
    alignment: &LayoutAlignment,
) -> Option<RangeInclusive<KmNumber>> {
    let start = context.address(alignment.start()?)?;
    let end = context.address(alignment.end()?)?;
    Some(start.km_number..=end.km_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{LayoutSegment, LayoutState, LocationTrackId, TrackNumberId};
    use crate::test_support::StraightGeocoding;

    fn alignment(from: f64, to: f64) -> LayoutAlignment {
        LayoutAlignment::new(vec![LayoutSegment::new(vec![
            Coord { x: from, y: 0.0 },
            Coord { x: to, y: 0.0 },
        ])])
    }

    #[test]
    fn test_deleted_track_has_no_addresses() {
        let context = StraightGeocoding::new(0.0, 3000.0, &[(1, 0.0), (2, 1000.0)]);
        let mut track = LocationTrack::new(LocationTrackId(1), TrackNumberId(1));
        let geometry = alignment(100.0, 200.0);

        assert!(track_addresses(Some(&context), &track, &geometry).is_some());
        assert!(track_addresses(None, &track, &geometry).is_none());

        track.state = LayoutState::Deleted;
        assert!(track_addresses(Some(&context), &track, &geometry).is_none());
    }

    #[test]
    fn test_alignment_km_range() {
        let context = StraightGeocoding::new(0.0, 3000.0, &[(1, 0.0), (2, 1000.0), (3, 2000.0)]);
        assert_eq!(
            alignment_km_range(&context, &alignment(500.0, 2500.0)),
            Some(KmNumber::new(1)..=KmNumber::new(3))
        );
        assert_eq!(
            alignment_km_range(&context, &alignment(1100.0, 1200.0)),
            Some(KmNumber::new(2)..=KmNumber::new(2))
        );
        // End outside the reference line
        assert_eq!(alignment_km_range(&context, &alignment(500.0, 3500.0)), None);
        assert_eq!(alignment_km_range(&context, &LayoutAlignment::default()), None);
    }
}
