//! Kilometer-level diffing of address point sequences
//!
//! Two geocoded versions of an alignment are compared kilometer by kilometer. The
//! scan is a merge walk with two cursors: once a difference is found in a kilometer
//! the rest of that kilometer is skipped, so the result is the set of kilometers
//! whose content differs rather than a point-by-point diff.

use crate::address::{AddressPoint, AlignmentAddresses, KmNumber, same_point};
use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outcome of comparing two geocoded versions of one alignment
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AddressChanges {
    pub changed_km_numbers: BTreeSet<KmNumber>,
    pub start_point_changed: bool,
    pub end_point_changed: bool,
}

impl AddressChanges {
    pub fn is_changed(&self) -> bool {
        !self.changed_km_numbers.is_empty() || self.start_point_changed || self.end_point_changed
    }
}

/// Compare the addresses of two versions of an alignment
///
/// A missing side has no points and no start or end, so anything present on the
/// other side reads as changed.
pub fn address_changes(
    old: Option<&AlignmentAddresses>,
    new: Option<&AlignmentAddresses>,
) -> AddressChanges {
    let old_points = old.map(AlignmentAddresses::all_points).unwrap_or_default();
    let new_points = new.map(AlignmentAddresses::all_points).unwrap_or_default();
    AddressChanges {
        changed_km_numbers: diff_kilometers(old_points, new_points),
        start_point_changed: !same_point(
            old.map(AlignmentAddresses::start_point),
            new.map(AlignmentAddresses::start_point),
        ),
        end_point_changed: !same_point(
            old.map(AlignmentAddresses::end_point),
            new.map(AlignmentAddresses::end_point),
        ),
    }
}

/// Kilometers in which the two point sequences differ
///
/// Both sequences must be ordered by address. The scan runs in both directions so
/// that kilometers present on only one side are always reported.
pub fn diff_kilometers(old_points: &[AddressPoint], new_points: &[AddressPoint]) -> BTreeSet<KmNumber> {
    let mut changed = KmScan::new(old_points, new_points).changed_km_numbers();
    changed.append(&mut KmScan::new(new_points, old_points).changed_km_numbers());
    changed
}

/// Result of advancing a scan by one step
#[derive(Debug, PartialEq, Eq)]
enum ScanStep {
    Same,
    Changed(KmNumber),
    Finished,
}

/// One-directional kilometer scan of `points` against `others`
///
/// `index` walks `points`. `other_index` is the aligned position in `others`, unset
/// when the current kilometer has no counterpart there.
#[derive(Debug)]
struct KmScan<'a> {
    points: &'a [AddressPoint],
    others: &'a [AddressPoint],
    index: usize,
    other_index: Option<usize>,
}

impl<'a> KmScan<'a> {
    fn new(points: &'a [AddressPoint], others: &'a [AddressPoint]) -> Self {
        let other_index = points
            .first()
            .and_then(|point| seek_km(others, point.km_number()));
        Self {
            points,
            others,
            index: 0,
            other_index,
        }
    }

    fn step(&mut self) -> ScanStep {
        let Some(point) = self.points.get(self.index) else {
            return ScanStep::Finished;
        };
        let other = self.other_index.and_then(|i| self.others.get(i));

        if same_point(Some(point), other) {
            self.index += 1;
            self.other_index = self.other_index.map(|i| i + 1);
            // Entering a new kilometer: realign with its first point on the other side
            if let Some(next) = self.points.get(self.index) {
                if next.km_number() != point.km_number() {
                    self.other_index = seek_km(self.others, next.km_number());
                }
            }
            ScanStep::Same
        } else {
            let km = point.km_number().clone();
            self.index += self.points[self.index..].partition_point(|p| p.km_number() <= &km);
            self.other_index = self
                .points
                .get(self.index)
                .and_then(|next| seek_km(self.others, next.km_number()));
            ScanStep::Changed(km)
        }
    }

    fn changed_km_numbers(mut self) -> BTreeSet<KmNumber> {
        let mut changed = BTreeSet::new();
        loop {
            match self.step() {
                ScanStep::Same => {}
                ScanStep::Changed(km) => {
                    changed.insert(km);
                }
                ScanStep::Finished => return changed,
            }
        }
    }
}

/// Index of the first point of the given kilometer
fn seek_km(points: &[AddressPoint], km: &KmNumber) -> Option<usize> {
    let index = points.partition_point(|p| p.km_number() < km);
    points
        .get(index)
        .filter(|p| p.km_number() == km)
        .map(|_| index)
}
