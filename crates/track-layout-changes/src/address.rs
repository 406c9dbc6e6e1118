//! Track addresses and address-annotated points
//!
//! This module provides the kilometer/meter addressing used along a reference line
//! (`KmNumber`, `TrackMeter`) and the geocoded points compared by change detection
//! (`AddressPoint`, `AlignmentAddresses`).

use crate::utils::{self, DEFAULT_TRACK_METER_DECIMALS};
use crate::{ChangeError, Result};
use geo::Coord;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Separator between the kilometer and meter parts of a formatted track meter
pub const TRACK_METER_SEPARATOR: char = '+';

/// Meter values must stay below this magnitude
const METERS_MAX: f64 = 10_000.0;

/// A kilometer number with an optional extension letter, e.g. `0012` or `0012A`
///
/// Kilometers order by number first and then by extension, a kilometer without an
/// extension sorting before any extended kilometer of the same number.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KmNumber {
    number: u32,
    extension: Option<String>,
}

impl KmNumber {
    /// Create a plain kilometer number
    pub fn new(number: u32) -> Self {
        Self {
            number,
            extension: None,
        }
    }

    /// Create a kilometer number with an extension of one or two uppercase letters
    pub fn with_extension(number: u32, extension: &str) -> Result<Self> {
        let valid = (1..=2).contains(&extension.len())
            && extension.chars().all(|c| c.is_ascii_uppercase());
        if !valid {
            return Err(ChangeError::InvalidAddress(format!(
                "invalid km number extension: {extension:?}"
            )));
        }
        Ok(Self {
            number,
            extension: Some(extension.to_string()),
        })
    }

    #[inline]
    pub fn number(&self) -> u32 {
        self.number
    }

    #[inline]
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }
}

impl fmt::Display for KmNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{}", self.number, self.extension.as_deref().unwrap_or(""))
    }
}

impl FromStr for KmNumber {
    type Err = ChangeError;

    fn from_str(s: &str) -> Result<Self> {
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (digits, extension) = s.split_at(split);
        let number = digits
            .parse::<u32>()
            .map_err(|_| ChangeError::InvalidAddress(format!("invalid km number: {s:?}")))?;
        if extension.is_empty() {
            Ok(Self::new(number))
        } else {
            Self::with_extension(number, extension)
        }
    }
}

/// A linear position along a reference line: kilometer number plus meters into it
///
/// Equality and ordering compare meters with `f64::total_cmp`, so `-0.0` and `0.0`
/// are distinct addresses. Use [`TrackMeter::is_same`] for address identity.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackMeter {
    pub km_number: KmNumber,
    pub meters: f64,
}

impl TrackMeter {
    /// Create a track meter, rejecting non-finite or out-of-range meter values
    pub fn new(km_number: KmNumber, meters: f64) -> Result<Self> {
        if !meters.is_finite() || meters.abs() >= METERS_MAX {
            return Err(ChangeError::InvalidAddress(format!(
                "track meter outside valid range: km={km_number} meters={meters}"
            )));
        }
        Ok(Self { km_number, meters })
    }

    /// Check whether two addresses resolve to the same track meter
    ///
    /// Meters are compared at the precision addresses are resolved to, so values that
    /// only differ in floating point noise are the same address.
    pub fn is_same(&self, other: &TrackMeter) -> bool {
        self.km_number == other.km_number
            && utils::round_to(self.meters, DEFAULT_TRACK_METER_DECIMALS)
                == utils::round_to(other.meters, DEFAULT_TRACK_METER_DECIMALS)
    }
}

impl PartialEq for TrackMeter {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TrackMeter {}

impl PartialOrd for TrackMeter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TrackMeter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.km_number
            .cmp(&other.km_number)
            .then(self.meters.total_cmp(&other.meters))
    }
}

impl fmt::Display for TrackMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{:08.3}",
            self.km_number, TRACK_METER_SEPARATOR, self.meters
        )
    }
}

impl FromStr for TrackMeter {
    type Err = ChangeError;

    fn from_str(s: &str) -> Result<Self> {
        let (km, meters) = s
            .split_once(TRACK_METER_SEPARATOR)
            .ok_or_else(|| ChangeError::InvalidAddress(format!("invalid track meter: {s:?}")))?;
        let meters = meters
            .parse::<f64>()
            .map_err(|_| ChangeError::InvalidAddress(format!("invalid track meter: {s:?}")))?;
        Self::new(km.parse()?, meters)
    }
}

/// A geographic point annotated with its resolved track address
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AddressPoint {
    pub point: Coord<f64>,
    pub address: TrackMeter,
}

impl AddressPoint {
    pub fn new(point: Coord<f64>, address: TrackMeter) -> Self {
        Self { point, address }
    }

    #[inline]
    pub fn km_number(&self) -> &KmNumber {
        &self.address.km_number
    }

    /// Identity check: same address AND same location
    ///
    /// Two points sharing an address but not a location are different points, since
    /// the track geometry under that address has moved.
    pub fn is_same(&self, other: &AddressPoint) -> bool {
        self.address.is_same(&other.address) && utils::is_same_location(self.point, other.point)
    }
}

/// Compare two possibly missing address points
///
/// Two missing points are the same, a missing point is never the same as a present one.
pub fn same_point(p1: Option<&AddressPoint>, p2: Option<&AddressPoint>) -> bool {
    match (p1, p2) {
        (None, None) => true,
        (Some(a), Some(b)) => a.is_same(b),
        _ => false,
    }
}

/// The geocoded address points of one alignment
///
/// Points are ordered by address along the direction of the alignment. The start
/// and end points are the exact alignment ends and are included in `all_points`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlignmentAddresses {
    start_point: AddressPoint,
    end_point: AddressPoint,
    all_points: Vec<AddressPoint>,
}

impl AlignmentAddresses {
    pub fn new(
        start_point: AddressPoint,
        end_point: AddressPoint,
        mid_points: Vec<AddressPoint>,
    ) -> Self {
        let mut all_points = Vec::with_capacity(mid_points.len() + 2);
        all_points.push(start_point.clone());
        all_points.extend(mid_points);
        all_points.push(end_point.clone());
        Self {
            start_point,
            end_point,
            all_points,
        }
    }

    #[inline]
    pub fn start_point(&self) -> &AddressPoint {
        &self.start_point
    }

    #[inline]
    pub fn end_point(&self) -> &AddressPoint {
        &self.end_point
    }

    /// Start point, mid points and end point in address order
    #[inline]
    pub fn all_points(&self) -> &[AddressPoint] {
        &self.all_points
    }

    /// Distinct kilometers covered by the points, in address order
    pub fn km_numbers(&self) -> Vec<KmNumber> {
        let mut kms: Vec<KmNumber> = Vec::new();
        for point in &self.all_points {
            if kms.last() != Some(point.km_number()) {
                kms.push(point.km_number().clone());
            }
        }
        kms
    }
}
