//! Track Layout Changes - Change Detection for Published Rail Layouts
//!
//! This library works out which parts of a rail layout changed between two states,
//! expressed in the units an external asset register understands: changed kilometers
//! of track numbers and location tracks, changed track ends, and changed switch joints.
//!
//! # Architecture
//!
//! - **[`address`]**: Kilometer/meter addressing and geocoded address points
//! - **[`diff`]**: Kilometer-level diff of two geocoded versions of an alignment
//! - **[`layout`]**: Read-only layout entities (tracks, alignments, switches)
//! - **[`GeocodingContext`]** / **[`LayoutSource`]**: Collaborator boundaries
//! - **[`ChangeCalculator`]**: Propagation of direct edits into calculated changes
//! - **[`CalculatedChanges`]**: Merged, deduplicated results
//!
//! # Propagation
//!
//! A changed reference line or km post shifts the addresses of every track measured
//! against it, and a changed track moves the addresses of the switch joints on it.
//! Requested changes are followed along those edges and every discovered change is
//! merged per entity.

pub mod address;
mod calculator;
mod changes;
pub mod diff;
mod geocoding;
pub mod layout;
mod source;
mod switches;
#[cfg(test)]
mod test_support;
pub mod utils;

// Public API exports
pub use address::{AddressPoint, AlignmentAddresses, KmNumber, TrackMeter};
pub use calculator::{ChangeCalculator, Config};
pub use changes::{
    CalculatedChanges, ChangeRequest, LocationTrackChange, SplitChanges, SwitchChange,
    SwitchJointChange, TrackNumberChange, merge_location_track_changes, merge_switch_changes,
    merge_track_number_changes,
};
pub use diff::{AddressChanges, address_changes, diff_kilometers};
pub use geocoding::{GeocodingContext, alignment_km_range, track_addresses};
pub use source::{LayoutMoment, LayoutSource, TrackWithAlignment};

use layout::{LocationTrackId, SwitchId, SwitchStructureId};

/// Error types for change calculation
#[derive(Debug, thiserror::Error)]
pub enum ChangeError {
    #[error("Layout source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Location track {id} not found ({moment})")]
    MissingLocationTrack {
        id: LocationTrackId,
        moment: LayoutMoment,
    },

    #[error("Switch {switch_id} has no joint {joint_number} linked by track topology")]
    InvalidTopologyJoint {
        switch_id: SwitchId,
        joint_number: layout::JointNumber,
    },

    #[error("Switch structure {0} not found")]
    MissingSwitchStructure(SwitchStructureId),

    #[error("Duplicate {kind} change: {id}")]
    DuplicateChange { kind: &'static str, id: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl ChangeError {
    /// Wrap an error raised by a layout source implementation
    pub fn from_source(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ChangeError::Source(error.into())
    }
}

pub type Result<T> = std::result::Result<T, ChangeError>;
