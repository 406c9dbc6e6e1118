//! ChangeCalculator - Propagation of layout edits into calculated changes
//!
//! This module provides the high-level API for comparing two layout states: changed
//! track numbers are diffed through their reference lines, the location tracks they
//! affect are re-evaluated together with the explicitly requested ones, and the switch
//! joints on every evaluated track are compared. Everything found is merged per entity.

use crate::address::{AddressPoint, AlignmentAddresses};
use crate::changes::{
    CalculatedChanges, ChangeRequest, LocationTrackChange, SwitchChange, TrackNumberChange,
    merge_location_track_changes, merge_switch_changes, merge_track_number_changes,
};
use crate::diff::address_changes;
use crate::geocoding::{GeocodingContext, alignment_km_range, track_addresses};
use crate::layout::{ExternalIds, LocationTrackId, TrackNumberId};
use crate::source::{LayoutMoment, LayoutSource, TrackWithAlignment};
use crate::switches::{
    TrackState, TrackSwitchJoints, all_joint_changes, collect_switch_joints, track_switch_changes,
};
use crate::{ChangeError, Result};

use dashmap::DashMap;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::SystemTime;

/// Configuration for change calculation
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Evaluate track numbers and location tracks on the rayon pool (default true).
    /// Results are identical to sequential evaluation.
    pub parallel: bool,
    /// Minimum number of items in a batch before it is spread on the pool (default 8)
    pub parallel_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel: true,
            parallel_threshold: 8,
        }
    }
}

/// Computes calculated changes between layout states read from a [`LayoutSource`]
///
/// The source must present consistent snapshots of both compared states for the
/// duration of a call; the calculator itself holds no state between calls.
pub struct ChangeCalculator<'a, S: LayoutSource + ?Sized> {
    source: &'a S,
    config: Config,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a, S: LayoutSource + ?Sized> ChangeCalculator<'a, S> {
    pub fn new(source: &'a S, config: Config) -> Self {
        Self { source, config }
    }

    /// Changes published since `moment`, compared against the latest official state
    pub fn changes_since(
        &self,
        moment: SystemTime,
        request: &ChangeRequest,
    ) -> Result<CalculatedChanges> {
        #[cfg(feature = "profiling")]
        profiling::scope!("calculator::changes_since");

        self.calculate(LayoutMoment::OfficialAt(moment), LayoutMoment::Official, request)
    }

    /// Changes the draft state would publish on top of the official state
    pub fn draft_changes(&self, request: &ChangeRequest) -> Result<CalculatedChanges> {
        #[cfg(feature = "profiling")]
        profiling::scope!("calculator::draft_changes");

        self.calculate(LayoutMoment::Official, LayoutMoment::Draft, request)
    }

    /// Changes between two arbitrary layout states
    pub fn calculate(
        &self,
        before: LayoutMoment,
        after: LayoutMoment,
        request: &ChangeRequest,
    ) -> Result<CalculatedChanges> {
        #[cfg(feature = "profiling")]
        profiling::scope!("calculator::calculate");

        let calculation = Calculation {
            source: self.source,
            config: &self.config,
            before,
            after,
            external_ids: self.source.external_ids()?,
            contexts: DashMap::new(),
        };
        let changes = calculation.run(request)?;
        tracing::info!(
            "Calculated changes {} -> {}: {} track numbers, {} location tracks, {} switches",
            before,
            after,
            changes.track_number_changes.len(),
            changes.location_track_changes.len(),
            changes.switch_changes.len()
        );
        Ok(changes)
    }

    /// Every switch joint linked to a location track as it was at `moment`
    ///
    /// Joints are reported as non-removed changes so that the whole track can be
    /// re-synced. A track without a resolvable geocoding context has no joints.
    pub fn switch_changes_at_moment(
        &self,
        location_track_id: LocationTrackId,
        moment: SystemTime,
    ) -> Result<Vec<SwitchChange>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("calculator::switch_changes_at_moment");

        let moment = LayoutMoment::OfficialAt(moment);
        let (track, alignment) = self
            .source
            .location_track(location_track_id, moment)?
            .ok_or(ChangeError::MissingLocationTrack {
                id: location_track_id,
                moment,
            })?;
        let Some(context) = self
            .source
            .geocoding_context(track.track_number_id, moment)?
        else {
            tracing::debug!(
                "No geocoding context for track number {} ({}), track {} has no joints",
                track.track_number_id,
                moment,
                track.id
            );
            return Ok(Vec::new());
        };
        let joints = collect_switch_joints(
            TrackState {
                track: &track,
                alignment: &alignment,
                context: context.as_ref(),
            },
            |id| self.source.switch(id, moment),
            |id| self.source.switch_structure(id),
        )?;
        Ok(all_joint_changes(&track, &joints, &self.source.external_ids()?))
    }
}

/// State of one calculation: the compared moments and per-call caches
struct Calculation<'a, S: LayoutSource + ?Sized> {
    source: &'a S,
    config: &'a Config,
    before: LayoutMoment,
    after: LayoutMoment,
    external_ids: ExternalIds,
    /// Geocoding contexts resolved so far, including unresolvable ones
    contexts: DashMap<(TrackNumberId, LayoutMoment), Option<Arc<dyn GeocodingContext>>>,
}

/// Everything learned from re-evaluating one location track
struct TrackEvaluation {
    address_change: LocationTrackChange,
    switch_driven_change: LocationTrackChange,
    switch_changes: Vec<SwitchChange>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<S: LayoutSource + ?Sized> Calculation<'_, S> {
    fn run(&self, request: &ChangeRequest) -> Result<CalculatedChanges> {
        let mut track_number_ids: BTreeSet<TrackNumberId> =
            request.track_numbers.iter().copied().collect();
        track_number_ids.extend(self.indirect_track_numbers(request)?);

        let track_number_results = self.map_items(track_number_ids.into_iter().collect(), |id| {
            self.track_number_change(id)
        })?;

        let mut track_ids: BTreeSet<LocationTrackId> =
            request.location_tracks.iter().copied().collect();
        let mut track_number_changes = Vec::with_capacity(track_number_results.len());
        for (change, affected) in track_number_results {
            track_number_changes.push(change);
            track_ids.extend(affected);
        }

        let evaluations =
            self.map_items(track_ids.into_iter().collect(), |id| self.evaluate_track(id))?;

        let mut location_track_changes = Vec::with_capacity(evaluations.len() * 2);
        let mut switch_changes: Vec<SwitchChange> = request
            .switches
            .iter()
            .map(|&id| SwitchChange::touched(id))
            .collect();
        for evaluation in evaluations {
            location_track_changes.push(evaluation.address_change);
            location_track_changes.push(evaluation.switch_driven_change);
            switch_changes.extend(evaluation.switch_changes);
        }

        let changes = CalculatedChanges {
            track_number_changes: merge_track_number_changes(track_number_changes),
            location_track_changes: merge_location_track_changes(location_track_changes),
            switch_changes: merge_switch_changes(switch_changes),
        };
        changes.validate()?;
        Ok(changes)
    }

    /// Track numbers of the requested km posts and reference lines
    fn indirect_track_numbers(&self, request: &ChangeRequest) -> Result<BTreeSet<TrackNumberId>> {
        let mut ids = BTreeSet::new();
        for &km_post_id in &request.km_posts {
            match self.source.km_post_track_number(km_post_id, self.after)? {
                Some(id) => {
                    ids.insert(id);
                }
                None => tracing::debug!("Km post {} has no track number ({})", km_post_id, self.after),
            }
        }
        for &reference_line_id in &request.reference_lines {
            match self
                .source
                .reference_line_track_number(reference_line_id, self.after)?
            {
                Some(id) => {
                    ids.insert(id);
                }
                None => tracing::debug!(
                    "Reference line {} has no track number ({})",
                    reference_line_id,
                    self.after
                ),
            }
        }
        Ok(ids)
    }

    /// Apply `f` to every item, on the rayon pool when the batch is large enough
    fn map_items<T, R, F>(&self, items: Vec<T>, f: F) -> Result<Vec<R>>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> Result<R> + Send + Sync,
    {
        if self.config.parallel && items.len() >= self.config.parallel_threshold {
            items.into_par_iter().map(f).collect()
        } else {
            items.into_iter().map(f).collect()
        }
    }

    fn context(
        &self,
        track_number_id: TrackNumberId,
        moment: LayoutMoment,
    ) -> Result<Option<Arc<dyn GeocodingContext>>> {
        if let Some(context) = self.contexts.get(&(track_number_id, moment)) {
            return Ok(context.clone());
        }
        let context = self.source.geocoding_context(track_number_id, moment)?;
        self.contexts
            .insert((track_number_id, moment), context.clone());
        Ok(context)
    }

    /// Reference line change of a track number and the tracks it affects
    ///
    /// Affected tracks are the tracks of the before state whose kilometer range
    /// contains a changed kilometer.
    fn track_number_change(
        &self,
        track_number_id: TrackNumberId,
    ) -> Result<(TrackNumberChange, Vec<LocationTrackId>)> {
        let before_context = self.context(track_number_id, self.before)?;
        let after_context = self.context(track_number_id, self.after)?;
        if after_context.is_none() {
            tracing::warn!(
                "No geocoding context for track number {} ({}), reporting it as fully changed",
                track_number_id,
                self.after
            );
        }

        let before_addresses = before_context
            .as_deref()
            .and_then(|context| context.reference_line_addresses());
        let after_addresses = after_context
            .as_deref()
            .and_then(|context| context.reference_line_addresses());
        let changes = address_changes(before_addresses.as_ref(), after_addresses.as_ref());

        let affected = match before_context.as_deref() {
            Some(context) if !changes.changed_km_numbers.is_empty() => self
                .source
                .location_tracks_for_track_number(track_number_id, self.before)?
                .into_iter()
                .filter(|(track, alignment)| {
                    track.exists()
                        && alignment_km_range(context, alignment).is_some_and(|range| {
                            changes.changed_km_numbers.iter().any(|km| range.contains(km))
                        })
                })
                .map(|(track, _)| track.id)
                .collect(),
            _ => Vec::new(),
        };

        tracing::debug!(
            "Track number {}: {} changed kilometers, {} affected tracks",
            track_number_id,
            changes.changed_km_numbers.len(),
            affected.len()
        );
        Ok((TrackNumberChange::new(track_number_id, changes), affected))
    }

    /// Joints linked to a track in one state, empty without a geocoding context
    fn track_joints(
        &self,
        track: &TrackWithAlignment,
        context: Option<&dyn GeocodingContext>,
        moment: LayoutMoment,
    ) -> Result<TrackSwitchJoints> {
        let Some(context) = context else {
            return Ok(TrackSwitchJoints::new());
        };
        let (track, alignment) = track;
        collect_switch_joints(
            TrackState {
                track,
                alignment,
                context,
            },
            |id| self.source.switch(id, moment),
            |id| self.source.switch_structure(id),
        )
    }

    fn evaluate_track(&self, id: LocationTrackId) -> Result<TrackEvaluation> {
        let after = self
            .source
            .location_track(id, self.after)?
            .ok_or(ChangeError::MissingLocationTrack {
                id,
                moment: self.after,
            })?;
        let before = self.source.location_track(id, self.before)?;

        let before_context = match &before {
            Some((track, _)) => self.context(track.track_number_id, self.before)?,
            None => None,
        };
        let after_context = self.context(after.0.track_number_id, self.after)?;

        let before_addresses = before.as_ref().and_then(|(track, alignment)| {
            track_addresses(before_context.as_deref(), track, alignment)
        });
        let after_addresses = track_addresses(after_context.as_deref(), &after.0, &after.1);
        let address_change = LocationTrackChange::new(
            id,
            address_changes(before_addresses.as_ref(), after_addresses.as_ref()),
        );

        let before_joints = match &before {
            Some(track) => self.track_joints(track, before_context.as_deref(), self.before)?,
            None => TrackSwitchJoints::new(),
        };
        let after_joints = self.track_joints(&after, after_context.as_deref(), self.after)?;
        let switch_changes = track_switch_changes(
            before.as_ref().map(|(track, _)| (track, &before_joints)),
            (&after.0, &after_joints),
            &self.external_ids,
        );
        let switch_driven_change =
            switch_driven_change(id, &switch_changes, after_addresses.as_ref());

        tracing::debug!(
            "Location track {}: {} changed kilometers, {} changed switches",
            id,
            address_change.changed_km_numbers.len(),
            switch_changes.len()
        );
        Ok(TrackEvaluation {
            address_change,
            switch_driven_change,
            switch_changes,
        })
    }
}

/// Track change implied by the non-removed joint changes observed on the track
///
/// A track end counts as changed when a changed joint sits exactly at its address.
fn switch_driven_change(
    id: LocationTrackId,
    switch_changes: &[SwitchChange],
    addresses: Option<&AlignmentAddresses>,
) -> LocationTrackChange {
    let joints: Vec<_> = switch_changes
        .iter()
        .flat_map(|change| &change.changed_joints)
        .filter(|joint| !joint.is_removed && joint.location_track_id == id)
        .collect();
    let at_end = |end: Option<&AddressPoint>| {
        end.is_some_and(|point| joints.iter().any(|joint| point.address.is_same(&joint.address)))
    };
    LocationTrackChange {
        location_track_id: id,
        changed_km_numbers: joints
            .iter()
            .map(|joint| joint.address.km_number.clone())
            .collect(),
        is_start_changed: at_end(addresses.map(AlignmentAddresses::start_point)),
        is_end_changed: at_end(addresses.map(AlignmentAddresses::end_point)),
    }
}
