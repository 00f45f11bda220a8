// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Navigation transform manager.
//!
//! Owns the transform from navigational (model) coordinates to physical
//! (display) coordinates, plus the display frame and tool anchor that are
//! replicated alongside it. Mutations go through this type only; every change
//! sets a bit in the [`DirtyMask`] and the bit stays set until
//! [`NavigationManager::take_dirty`] is called after a successful broadcast.
//!
//! In [`NavMode::Deferred`] all mutations within a frame are staged in
//! `pending` and applied as one step by [`NavigationManager::commit_pending`].
//! Slaves ignore local mutations: application code runs on every node, and
//! only the master's broadcast is authoritative there.

use tandem_config::{DisplayConfig, NavMode};
use tandem_proto::{ClusterRole, DirtyMask, FramePayload, WireDisplay};
use tracing::{trace, warn};

use crate::math::{NavTransform, Quat, Vec3};

/// Which side of the current transform a concatenation lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// `t ∘ current`: `t` acts in physical space, after the current mapping.
    Left,
    /// `current ∘ t`: `t` acts in navigational space, before the current mapping.
    Right,
}

/// Physical display frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayFrame {
    /// Center of the interesting region.
    pub center: Vec3,
    /// Radius of the interesting region.
    pub size: f64,
    /// Viewer-forward direction.
    pub forward: Vec3,
    /// Up direction.
    pub up: Vec3,
}

impl From<&DisplayConfig> for DisplayFrame {
    fn from(cfg: &DisplayConfig) -> Self {
        Self {
            center: cfg.center.into(),
            size: cfg.size,
            forward: cfg.forward.into(),
            up: cfg.up.into(),
        }
    }
}

impl Default for DisplayFrame {
    fn default() -> Self {
        Self::from(&DisplayConfig::default())
    }
}

/// Listener invoked with the new transform whenever `current` changes.
pub type ChangeCallback = Box<dyn FnMut(&NavTransform) + Send>;

/// Holds the authoritative (master) or mirrored (slave) navigation state.
pub struct NavigationManager {
    role: ClusterRole,
    mode: NavMode,
    enabled: bool,
    current: NavTransform,
    current_inverse: NavTransform,
    pending: NavTransform,
    staged: bool,
    dirty: DirtyMask,
    display: DisplayFrame,
    tool_anchor: Vec3,
    active_tool: Option<u64>,
    on_change: Vec<ChangeCallback>,
}

impl std::fmt::Debug for NavigationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationManager")
            .field("role", &self.role)
            .field("mode", &self.mode)
            .field("enabled", &self.enabled)
            .field("current", &self.current)
            .field("staged", &self.staged)
            .field("dirty", &self.dirty)
            .field("display", &self.display)
            .field("tool_anchor", &self.tool_anchor)
            .field("active_tool", &self.active_tool)
            .field("listeners", &self.on_change.len())
            .finish()
    }
}

impl NavigationManager {
    /// Starts disabled, with identity transforms.
    pub fn new(role: ClusterRole, mode: NavMode, display: DisplayFrame) -> Self {
        Self {
            role,
            mode,
            enabled: false,
            current: NavTransform::identity(),
            current_inverse: NavTransform::identity(),
            pending: NavTransform::identity(),
            staged: false,
            dirty: DirtyMask::EMPTY,
            display,
            tool_anchor: display.center,
            active_tool: None,
            on_change: Vec::new(),
        }
    }

    fn authoritative(&self, op: &'static str) -> bool {
        if self.role.is_master() {
            true
        } else {
            trace!(op, "ignoring local navigation change on slave");
            false
        }
    }

    /// Immediate or deferred.
    pub fn mode(&self) -> NavMode {
        self.mode
    }

    /// True once a transform has been set (or received).
    ///
    /// The frame payload carries no enabled flag, so a slave that receives
    /// the identity sent after the master's [`Self::disable`] reports `true`
    /// while the master reports `false`.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Navigational → physical transform; identity while disabled.
    pub fn current(&self) -> &NavTransform {
        &self.current
    }

    /// Physical → navigational transform; identity while disabled.
    pub fn current_inverse(&self) -> &NavTransform {
        &self.current_inverse
    }

    /// Display frame.
    pub fn display(&self) -> &DisplayFrame {
        &self.display
    }

    /// Current tool anchor in physical coordinates.
    pub fn tool_anchor(&self) -> Vec3 {
        self.tool_anchor
    }

    /// Groups changed since the last [`Self::take_dirty`].
    pub fn dirty(&self) -> DirtyMask {
        self.dirty
    }

    /// Registers a listener for changes of `current`.
    pub fn on_change(&mut self, callback: ChangeCallback) {
        self.on_change.push(callback);
    }

    /// Replaces the navigation transform.
    ///
    /// Deferred mode stages `t`; the transform bit is only raised when the
    /// staged value differs from `current` or navigation is disabled.
    /// A transform with a non-positive or non-finite scale, or any
    /// non-finite component, has no inverse and is dropped.
    pub fn set_transformation(&mut self, t: NavTransform) {
        if !self.authoritative("set_transformation") {
            return;
        }
        if !is_invertible(&t) {
            warn!(scale = t.scale, "ignoring non-invertible navigation transform");
            return;
        }
        match self.mode {
            NavMode::Immediate => {
                self.install(t);
                self.dirty.insert(DirtyMask::TRANSFORM);
            }
            NavMode::Deferred => {
                self.pending = t;
                self.staged = true;
                if !self.enabled || t != self.current {
                    self.dirty.insert(DirtyMask::TRANSFORM);
                }
            }
        }
    }

    /// Composes `t` onto the transform and renormalizes the result.
    ///
    /// Identity concatenations are ignored.
    pub fn concatenate(&mut self, t: &NavTransform, side: Side) {
        if t.is_identity() || !self.authoritative("concatenate") {
            return;
        }
        let base = match self.mode {
            NavMode::Immediate => self.current,
            NavMode::Deferred if self.staged => self.pending,
            NavMode::Deferred => self.current,
        };
        let next = match side {
            Side::Left => t.compose(&base),
            Side::Right => base.compose(t),
        }
        .renormalize();
        match self.mode {
            NavMode::Immediate => self.install(next),
            NavMode::Deferred => {
                self.pending = next;
                self.staged = true;
            }
        }
        self.dirty.insert(DirtyMask::TRANSFORM);
    }

    /// Applies the staged transform as one step and notifies listeners once.
    ///
    /// Returns whether anything was committed. Always `false` in immediate
    /// mode, and when the staged value equals the enabled `current`.
    pub fn commit_pending(&mut self) -> bool {
        if self.mode != NavMode::Deferred || !self.staged {
            return false;
        }
        self.staged = false;
        if self.enabled && self.pending == self.current {
            return false;
        }
        self.install(self.pending);
        true
    }

    /// Back to identity; disables navigation and marks the transform dirty.
    pub fn disable(&mut self) {
        if !self.authoritative("disable") {
            return;
        }
        self.enabled = false;
        self.staged = false;
        self.active_tool = None;
        self.current = NavTransform::identity();
        self.current_inverse = NavTransform::identity();
        self.pending = NavTransform::identity();
        self.dirty.insert(DirtyMask::TRANSFORM);
        self.notify();
    }

    /// Moves the display center and resizes the interesting region.
    pub fn set_display_center(&mut self, center: Vec3, size: f64) {
        if !self.authoritative("set_display_center") {
            return;
        }
        self.display.center = center;
        self.display.size = size;
        self.dirty.insert(DirtyMask::DISPLAY_GEOMETRY);
    }

    /// Moves the anchor point used by navigation tools.
    pub fn set_tool_anchor(&mut self, point: Vec3) {
        if !self.authoritative("set_tool_anchor") {
            return;
        }
        self.tool_anchor = point;
        self.dirty.insert(DirtyMask::TOOL_ANCHOR);
    }

    /// Shows the sphere around `center` with `radius` filling the display.
    pub fn set_from_center_size(&mut self, center: Vec3, radius: f64) {
        let t = NavTransform::translate_from_origin_to(self.display.center)
            .compose(&NavTransform::scale(self.display.size / radius))
            .compose(&NavTransform::translate_to_origin_from(center));
        self.set_transformation(t);
    }

    /// As [`Self::set_from_center_size`], also turning `up` onto the display up direction.
    pub fn set_from_center_size_up(&mut self, center: Vec3, radius: f64, up: Vec3) {
        let t = NavTransform::translate_from_origin_to(self.display.center)
            .compose(&NavTransform::scale(self.display.size / radius))
            .compose(&NavTransform::rotate(Quat::rotate_from_to(up, self.display.up)))
            .compose(&NavTransform::translate_to_origin_from(center));
        self.set_transformation(t);
    }

    /// Claims navigation for `tool`. At most one tool navigates at a time,
    /// and only while navigation is enabled. The lock is node-local and
    /// follows [`Self::is_enabled`], so after a master-side `disable` slaves
    /// still grant it.
    pub fn activate_tool(&mut self, tool: u64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.active_tool {
            Some(active) if active != tool => false,
            _ => {
                self.active_tool = Some(tool);
                true
            }
        }
    }

    /// Releases navigation; `false` if `tool` was not the active tool.
    pub fn deactivate_tool(&mut self, tool: u64) -> bool {
        if self.active_tool == Some(tool) {
            self.active_tool = None;
            true
        } else {
            false
        }
    }

    /// Tool currently holding navigation.
    pub fn active_tool(&self) -> Option<u64> {
        self.active_tool
    }

    /// Returns the dirty groups and clears them. Call once after the
    /// broadcast that carried them succeeded.
    pub fn take_dirty(&mut self) -> DirtyMask {
        std::mem::replace(&mut self.dirty, DirtyMask::EMPTY)
    }

    /// Fills the optional groups of `payload` selected by `mask`.
    pub fn write_groups(&self, mask: DirtyMask, payload: &mut FramePayload) {
        payload.transform = mask
            .contains(DirtyMask::TRANSFORM)
            .then(|| self.current.to_wire());
        payload.display = mask
            .contains(DirtyMask::DISPLAY_GEOMETRY)
            .then(|| WireDisplay {
                center: self.display.center.to_array(),
                size: self.display.size,
            });
        payload.tool_anchor = mask
            .contains(DirtyMask::TOOL_ANCHOR)
            .then(|| self.tool_anchor.to_array());
    }

    /// Slave: overwrites the mirror with the groups present in `payload`.
    pub fn apply_remote(&mut self, payload: &FramePayload) {
        if let Some(wire) = &payload.transform {
            self.install(NavTransform::from_wire(wire));
        }
        if let Some(display) = &payload.display {
            self.display.center = display.center.into();
            self.display.size = display.size;
        }
        if let Some(anchor) = payload.tool_anchor {
            self.tool_anchor = anchor.into();
        }
    }

    fn install(&mut self, t: NavTransform) {
        self.current = t;
        self.current_inverse = t.inverse();
        self.enabled = true;
        self.notify();
    }

    fn notify(&mut self) {
        let current = self.current;
        for callback in &mut self.on_change {
            callback(&current);
        }
    }
}

fn is_invertible(t: &NavTransform) -> bool {
    let norm = t.rotation.norm();
    t.scale.is_finite()
        && t.scale > 0.0
        && norm.is_finite()
        && norm > 0.0
        && t.translation.to_array().iter().all(|c| c.is_finite())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn master(mode: NavMode) -> NavigationManager {
        NavigationManager::new(ClusterRole::Master, mode, DisplayFrame::default())
    }

    fn counter(nav: &mut NavigationManager) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        nav.on_change(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        hits
    }

    #[test]
    fn disabled_manager_reports_identity() {
        let nav = master(NavMode::Deferred);
        assert!(!nav.is_enabled());
        assert!(nav.current().is_identity());
        assert!(nav.current_inverse().is_identity());
    }

    #[test]
    fn immediate_set_installs_and_notifies() {
        let mut nav = master(NavMode::Immediate);
        let hits = counter(&mut nav);
        let t = NavTransform::translate(Vec3::new(1.0, 2.0, 3.0));
        nav.set_transformation(t);
        assert_eq!(*nav.current(), t);
        assert!(nav
            .current_inverse()
            .compose(&t)
            .approx_eq(&NavTransform::identity(), 1e-12));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(nav.dirty().contains(DirtyMask::TRANSFORM));
    }

    #[test]
    fn deferred_set_waits_for_commit() {
        let mut nav = master(NavMode::Deferred);
        let hits = counter(&mut nav);
        let t = NavTransform::scale(2.0);
        nav.set_transformation(t);
        assert!(nav.current().is_identity());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(nav.commit_pending());
        assert_eq!(*nav.current(), t);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!nav.commit_pending());
    }

    #[test]
    fn deferred_set_to_current_value_stays_clean() {
        let mut nav = master(NavMode::Deferred);
        nav.set_transformation(NavTransform::scale(2.0));
        nav.commit_pending();
        let _ = nav.take_dirty();
        nav.set_transformation(NavTransform::scale(2.0));
        assert!(nav.dirty().is_empty());
    }

    #[test]
    fn deferred_set_to_current_value_fires_no_callbacks() {
        let mut nav = master(NavMode::Deferred);
        nav.set_transformation(NavTransform::scale(2.0));
        nav.commit_pending();
        let _ = nav.take_dirty();
        let hits = counter(&mut nav);
        nav.set_transformation(NavTransform::scale(2.0));
        assert!(!nav.commit_pending());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(*nav.current(), NavTransform::scale(2.0));
    }

    #[test]
    fn deferred_identity_set_enables_disabled_navigation() {
        let mut nav = master(NavMode::Deferred);
        let hits = counter(&mut nav);
        nav.set_transformation(NavTransform::identity());
        assert!(nav.commit_pending());
        assert!(nav.is_enabled());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_invertible_transforms_are_dropped() {
        let mut nav = master(NavMode::Immediate);
        nav.set_transformation(NavTransform::scale(2.0));
        let _ = nav.take_dirty();
        nav.set_from_center_size(Vec3::ZERO, 0.0);
        nav.set_transformation(NavTransform::scale(f64::NAN));
        nav.set_transformation(NavTransform::scale(-1.0));
        nav.set_transformation(NavTransform::translate(Vec3::new(f64::INFINITY, 0.0, 0.0)));
        assert_eq!(*nav.current(), NavTransform::scale(2.0));
        assert!(nav.dirty().is_empty());
        assert!(nav
            .current_inverse()
            .compose(nav.current())
            .approx_eq(&NavTransform::identity(), 1e-12));
    }

    #[test]
    fn deferred_concatenations_compose_in_call_order() {
        let mut nav = master(NavMode::Deferred);
        let a = NavTransform::translate(Vec3::UNIT_X);
        let b = NavTransform::rotate(Quat::from_axis_angle(Vec3::UNIT_Z, 0.5));
        nav.concatenate(&a, Side::Left);
        nav.concatenate(&b, Side::Left);
        assert!(nav.current().is_identity());
        nav.commit_pending();
        assert!(nav.current().approx_eq(&b.compose(&a), 1e-12));
    }

    #[test]
    fn right_concatenation_applies_first() {
        let mut nav = master(NavMode::Immediate);
        let s = NavTransform::scale(2.0);
        let t = NavTransform::translate(Vec3::UNIT_Y);
        nav.set_transformation(s);
        nav.concatenate(&t, Side::Right);
        let p = nav.current().transform_point(&Vec3::ZERO);
        assert!(p.approx_eq(&Vec3::new(0.0, 2.0, 0.0), 1e-12));
    }

    #[test]
    fn identity_concatenation_is_ignored() {
        let mut nav = master(NavMode::Deferred);
        nav.concatenate(&NavTransform::identity(), Side::Left);
        assert!(nav.dirty().is_empty());
        assert!(!nav.commit_pending());
    }

    #[test]
    fn take_dirty_clears_after_broadcast() {
        let mut nav = master(NavMode::Immediate);
        nav.set_tool_anchor(Vec3::UNIT_Z);
        nav.set_display_center(Vec3::UNIT_X, 3.0);
        let mask = nav.take_dirty();
        assert!(mask.contains(DirtyMask::TOOL_ANCHOR));
        assert!(mask.contains(DirtyMask::DISPLAY_GEOMETRY));
        assert!(!mask.contains(DirtyMask::TRANSFORM));
        assert!(nav.take_dirty().is_empty());
    }

    #[test]
    fn slave_ignores_local_mutations() {
        let mut nav = NavigationManager::new(
            ClusterRole::Slave,
            NavMode::Immediate,
            DisplayFrame::default(),
        );
        nav.set_transformation(NavTransform::scale(3.0));
        nav.concatenate(&NavTransform::translate(Vec3::UNIT_X), Side::Left);
        nav.set_tool_anchor(Vec3::UNIT_Y);
        assert!(nav.current().is_identity());
        assert!(nav.dirty().is_empty());
    }

    #[test]
    fn apply_remote_mirrors_groups() {
        let mut src = master(NavMode::Immediate);
        src.set_transformation(NavTransform::translate(Vec3::new(4.0, 5.0, 6.0)));
        src.set_display_center(Vec3::UNIT_Y, 2.5);
        src.set_tool_anchor(Vec3::UNIT_Z);
        let mut payload = FramePayload::default();
        src.write_groups(src.dirty(), &mut payload);

        let mut dst = NavigationManager::new(
            ClusterRole::Slave,
            NavMode::Deferred,
            DisplayFrame::default(),
        );
        dst.apply_remote(&payload);
        assert!(dst.is_enabled());
        assert_eq!(dst.current(), src.current());
        assert_eq!(dst.display().center, Vec3::UNIT_Y);
        assert!((dst.display().size - 2.5).abs() < f64::EPSILON);
        assert_eq!(dst.tool_anchor(), Vec3::UNIT_Z);
    }

    #[test]
    fn disable_resets_and_marks_dirty() {
        let mut nav = master(NavMode::Immediate);
        nav.set_transformation(NavTransform::scale(4.0));
        let _ = nav.take_dirty();
        nav.disable();
        assert!(!nav.is_enabled());
        assert!(nav.current().is_identity());
        assert!(nav.dirty().contains(DirtyMask::TRANSFORM));
    }

    #[test]
    fn slave_reenables_on_identity_after_master_disable() {
        let mut src = master(NavMode::Immediate);
        let mut dst =
            NavigationManager::new(ClusterRole::Slave, NavMode::Immediate, DisplayFrame::default());
        src.set_transformation(NavTransform::scale(4.0));
        src.disable();
        let mut payload = FramePayload::default();
        let mask = src.take_dirty();
        src.write_groups(mask, &mut payload);
        dst.apply_remote(&payload);
        assert!(dst.current().is_identity());
        assert!(!src.is_enabled());
        assert!(dst.is_enabled());
        assert!(!src.activate_tool(1));
        assert!(dst.activate_tool(1));
    }

    #[test]
    fn center_size_fills_display() {
        let mut nav = master(NavMode::Immediate);
        nav.set_from_center_size(Vec3::new(10.0, 0.0, 0.0), 5.0);
        let mapped = nav.current().transform_point(&Vec3::new(15.0, 0.0, 0.0));
        // Display default: center origin, size 1.
        assert!(mapped.approx_eq(&Vec3::UNIT_X, 1e-12));
    }

    #[test]
    fn center_size_up_aligns_up_vector() {
        let mut nav = master(NavMode::Immediate);
        nav.set_from_center_size_up(Vec3::ZERO, 1.0, Vec3::UNIT_Y);
        let up = nav.current().transform_vector(&Vec3::UNIT_Y);
        assert!(up.approx_eq(&Vec3::UNIT_Z, 1e-12));
    }

    #[test]
    fn one_navigation_tool_at_a_time() {
        let mut nav = master(NavMode::Immediate);
        assert!(!nav.activate_tool(1), "disabled navigation refuses tools");
        nav.set_transformation(NavTransform::identity());
        assert!(nav.activate_tool(1));
        assert!(nav.activate_tool(1));
        assert!(!nav.activate_tool(2));
        assert!(!nav.deactivate_tool(2));
        assert!(nav.deactivate_tool(1));
        assert!(nav.activate_tool(2));
    }
}
