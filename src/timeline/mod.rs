//! Keyframe timelines for UI objects.
//!
//! A [`WidgetTimeline`] is evaluated at the owning flow state's timeline position. The
//! keyframes are scanned in order starting from the object's baseline values: keyframes
//! that lie entirely before the position snap the running values to their targets, the
//! first keyframe containing the position interpolates, and scanning stops there.
//! Later keyframes that overlap the position are ignored.

pub mod easing;

use crate::flow::FlowStateId;
use crate::ui::{ObjectId, StyleProperty, UiSurface};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

pub use easing::Easing;

/// Width/height value meaning "sized by content"; never written back.
pub const AUTO_SIZE: f32 = -1.0;

bitflags! {
    /// Properties a keyframe drives, plus which position control points are in use.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct KeyframeProperties: u32 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const WIDTH = 1 << 2;
        const HEIGHT = 1 << 3;
        const OPACITY = 1 << 4;
        const SCALE = 1 << 5;
        const ROTATION = 1 << 6;
        const CP1 = 1 << 7;
        const CP2 = 1 << 8;
    }
}

/// One value per animatable property.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyValues {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub opacity: f32,
    pub scale: f32,
    pub rotation: f32,
}

impl PropertyValues {
    fn get(&self, property: StyleProperty) -> f32 {
        match property {
            StyleProperty::X => self.x,
            StyleProperty::Y => self.y,
            StyleProperty::Width => self.width,
            StyleProperty::Height => self.height,
            StyleProperty::Opacity => self.opacity,
            StyleProperty::Scale => self.scale,
            StyleProperty::Rotation => self.rotation,
        }
    }

    fn set(&mut self, property: StyleProperty, value: f32) {
        match property {
            StyleProperty::X => self.x = value,
            StyleProperty::Y => self.y = value,
            StyleProperty::Width => self.width = value,
            StyleProperty::Height => self.height = value,
            StyleProperty::Opacity => self.opacity = value,
            StyleProperty::Scale => self.scale = value,
            StyleProperty::Rotation => self.rotation = value,
        }
    }

    /// Reads the current style values of `object`.
    pub fn capture(ui: &dyn UiSurface, object: ObjectId) -> Self {
        let mut values = PropertyValues::default();
        for property in StyleProperty::ALL {
            values.set(property, ui.style(object, property) as f32);
        }
        values
    }
}

/// One easing selector per animatable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropertyEasing {
    pub x: Easing,
    pub y: Easing,
    pub width: Easing,
    pub height: Easing,
    pub opacity: Easing,
    pub scale: Easing,
    pub rotation: Easing,
}

impl PropertyEasing {
    fn get(&self, property: StyleProperty) -> Easing {
        match property {
            StyleProperty::X => self.x,
            StyleProperty::Y => self.y,
            StyleProperty::Width => self.width,
            StyleProperty::Height => self.height,
            StyleProperty::Opacity => self.opacity,
            StyleProperty::Scale => self.scale,
            StyleProperty::Rotation => self.rotation,
        }
    }

    fn set(&mut self, property: StyleProperty, easing: Easing) {
        match property {
            StyleProperty::X => self.x = easing,
            StyleProperty::Y => self.y = easing,
            StyleProperty::Width => self.width = easing,
            StyleProperty::Height => self.height = easing,
            StyleProperty::Opacity => self.opacity = easing,
            StyleProperty::Scale => self.scale = easing,
            StyleProperty::Rotation => self.rotation = easing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

fn property_flag(property: StyleProperty) -> KeyframeProperties {
    match property {
        StyleProperty::X => KeyframeProperties::X,
        StyleProperty::Y => KeyframeProperties::Y,
        StyleProperty::Width => KeyframeProperties::WIDTH,
        StyleProperty::Height => KeyframeProperties::HEIGHT,
        StyleProperty::Opacity => KeyframeProperties::OPACITY,
        StyleProperty::Scale => KeyframeProperties::SCALE,
        StyleProperty::Rotation => KeyframeProperties::ROTATION,
    }
}

/// A timed target for some of an object's properties. `start..=end` is inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineKeyframe {
    pub start: f32,
    pub end: f32,
    pub enabled: KeyframeProperties,
    pub values: PropertyValues,
    pub easing: PropertyEasing,
    /// Position control points; used when `CP1` (quadratic) or `CP1 | CP2` (cubic) is enabled.
    pub control_points: [Point; 2],
}

impl TimelineKeyframe {
    pub fn new(start: f32, end: f32) -> Self {
        Self {
            start,
            end,
            enabled: KeyframeProperties::empty(),
            values: PropertyValues::default(),
            easing: PropertyEasing::default(),
            control_points: [Point::default(); 2],
        }
    }

    /// Drives `property` towards `value` with the given easing.
    pub fn animate(mut self, property: StyleProperty, value: f32, easing: Easing) -> Self {
        self.enabled |= property_flag(property);
        self.values.set(property, value);
        self.easing.set(property, easing);
        self
    }

    pub fn quadratic(mut self, cp1: Point) -> Self {
        self.enabled |= KeyframeProperties::CP1;
        self.enabled.remove(KeyframeProperties::CP2);
        self.control_points[0] = cp1;
        self
    }

    pub fn cubic(mut self, cp1: Point, cp2: Point) -> Self {
        self.enabled |= KeyframeProperties::CP1 | KeyframeProperties::CP2;
        self.control_points = [cp1, cp2];
        self
    }

    pub fn contains(&self, position: f32) -> bool {
        position >= self.start && position <= self.end
    }

    fn drives(&self, property: StyleProperty) -> bool {
        self.enabled.contains(property_flag(property))
    }

    fn progress(&self, position: f32) -> f32 {
        if self.start == self.end {
            1.0
        } else {
            (position - self.start) / (self.end - self.start)
        }
    }

    /// Interpolates one position axis, using the control points when enabled.
    fn interpolate_axis(&self, from: f32, to: f32, c1: f32, c2: f32, t: f32) -> f32 {
        let u = 1.0 - t;
        if self
            .enabled
            .contains(KeyframeProperties::CP1 | KeyframeProperties::CP2)
        {
            u * u * u * from + 3.0 * u * u * t * c1 + 3.0 * u * t * t * c2 + t * t * t * to
        } else if self.enabled.contains(KeyframeProperties::CP1) {
            u * u * from + 2.0 * u * t * c1 + t * t * to
        } else {
            from + t * (to - from)
        }
    }
}

/// Computes the property values at `position`, starting from `baseline`.
pub fn interpolate(
    keyframes: &[TimelineKeyframe],
    baseline: PropertyValues,
    position: f32,
) -> PropertyValues {
    let mut current = baseline;
    for keyframe in keyframes {
        if position < keyframe.start {
            continue;
        }

        if position <= keyframe.end {
            let t = keyframe.progress(position);
            let [cp1, cp2] = keyframe.control_points;
            for property in StyleProperty::ALL {
                if !keyframe.drives(property) {
                    continue;
                }
                let t2 = keyframe.easing.get(property).apply(t);
                let from = current.get(property);
                let to = keyframe.values.get(property);
                let value = match property {
                    StyleProperty::X => keyframe.interpolate_axis(from, to, cp1.x, cp2.x, t2),
                    StyleProperty::Y => keyframe.interpolate_axis(from, to, cp1.y, cp2.y, t2),
                    _ => from + t2 * (to - from),
                };
                current.set(property, value);
            }
            break;
        }

        // Entirely in the past: hold its targets
        for property in StyleProperty::ALL {
            if keyframe.drives(property) {
                current.set(property, keyframe.values.get(property));
            }
        }
    }
    current
}

/// The keyframes of one object plus its lazily captured baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetTimeline {
    pub object: ObjectId,
    pub flow_state: FlowStateId,
    keyframes: Vec<TimelineKeyframe>,
    baseline: Option<PropertyValues>,
    last_position: Option<f32>,
}

impl WidgetTimeline {
    pub fn new(object: ObjectId, flow_state: FlowStateId, keyframes: Vec<TimelineKeyframe>) -> Self {
        Self {
            object,
            flow_state,
            keyframes,
            baseline: None,
            last_position: None,
        }
    }

    pub fn keyframes(&self) -> &[TimelineKeyframe] {
        &self.keyframes
    }

    pub fn baseline(&self) -> Option<PropertyValues> {
        self.baseline
    }

    /// Forgets the captured baseline; the next evaluation captures it again.
    pub fn clear_baseline(&mut self) {
        self.baseline = None;
        self.last_position = None;
    }

    /// Evaluates the timeline at `position` and writes the result to the object.
    ///
    /// Returns `None` without touching the UI when `position` equals the previously
    /// evaluated position.
    pub fn evaluate(&mut self, position: f32, ui: &mut dyn UiSurface) -> Option<PropertyValues> {
        if self.last_position == Some(position) {
            return None;
        }
        self.last_position = Some(position);

        let object = self.object;
        let baseline = *self
            .baseline
            .get_or_insert_with(|| PropertyValues::capture(&*ui, object));
        let values = interpolate(&self.keyframes, baseline, position);

        for property in StyleProperty::ALL {
            let value = values.get(property);
            let sized = matches!(property, StyleProperty::Width | StyleProperty::Height);
            if sized && value == AUTO_SIZE {
                continue;
            }
            ui.set_style(object, property, value.round() as i32);
        }
        log::trace!("Timeline of {} evaluated at {}: {:?}", object, position, values);
        Some(values)
    }
}

/// All active timelines, evaluated once per tick.
#[derive(Debug, Default, Clone)]
pub struct TimelineSet {
    timelines: Vec<WidgetTimeline>,
}

impl TimelineSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a timeline, replacing any existing one for the same object.
    pub fn insert(&mut self, timeline: WidgetTimeline) {
        self.remove_object(timeline.object);
        self.timelines.push(timeline);
    }

    pub fn get(&self, object: ObjectId) -> Option<&WidgetTimeline> {
        self.timelines.iter().find(|t| t.object == object)
    }

    pub fn get_mut(&mut self, object: ObjectId) -> Option<&mut WidgetTimeline> {
        self.timelines.iter_mut().find(|t| t.object == object)
    }

    pub fn len(&self) -> usize {
        self.timelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timelines.is_empty()
    }

    pub fn remove_object(&mut self, object: ObjectId) -> bool {
        let before = self.timelines.len();
        self.timelines.retain(|t| t.object != object);
        before != self.timelines.len()
    }

    pub fn remove_flow_state(&mut self, flow_state: FlowStateId) {
        self.timelines.retain(|t| t.flow_state != flow_state);
    }

    /// Evaluates every timeline at the position reported for its flow state.
    ///
    /// Timelines whose flow state has no position are skipped.
    pub fn evaluate_all<F>(&mut self, ui: &mut dyn UiSurface, mut position_of: F) -> usize
    where
        F: FnMut(FlowStateId) -> Option<f32>,
    {
        let mut applied = 0;
        for timeline in &mut self.timelines {
            if let Some(position) = position_of(timeline.flow_state) {
                if timeline.evaluate(position, ui).is_some() {
                    applied += 1;
                }
            }
        }
        applied
    }
}
