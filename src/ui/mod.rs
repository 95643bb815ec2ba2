//! The UI mutation surface the engine writes to, and the deferred update queue.
//!
//! The engine never creates or destroys UI objects. It only reads and writes their
//! property values through [`UiSurface`] and drops its references when notified of a
//! deletion.

pub mod update;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use update::{FlushReport, TaskLifetime, UpdateKind, UpdateQueue, UpdateTask};

/// Non-owning handle to a host UI object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Boolean object states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectState {
    Checked,
    Disabled,
}

/// Boolean object flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectFlag {
    Hidden,
    Clickable,
}

/// Style properties driven by timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleProperty {
    X,
    Y,
    Width,
    Height,
    Opacity,
    Scale,
    Rotation,
}

impl StyleProperty {
    pub const ALL: [StyleProperty; 7] = [
        StyleProperty::X,
        StyleProperty::Y,
        StyleProperty::Width,
        StyleProperty::Height,
        StyleProperty::Opacity,
        StyleProperty::Scale,
        StyleProperty::Rotation,
    ];
}

/// Getter/setter pairs of the host toolkit.
pub trait UiSurface {
    fn text(&self, object: ObjectId) -> Option<String>;
    fn set_text(&mut self, object: ObjectId, text: &str);

    fn slider_value(&self, object: ObjectId) -> i32;
    fn set_slider_value(&mut self, object: ObjectId, value: i32, animate: bool);

    fn bar_value(&self, object: ObjectId) -> i32;
    fn set_bar_value(&mut self, object: ObjectId, value: i32, animate: bool);

    fn arc_value(&self, object: ObjectId) -> i32;
    fn set_arc_value(&mut self, object: ObjectId, value: i32);

    fn has_state(&self, object: ObjectId, state: ObjectState) -> bool;
    fn set_state(&mut self, object: ObjectId, state: ObjectState, enabled: bool);

    fn has_flag(&self, object: ObjectId, flag: ObjectFlag) -> bool;
    fn set_flag(&mut self, object: ObjectId, flag: ObjectFlag, enabled: bool);

    fn style(&self, object: ObjectId, property: StyleProperty) -> i32;
    fn set_style(&mut self, object: ObjectId, property: StyleProperty, value: i32);
}

/// State of one object in a [`HeadlessUi`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessObject {
    pub text: Option<String>,
    pub slider: i32,
    pub bar: i32,
    pub arc: i32,
    pub checked: bool,
    pub disabled: bool,
    pub hidden: bool,
    pub clickable: bool,
    pub styles: AHashMap<StyleProperty, i32>,
}

/// An in-memory UI surface that counts every write, for headless runs and tests.
#[derive(Debug, Default, Clone)]
pub struct HeadlessUi {
    objects: AHashMap<ObjectId, HeadlessObject>,
    writes: usize,
}

impl HeadlessUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: ObjectId, state: HeadlessObject) {
        self.objects.insert(object, state);
    }

    pub fn remove(&mut self, object: ObjectId) -> Option<HeadlessObject> {
        self.objects.remove(&object)
    }

    pub fn object(&self, object: ObjectId) -> Option<&HeadlessObject> {
        self.objects.get(&object)
    }

    /// Total number of setter calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn read(&self, object: ObjectId) -> HeadlessObject {
        self.objects.get(&object).cloned().unwrap_or_default()
    }

    fn write(&mut self, object: ObjectId) -> &mut HeadlessObject {
        self.writes += 1;
        self.objects.entry(object).or_default()
    }
}

impl UiSurface for HeadlessUi {
    fn text(&self, object: ObjectId) -> Option<String> {
        self.objects.get(&object).and_then(|o| o.text.clone())
    }

    fn set_text(&mut self, object: ObjectId, text: &str) {
        self.write(object).text = Some(text.to_string());
    }

    fn slider_value(&self, object: ObjectId) -> i32 {
        self.read(object).slider
    }

    fn set_slider_value(&mut self, object: ObjectId, value: i32, _animate: bool) {
        self.write(object).slider = value;
    }

    fn bar_value(&self, object: ObjectId) -> i32 {
        self.read(object).bar
    }

    fn set_bar_value(&mut self, object: ObjectId, value: i32, _animate: bool) {
        self.write(object).bar = value;
    }

    fn arc_value(&self, object: ObjectId) -> i32 {
        self.read(object).arc
    }

    fn set_arc_value(&mut self, object: ObjectId, value: i32) {
        self.write(object).arc = value;
    }

    fn has_state(&self, object: ObjectId, state: ObjectState) -> bool {
        let o = self.read(object);
        match state {
            ObjectState::Checked => o.checked,
            ObjectState::Disabled => o.disabled,
        }
    }

    fn set_state(&mut self, object: ObjectId, state: ObjectState, enabled: bool) {
        let o = self.write(object);
        match state {
            ObjectState::Checked => o.checked = enabled,
            ObjectState::Disabled => o.disabled = enabled,
        }
    }

    fn has_flag(&self, object: ObjectId, flag: ObjectFlag) -> bool {
        let o = self.read(object);
        match flag {
            ObjectFlag::Hidden => o.hidden,
            ObjectFlag::Clickable => o.clickable,
        }
    }

    fn set_flag(&mut self, object: ObjectId, flag: ObjectFlag, enabled: bool) {
        let o = self.write(object);
        match flag {
            ObjectFlag::Hidden => o.hidden = enabled,
            ObjectFlag::Clickable => o.clickable = enabled,
        }
    }

    fn style(&self, object: ObjectId, property: StyleProperty) -> i32 {
        self.objects
            .get(&object)
            .and_then(|o| o.styles.get(&property).copied())
            .unwrap_or(0)
    }

    fn set_style(&mut self, object: ObjectId, property: StyleProperty, value: i32) {
        self.write(object).styles.insert(property, value);
    }
}
