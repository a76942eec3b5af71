//! Timing descriptors and the client key index table.
//!
//! The client loader receives configuration in a compressed positional
//! form: option names are replaced by small integers from [`ClientKey`],
//! and a timing config becomes `[typeIndex]` or
//! `[typeIndex, {"paramIndex": value}]`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use strum_macros::{AsRefStr, Display, EnumString};

/// Option names understood by the client loader, with their wire index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "camelCase")]
#[repr(u8)]
pub enum ClientKey {
    /// Load position: `<head>`.
    Header = 0,
    /// Load position: timed.
    Timing = 1,
    /// Timing type: DOM ready.
    DomReady = 2,
    /// Timing type: animation frame.
    RequestAnimationFrame = 3,
    /// Timing type: idle callback.
    RequestIdleCallback = 4,
    /// Timing type: element scrolled into view.
    Inview = 5,
    /// Timing type: media query match.
    Media = 6,
    /// Parameter: animation frame count.
    Frame = 7,
    /// Parameter: idle callback timeout.
    Timeout = 8,
    /// Parameter: `setTimeout` fallback.
    SetTimeout = 9,
    /// Parameter: in-view selector.
    Selector = 10,
    /// Parameter: in-view offset.
    Offset = 11,
    /// localStorage: maximum entry size.
    #[strum(serialize = "max_size")]
    MaxSize = 12,
    /// localStorage: expiry.
    #[strum(serialize = "expire")]
    Expire = 13,
    /// localStorage: background update interval.
    #[strum(serialize = "update_interval")]
    UpdateInterval = 14,
    /// localStorage: update on `<head>` load.
    #[strum(serialize = "head_update")]
    HeadUpdate = 15,
}

impl ClientKey {
    /// Wire index of the key.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Wire index as an object key.
    #[must_use]
    pub fn object_key(self) -> String {
        self.index().to_string()
    }
}

/// When a timed action runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimingType {
    /// On `DOMContentLoaded`.
    #[serde(alias = "domready")]
    DomReady,
    /// After N animation frames.
    #[serde(alias = "requestanimationframe")]
    RequestAnimationFrame,
    /// When the browser is idle.
    #[serde(alias = "requestidlecallback")]
    RequestIdleCallback,
    /// When an element scrolls into view.
    #[serde(alias = "inView")]
    Inview,
    /// When a media query matches.
    Media,
}

impl TimingType {
    /// Client key of the timing type.
    #[must_use]
    pub const fn key(self) -> ClientKey {
        match self {
            Self::DomReady => ClientKey::DomReady,
            Self::RequestAnimationFrame => ClientKey::RequestAnimationFrame,
            Self::RequestIdleCallback => ClientKey::RequestIdleCallback,
            Self::Inview => ClientKey::Inview,
            Self::Media => ClientKey::Media,
        }
    }

    /// Client module needed to execute this timing, if any.
    #[must_use]
    pub const fn client_module(self) -> Option<&'static str> {
        match self {
            Self::Inview => Some("inview"),
            Self::Media => Some("responsive"),
            _ => None,
        }
    }
}

/// A configured timing (`load_timing`, `render_timing`).
///
/// Numeric parameters accept numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Disabled configs are ignored.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Timing type.
    #[serde(rename = "type")]
    pub kind: TimingType,
    /// `requestAnimationFrame`: frame count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Value>,
    /// `requestIdleCallback`: timeout in ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Value>,
    /// `requestIdleCallback`: `setTimeout` fallback in ms.
    #[serde(
        default,
        rename = "setTimeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub set_timeout: Option<Value>,
    /// `inview`: CSS selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// `inview`: offset in px.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Value>,
    /// `media`: media query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

const fn enabled_default() -> bool {
    true
}

impl TimingConfig {
    /// A timing of the given type with no parameters.
    #[must_use]
    pub const fn new(kind: TimingType) -> Self {
        Self {
            enabled: true,
            kind,
            frame: None,
            timeout: None,
            set_timeout: None,
            selector: None,
            offset: None,
            media: None,
        }
    }

    /// Compressed client descriptor: `[type]` or `[type, {param: value}]`.
    ///
    /// Parameters are only emitted when they change the client default:
    /// a frame count above 1, non-zero idle timeouts, a non-empty selector,
    /// a positive offset, a non-empty media query.
    #[must_use]
    pub fn descriptor(&self) -> Value {
        let mut params = Map::new();
        let mut set = |key: ClientKey, value: Value| {
            let _ = params.insert(key.object_key(), value);
        };
        match self.kind {
            TimingType::RequestAnimationFrame => {
                let frame = numeric(self.frame.as_ref()).unwrap_or(1.0);
                if frame > 1.0 {
                    set(ClientKey::Frame, number(frame));
                }
            }
            TimingType::RequestIdleCallback => {
                if let Some(timeout) = numeric(self.timeout.as_ref()).filter(|t| *t != 0.0) {
                    set(ClientKey::Timeout, number(timeout));
                }
                if let Some(fallback) = numeric(self.set_timeout.as_ref()).filter(|t| *t != 0.0) {
                    set(ClientKey::SetTimeout, number(fallback));
                }
            }
            TimingType::Inview => {
                if let Some(selector) = trimmed(self.selector.as_deref()) {
                    set(ClientKey::Selector, json!(selector));
                }
                if let Some(offset) = numeric(self.offset.as_ref()).filter(|o| *o > 0.0) {
                    set(ClientKey::Offset, number(offset));
                }
            }
            TimingType::Media => {
                if let Some(media) = trimmed(self.media.as_deref()) {
                    set(ClientKey::Media, json!(media));
                }
            }
            TimingType::DomReady => {}
        }

        let kind = json!(self.kind.key().index());
        if params.is_empty() {
            json!([kind])
        } else {
            json!([kind, params])
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Read a number or numeric string.
pub(crate) fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Integral values are emitted as JSON integers.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}
