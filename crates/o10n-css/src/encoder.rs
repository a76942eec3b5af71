//! Positional encoding of the async stylesheet list.
//!
//! Each entry is a JSON array decoded by position:
//!
//! ```text
//! [prefix?, id, media, load, render, localStorage]
//! ```
//!
//! `prefix` is `1` for plain URLs and `2` for proxied sheets; `src` and
//! `concat` entries carry no prefix. Trailing slots holding page defaults
//! are omitted; an empty slot before a present one is filled with
//! [`NULL_SENTINEL`], which the loader reads as "page default".

use serde_json::{Map, Value, json};
use strum_macros::{AsRefStr, Display};

use crate::client::ClientConfig;
use crate::config::{AsyncOverrides, AsyncSettings, LoadPosition};
use crate::pipeline::CLIENT_MODULE;
use crate::timing::ClientKey;

/// Placeholder for a slot left at its page default.
pub const NULL_SENTINEL: &str = "__NULL__";

/// How the loader resolves an entry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    /// The id is the stylesheet URL.
    Url,
    /// The id is a proxy cache hash.
    Proxy,
    /// The id is a `src` cache hash.
    Src,
    /// The id is a `concat` cache hash.
    Concat,
}

impl EntryKind {
    /// Leading type marker, if the kind has one.
    #[must_use]
    pub const fn prefix(self) -> Option<u8> {
        match self {
            Self::Url => Some(1),
            Self::Proxy => Some(2),
            Self::Src | Self::Concat => None,
        }
    }
}

/// One stylesheet in the async list.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncEntry {
    /// Id type.
    pub kind: EntryKind,
    /// Hash or URL.
    pub id: String,
    /// Original URL(s), for debug references.
    pub original_urls: Vec<String>,
    /// Effective media query.
    pub media: String,
    /// Options differing from the page defaults.
    pub overrides: AsyncOverrides,
}

fn media_slot(entry: &AsyncEntry) -> Option<Value> {
    let media = entry.media.trim();
    (!media.is_empty() && media != "all").then(|| json!(media))
}

fn load_slot(overrides: &AsyncOverrides, page: &AsyncSettings) -> Option<Value> {
    match overrides.load_position.unwrap_or(page.load_position) {
        LoadPosition::Header => overrides
            .load_position
            .map(|_| json!(LoadPosition::Header.index())),
        LoadPosition::Timing => match (&overrides.load_timing, overrides.load_position) {
            (Some(timing), _) => Some(json!([LoadPosition::Timing.index(), timing.descriptor()])),
            (None, Some(_)) => Some(json!(LoadPosition::Timing.index())),
            (None, None) => None,
        },
    }
}

fn render_slot(overrides: &AsyncOverrides) -> Option<Value> {
    if let Some(timing) = &overrides.render_timing {
        return Some(timing.descriptor());
    }
    overrides.request_animation_frame.map(|raf| {
        if raf {
            json!([ClientKey::RequestAnimationFrame.index()])
        } else {
            json!(0)
        }
    })
}

/// Encode one entry against the page defaults.
#[must_use]
pub fn encode_entry(entry: &AsyncEntry, page: &AsyncSettings) -> Value {
    let mut out = Vec::with_capacity(6);
    if let Some(prefix) = entry.kind.prefix() {
        out.push(json!(prefix));
    }
    out.push(json!(entry.id));

    let slots = [
        media_slot(entry),
        load_slot(&entry.overrides, page),
        render_slot(&entry.overrides),
        entry.overrides.local_storage.as_ref().map(|ls| ls.encode()),
    ];
    let used = slots.iter().rposition(Option::is_some).map_or(0, |last| last + 1);
    out.extend(
        slots
            .into_iter()
            .take(used)
            .map(|slot| slot.unwrap_or_else(|| json!(NULL_SENTINEL))),
    );
    Value::Array(out)
}

/// The encoded list plus its companion keys.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedList {
    /// Encoded entries.
    pub entries: Vec<Value>,
    /// `1` when every entry is a concat group, else their indexes.
    pub concat: Option<Value>,
    /// Entry id to original URL(s), in debug mode.
    pub debug_refs: Option<Map<String, Value>>,
}

impl EncodedList {
    /// Write the list into the loader configuration.
    pub fn apply(self, client: &mut ClientConfig) {
        client.set_config(CLIENT_MODULE, "async", Value::Array(self.entries));
        if let Some(concat) = self.concat {
            client.set_config(CLIENT_MODULE, "concat", concat);
        }
        if let Some(refs) = self.debug_refs {
            client.set_config(CLIENT_MODULE, "debug_ref", Value::Object(refs));
        }
    }
}

/// Encode the ordered async list.
#[must_use]
pub fn encode_list(entries: &[AsyncEntry], page: &AsyncSettings, debug: bool) -> EncodedList {
    let concat_index: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind == EntryKind::Concat)
        .map(|(i, _)| i)
        .collect();
    let concat = if concat_index.is_empty() {
        None
    } else if concat_index.len() == entries.len() {
        Some(json!(1))
    } else {
        Some(json!(concat_index))
    };

    let debug_refs = debug.then(|| {
        entries
            .iter()
            .map(|entry| {
                let original = match (entry.kind, entry.original_urls.as_slice()) {
                    (EntryKind::Concat, urls) => json!(urls),
                    (_, [url]) => json!(url),
                    (_, urls) => json!(urls),
                };
                (entry.id.clone(), original)
            })
            .collect()
    });

    EncodedList {
        entries: entries.iter().map(|e| encode_entry(e, page)).collect(),
        concat,
        debug_refs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_slot_maps_animation_frame_flag() {
        let on = AsyncOverrides {
            request_animation_frame: Some(true),
            ..AsyncOverrides::default()
        };
        assert_eq!(render_slot(&on), Some(json!([3])));
        let off = AsyncOverrides {
            request_animation_frame: Some(false),
            ..AsyncOverrides::default()
        };
        assert_eq!(render_slot(&off), Some(json!(0)));
        assert_eq!(render_slot(&AsyncOverrides::default()), None);
    }
}
