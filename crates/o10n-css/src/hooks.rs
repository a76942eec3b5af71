//! Extension points run while stylesheets are extracted.

/// Decision of a [`StylesheetHook`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    /// Continue unchanged.
    Keep,
    /// Leave the tag in the page and exclude it from processing.
    Ignore,
    /// Remove the tag from the page.
    Delete,
    /// Continue with a replacement value (href for links, CSS for blocks).
    Replace(String),
}

/// Callback inspecting every extracted stylesheet before processing.
pub trait StylesheetHook {
    /// Called for each `<link rel="stylesheet">` with its href and tag.
    fn stylesheet_pre(&self, href: &str, tag: &str) -> HookAction {
        let _ = (href, tag);
        HookAction::Keep
    }

    /// Called for each inline `<style>` block with its CSS and tag.
    fn style_pre(&self, css: &str, tag: &str) -> HookAction {
        let _ = (css, tag);
        HookAction::Keep
    }
}

/// Run hooks in order; the first non-`Keep` decision wins, except that
/// replacements chain into later hooks.
pub(crate) fn run<F>(hooks: &[Box<dyn StylesheetHook>], value: &str, call: F) -> HookAction
where
    F: Fn(&dyn StylesheetHook, &str) -> HookAction,
{
    let mut current: Option<String> = None;
    for hook in hooks {
        match call(hook.as_ref(), current.as_deref().unwrap_or(value)) {
            HookAction::Keep => {}
            HookAction::Replace(next) => current = Some(next),
            decision => return decision,
        }
    }
    current.map_or(HookAction::Keep, HookAction::Replace)
}
