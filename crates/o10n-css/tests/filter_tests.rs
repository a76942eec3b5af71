//! Integration tests for the filter engine and configuration loading.

use o10n_common::Notices;
use o10n_css::config::{LoadPosition, RawConfig, Settings, UrlAction};
use o10n_css::{ConfigFilter, FilterDecision, FilterMode, ListFilter};
use serde_json::json;

// ========== List filters ==========

#[test]
fn test_list_include_matches_listed_tag() {
    let mut notices = Notices::new();
    let filter = ListFilter::from_value(FilterMode::Include, &json!(["a.css"]), &mut notices)
        .expect("filter compiles");
    assert!(filter.matches(r#"<link rel="stylesheet" href="a.css">"#));
    assert!(!filter.matches(r#"<link rel="stylesheet" href="b.css">"#));
}

#[test]
fn test_list_exclude_inverts_outcome() {
    let mut notices = Notices::new();
    let filter = ListFilter::from_value(FilterMode::Exclude, &json!(["a.css"]), &mut notices)
        .expect("filter compiles");
    assert!(!filter.matches(r#"<link rel="stylesheet" href="a.css">"#));
    assert!(filter.matches(r#"<link rel="stylesheet" href="b.css">"#));
}

#[test]
fn test_list_regex_entries() {
    let mut notices = Notices::new();
    let filter = ListFilter::from_value(
        FilterMode::Include,
        &json!([{"string": "/theme-\\d+\\.css/i", "regex": true}]),
        &mut notices,
    )
    .expect("filter compiles");
    assert!(filter.matches(r#"<link href="/THEME-42.css">"#));
    assert!(!filter.matches(r#"<link href="/theme-x.css">"#));
}

#[test]
fn test_invalid_regex_is_a_notice() {
    let mut notices = Notices::new();
    let filter = ListFilter::from_value(
        FilterMode::Include,
        &json!([{"string": "(", "regex": true}]),
        &mut notices,
    );
    assert!(filter.is_none());
    assert_eq!(notices.len(), 1);
}

// ========== Rule filters ==========

#[test]
fn test_first_matching_rule_assigns_group() {
    let mut notices = Notices::new();
    let filter = ConfigFilter::from_value(
        FilterMode::Include,
        &json!([
            {"match": ["theme"], "group": {"key": "theme"}},
            {"match": ["theme", "plugin"], "group": {"key": "plugins"}}
        ]),
        &mut notices,
    )
    .expect("filter compiles");

    match filter.evaluate("<link href=/theme/a.css>") {
        FilterDecision::Matched(rule) => assert_eq!(rule.key(), "theme"),
        other => panic!("unexpected decision {other:?}"),
    }
    match filter.evaluate("<link href=/plugin/a.css>") {
        FilterDecision::Matched(rule) => assert_eq!(rule.key(), "plugins"),
        other => panic!("unexpected decision {other:?}"),
    }
    assert!(matches!(
        filter.evaluate("<link href=/other.css>"),
        FilterDecision::Unmatched
    ));
}

#[test]
fn test_exclude_entry_rejects_after_assignment() {
    let mut notices = Notices::new();
    let filter = ConfigFilter::from_value(
        FilterMode::Include,
        &json!([
            {"match": ["theme"]},
            {"match": [{"string": "print", "exclude": true}]}
        ]),
        &mut notices,
    )
    .expect("filter compiles");

    assert!(matches!(
        filter.evaluate("<link href=/theme/print.css>"),
        FilterDecision::Rejected
    ));
    assert!(matches!(
        filter.evaluate("<link href=/theme/screen.css>"),
        FilterDecision::Matched(_)
    ));
}

#[test]
fn test_rule_key_defaults_to_rule_hash() {
    let mut notices = Notices::new();
    let filter = ConfigFilter::from_value(FilterMode::Include, &json!([{"match": ["a"]}]), &mut notices)
        .expect("filter compiles");
    let key = filter.rules()[0].key();
    assert_eq!(key.len(), 64);
    assert!(filter.rules()[0].explicit_key().is_none());
}

#[test]
fn test_unmatched_follows_filter_mode() {
    assert!(FilterDecision::Unmatched.selected(FilterMode::Include));
    assert!(!FilterDecision::Unmatched.selected(FilterMode::Exclude));
    assert!(!FilterDecision::Rejected.selected(FilterMode::Include));
}

#[test]
fn test_malformed_rule_list_is_pass_through() {
    let mut notices = Notices::new();
    let filter = ConfigFilter::from_value(FilterMode::Include, &json!({"match": "x"}), &mut notices);
    assert!(filter.is_none());
    assert!(!notices.is_empty());
}

#[test]
fn test_split_concat_rules() {
    let mut notices = Notices::new();
    let (tags, groups) = ConfigFilter::split_concat(
        FilterMode::Include,
        &json!([
            {"match": ["a.css"], "async": false},
            {"match_concat": ["global"], "localStorage": true}
        ]),
        &mut notices,
    );
    assert_eq!(tags.map(|f| f.rules().len()), Some(1));
    assert_eq!(groups.map(|f| f.rules().len()), Some(1));
}

// ========== Settings ==========

#[test]
fn test_settings_disabled_sections_are_none() {
    let mut notices = Notices::new();
    let settings = Settings::load(&RawConfig::default(), &mut notices);
    assert!(settings.minify.is_none());
    assert!(settings.concat.is_none());
    assert!(settings.async_load.is_none());
    assert!(!settings.is_active());
}

#[test]
fn test_settings_load_full_tree() {
    let raw = RawConfig::from_json(
        r#"{
            "minify": {
                "enabled": true,
                "filter": {"enabled": true, "type": "exclude", "exclude": ["admin"]},
                "concat": {"enabled": true, "minify": true, "inline": {"enabled": true}}
            },
            "async": {
                "enabled": true,
                "load_position": "timing",
                "load_timing": {"type": "requestIdleCallback", "timeout": 500},
                "localStorage": {"enabled": true, "max_size": 10000}
            },
            "url_filter": {"enabled": true, "config": [
                {"url": "ads.css", "delete": true},
                {"url": "/old\\.css$/", "regex": true, "replace": "/new.css"}
            ]}
        }"#,
    )
    .expect("valid config");
    let mut notices = Notices::new();
    let settings = Settings::load(&raw, &mut notices);

    assert!(notices.is_empty());
    let minify = settings.minify.as_ref().expect("minify enabled");
    assert!(minify.rebase);
    assert!(!minify.filter.as_ref().expect("filter").matches("<link href=admin.css>"));
    let concat = settings.concat.as_ref().expect("concat enabled");
    assert!(matches!(concat.inline, Some(None)));

    let page = settings.async_load.as_ref().expect("async enabled");
    assert_eq!(page.load_position, LoadPosition::Timing);
    assert!(page.load_timing.is_some());
    assert!(page.local_storage.is_some());

    assert_eq!(settings.url_filter.len(), 2);
    assert_eq!(settings.url_filter[0].action, Some(UrlAction::Delete));
    assert_eq!(
        settings.url_filter[1].action,
        Some(UrlAction::Replace("/new.css".to_string()))
    );
}
