// Unit tests for locator resolution

use super::*;
use crate::dom::ElementBuilder;
use pretty_assertions::assert_eq;

fn player_page(generation: u64) -> DomSnapshot {
    DomSnapshot::from_tree(
        generation,
        "http://localhost:3000/#/player/1",
        ElementBuilder::new("body").child(
            ElementBuilder::new("div").attr("id", "root").children([
                ElementBuilder::new("nav").children([
                    ElementBuilder::new("button").attr("role", "tab").text("Overview"),
                    ElementBuilder::new("button").attr("role", "tab").text("Actions"),
                ]),
                ElementBuilder::new("section")
                    .attr("id", "actions-panel")
                    .children([
                        ElementBuilder::new("button").text("Mute"),
                        ElementBuilder::new("button").text("Muted players"),
                        ElementBuilder::new("button").text("Wager"),
                    ]),
                ElementBuilder::new("div")
                    .attr("role", "dialog")
                    .attr("id", "mute-dialog")
                    .children([
                        ElementBuilder::new("h2").text("Mute playerone"),
                        ElementBuilder::new("textarea")
                            .attr("name", "reason")
                            .attr("placeholder", "Mute reason"),
                        ElementBuilder::new("button").text("Mute"),
                    ]),
                ElementBuilder::new("button")
                    .attr("aria-hidden", "true")
                    .text("Mute"),
            ]),
        ),
    )
}

fn dom_ids(dom: &DomSnapshot, handles: &[ElementHandle]) -> Vec<String> {
    handles
        .iter()
        .map(|h| {
            dom.node(h.node())
                .and_then(|n| n.attr("id").or(n.attr("name")))
                .unwrap_or(&dom.node(h.node()).unwrap().tag)
                .to_string()
        })
        .collect()
}

#[test]
fn test_text_match_normalises_whitespace() {
    assert!(TextMatch::exact("Mute  playerone").matches(" Mute\nplayerone "));
    assert!(!TextMatch::exact("Mute").matches("Mute playerone"));
    assert!(TextMatch::contains("player").matches("Mute playerone"));
    assert!(!TextMatch::contains("Player").matches("Mute playerone"));
}

#[test]
fn test_role_name_is_exact_by_default() {
    let dom = player_page(1);
    // Two visible "Mute" buttons, the aria-hidden one is skipped
    let handles = Locator::role_named("button", "Mute").resolve(&dom, None);
    assert_eq!(handles.len(), 2);

    let contains = Locator::role_named("button", TextMatch::contains("Mute")).resolve(&dom, None);
    assert_eq!(contains.len(), 3);
}

#[test]
fn test_scoping_restricts_to_descendants() {
    let dom = player_page(1);
    let dialog = Locator::role("dialog");
    let mute = dialog.get_by_role_named("button", "Mute").resolve(&dom, None);
    assert_eq!(mute.len(), 1);
    assert!(dom.is_descendant_of(mute[0].node(), dom.by_dom_id("mute-dialog").unwrap()));

    let reason = dialog.get_by_placeholder("Mute reason").resolve(&dom, None);
    assert_eq!(dom_ids(&dom, &reason), vec!["reason"]);
}

#[test]
fn test_scope_excludes_the_scope_itself() {
    let dom = player_page(1);
    let nested = Locator::role("dialog").get_by_role("dialog").resolve(&dom, None);
    assert!(nested.is_empty());
}

#[test]
fn test_css_inside_scope_matches_whole_document_path() {
    let dom = player_page(1);
    let scoped = Locator::role("dialog")
        .locator("#root textarea[name='reason']")
        .unwrap()
        .resolve(&dom, None);
    assert_eq!(scoped.len(), 1);
}

#[test]
fn test_nth_and_first() {
    let dom = player_page(1);
    let tabs = Locator::role("tab");
    assert_eq!(tabs.resolve(&dom, None).len(), 2);

    let first = tabs.first().resolve(&dom, None);
    assert_eq!(dom.text_content(first[0].node()), "Overview");
    let second = tabs.nth(1).resolve(&dom, None);
    assert_eq!(dom.text_content(second[0].node()), "Actions");
    assert!(tabs.nth(5).resolve(&dom, None).is_empty());
}

#[test]
fn test_text_query_returns_innermost_match() {
    let dom = player_page(1);
    let handles = Locator::text(TextMatch::contains("Wager")).resolve(&dom, None);
    assert_eq!(handles.len(), 1);
    assert_eq!(dom.node(handles[0].node()).unwrap().tag, "button");
}

#[test]
fn test_handles_carry_generation_and_stale_scope_resolves_nothing() {
    let dom = player_page(7);
    let dialog = Locator::role("dialog").resolve(&dom, None);
    assert_eq!(dialog[0].generation(), 7);

    let next = player_page(8);
    let stale = Locator::role("button").resolve(&next, Some(&dialog[0]));
    assert!(stale.is_empty());

    let fresh = Locator::role("dialog").resolve(&next, None);
    let inner = Locator::role("button").resolve(&next, Some(&fresh[0]));
    assert_eq!(inner.len(), 1);
}

#[test]
fn test_locator_survives_re_render() {
    let locator = Locator::role_named("button", "Wager");
    let before = locator.resolve(&player_page(1), None);
    let after = locator.resolve(&player_page(2), None);
    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 1);
    assert_ne!(before[0], after[0]);
}

#[test]
fn test_description() {
    let locator = Locator::role("dialog")
        .get_by_role_named("heading", TextMatch::contains("Mute"))
        .first();
    assert_eq!(
        locator.to_string(),
        "role=dialog >> role=heading[name=*\"Mute\"] >> nth=0"
    );
    assert_eq!(
        Locator::css("tbody > tr:first-child").unwrap().to_string(),
        "css=tbody > tr:first-child"
    );
    assert_eq!(
        Locator::placeholder("Mute reason").to_string(),
        "placeholder=\"Mute reason\""
    );
}

#[test]
fn test_invalid_css_is_rejected_at_construction() {
    assert!(matches!(
        Locator::css("div >"),
        Err(HarnessError::InvalidLocator(_))
    ));
}

#[test]
fn test_json_form() {
    let locator: Locator = serde_json::from_str(
        r#"{"role": "heading", "name": {"contains": "Mute"}, "within": {"role": "dialog"}}"#,
    )
    .unwrap();
    assert_eq!(
        locator,
        Locator::role("dialog").get_by_role_named("heading", TextMatch::contains("Mute"))
    );

    let plain: Locator = serde_json::from_str(r#"{"role": "button", "name": "Mute"}"#).unwrap();
    assert_eq!(plain, Locator::role_named("button", "Mute"));

    let css: Locator = serde_json::from_str(r#"{"css": "tbody > tr", "nth": 0}"#).unwrap();
    assert_eq!(css, Locator::css("tbody > tr").unwrap().first());

    let value = serde_json::to_value(&locator).unwrap();
    let back: Locator = serde_json::from_value(value).unwrap();
    assert_eq!(back, locator);
}

#[test]
fn test_json_form_rejects_bad_shapes() {
    for raw in [
        r#"{}"#,
        r#"{"role": "button", "css": "button"}"#,
        r#"{"placeholder": "x", "name": "y"}"#,
        r#"{"css": "div >"}"#,
        r#"{"role": "button", "label": "Mute"}"#,
    ] {
        assert!(
            serde_json::from_str::<Locator>(raw).is_err(),
            "{} should be rejected",
            raw
        );
    }
}

#[test]
fn test_outer_scope_matching_several_elements_searches_each() {
    let dom = player_page(1);
    let containers = Locator::css("section, div[role='dialog']").unwrap();
    let mutes = containers.get_by_role_named("button", "Mute").resolve(&dom, None);
    assert_eq!(mutes.len(), 2);
    assert!(mutes.iter().all(|h| h.generation() == 1));

    // Each call re-evaluates from scratch against the snapshot it is given
    let rerendered = player_page(2);
    let again = containers.get_by_role_named("button", "Mute").resolve(&rerendered, None);
    let nodes = |handles: &[ElementHandle]| handles.iter().map(|h| h.node()).collect::<Vec<_>>();
    assert_eq!(nodes(&again), nodes(&mutes));
    assert!(again.iter().all(|h| h.generation() == 2));
}
