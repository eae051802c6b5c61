// Unit tests for selector matching over snapshots

use super::*;
use crate::dom::ElementBuilder;

fn players_table() -> DomSnapshot {
    let row = |id: &str, name: &str| {
        ElementBuilder::new("tr")
            .attr("data-player", id)
            .child(ElementBuilder::new("td").text(name))
    };
    DomSnapshot::from_tree(
        1,
        "",
        ElementBuilder::new("body").child(
            ElementBuilder::new("div")
                .attr("id", "root")
                .attr("class", "page players")
                .child(
                    ElementBuilder::new("table")
                        .child(ElementBuilder::new("thead").child(
                            ElementBuilder::new("tr").child(ElementBuilder::new("th").text("Name")),
                        ))
                        .child(ElementBuilder::new("tbody").children([
                            row("1", "playerone"),
                            row("2", "playertwo"),
                            row("3", "playerthree"),
                        ])),
                )
                .child(
                    ElementBuilder::new("div")
                        .attr("role", "dialog")
                        .child(ElementBuilder::new("input").attr("name", "duration"))
                        .child(ElementBuilder::new("textarea").attr("name", "reason")),
                ),
        ),
    )
}

fn matching(dom: &DomSnapshot, source: &str) -> Vec<NodeId> {
    let selector = Selector::parse(source).unwrap();
    (0..dom.len()).filter(|id| selector.matches(dom, *id)).collect()
}

fn attr_of(dom: &DomSnapshot, id: NodeId, name: &str) -> String {
    dom.node(id).unwrap().attr(name).unwrap_or("").to_string()
}

#[test]
fn test_child_combinator_with_first_child() {
    let dom = players_table();
    let rows = matching(&dom, "tbody > tr:first-child");
    assert_eq!(rows.len(), 1);
    assert_eq!(attr_of(&dom, rows[0], "data-player"), "1");

    // The header row is a first child too, but not of tbody
    assert_eq!(matching(&dom, "tr:first-child").len(), 2);
}

#[test]
fn test_nth_and_last_child() {
    let dom = players_table();
    let rows = matching(&dom, "tbody tr:nth-child(2)");
    assert_eq!(attr_of(&dom, rows[0], "data-player"), "2");
    let rows = matching(&dom, "tbody > tr:last-child");
    assert_eq!(attr_of(&dom, rows[0], "data-player"), "3");
}

#[test]
fn test_attribute_selectors() {
    let dom = players_table();
    assert_eq!(matching(&dom, "div[role='dialog']").len(), 1);
    assert_eq!(matching(&dom, "div[role=\"dialog\"]").len(), 1);
    assert_eq!(matching(&dom, "input[name=duration]").len(), 1);
    assert_eq!(matching(&dom, "[data-player]").len(), 3);
    assert_eq!(matching(&dom, "tr[data-player^='player']").len(), 0);
    assert_eq!(matching(&dom, "div[class~=players]").len(), 1);
    assert_eq!(matching(&dom, "div[class*='age pl']").len(), 1);
    assert_eq!(matching(&dom, "div[class$=players]").len(), 1);
}

#[test]
fn test_id_class_and_lists() {
    let dom = players_table();
    assert_eq!(matching(&dom, "#root").len(), 1);
    assert_eq!(matching(&dom, "div.page.players").len(), 1);
    assert_eq!(matching(&dom, ".missing").len(), 0);
    assert_eq!(matching(&dom, "input, textarea").len(), 2);
    assert_eq!(matching(&dom, "#root > *").len(), 2);
    assert_eq!(matching(&dom, "div[role='dialog'] textarea[name=\"reason\"]").len(), 1);
}

#[test]
fn test_malformed_selectors_are_rejected() {
    for source in ["", "div >", "tr:bogus", "a[b=", "div]", "a,", "::before"] {
        let result = Selector::parse(source);
        assert!(
            matches!(result, Err(HarnessError::InvalidLocator(_))),
            "selector {:?} should be rejected",
            source
        );
    }
}

#[test]
fn test_structural_pseudo_classes_and_has() {
    let dom = players_table();
    assert_eq!(matching(&dom, "tbody > tr:nth-child(odd)").len(), 2);
    assert_eq!(matching(&dom, "tr:not(:first-child)").len(), 2);
    assert_eq!(matching(&dom, "tbody tr:nth-last-child(1)").len(), 1);
    assert_eq!(matching(&dom, "input:only-of-type").len(), 1);
    assert_eq!(matching(&dom, "div:has(> textarea)").len(), 1);
    assert_eq!(matching(&dom, "thead + tbody").len(), 1);
    assert_eq!(matching(&dom, "table ~ div").len(), 1);
    assert_eq!(matching(&dom, "input:empty").len(), 1);
    assert_eq!(matching(&dom, "body:root").len(), 1);
}

#[test]
fn test_invalid_node_never_matches() {
    let dom = players_table();
    let selector = Selector::parse("*").unwrap();
    assert!(!selector.matches(&dom, dom.len()));
}

#[test]
fn test_display_uses_source() {
    let selector = Selector::parse("  tbody > tr:first-child ").unwrap();
    assert_eq!(selector.to_string(), "tbody > tr:first-child");
}
