//! Connect / disconnect behaviour of bridged elements.

mod common;

use common::{attach, card, create, detach, field, turn};
use elementum::{StrategyState, prelude::*};
use futures::FutureExt;
use serde_json::json;

#[test]
fn reattach_within_a_turn_keeps_the_instance() {
    let runtime = Runtime::new();
    let definition = card(&runtime);
    let (element, host) = create(&definition);

    attach(&element, &host);
    assert_eq!(field(&host, "instance"), "1");

    detach(&element, &host);
    attach(&element, &host);
    turn(&runtime);
    assert_eq!(field(&host, "instance"), "1");
    assert_eq!(
        element.strategy().map(|strategy| strategy.state()),
        Some(StrategyState::Connected)
    );
}

#[test]
fn reattach_after_a_turn_recreates_the_instance() {
    let runtime = Runtime::new();
    let definition = card(&runtime);
    let (element, host) = create(&definition);

    attach(&element, &host);
    assert_eq!(field(&host, "instance"), "1");

    detach(&element, &host);
    turn(&runtime);
    assert!(host.content().is_empty());
    assert_eq!(
        element.strategy().map(|strategy| strategy.state()),
        Some(StrategyState::Detached)
    );

    attach(&element, &host);
    assert_eq!(field(&host, "instance"), "2");
    assert_eq!(field(&host, "root"), "1");
}

#[test]
fn exposed_methods_follow_the_connection() {
    let runtime = Runtime::new();
    let definition = card(&runtime);
    let (element, host) = create(&definition);
    element.set_property("title", json!("news")).expect("input");

    let detached = element.call("describe", Vec::new()).now_or_never();
    assert!(matches!(detached, Some(Err(ElementError::Detached))));

    attach(&element, &host);
    let described = element
        .call("describe", Vec::new())
        .now_or_never()
        .expect("sync methods settle immediately");
    assert_eq!(described.expect("describe"), json!("card news"));

    detach(&element, &host);
    let detached = element.call("describe", Vec::new()).now_or_never();
    assert!(matches!(detached, Some(Err(ElementError::Detached))));
    assert_eq!(
        ElementError::Detached.to_string(),
        "Component is detached from DOM"
    );
}

#[test]
fn unexposed_methods_are_rejected() {
    let runtime = Runtime::new();
    let definition = card(&runtime);
    let (element, host) = create(&definition);
    attach(&element, &host);

    let result = element.call("render", Vec::new()).now_or_never();
    assert!(matches!(result, Some(Err(ElementError::UnknownMethod(_)))));
}

#[test]
fn same_value_twice_renders_once() {
    let runtime = Runtime::new();
    let definition = card(&runtime);
    let (element, host) = create(&definition);
    attach(&element, &host);
    turn(&runtime);
    let renders = host.render_count();

    element.set_property("title", json!("same")).expect("input");
    element.set_property("title", json!("same")).expect("input");
    turn(&runtime);
    assert_eq!(host.render_count(), renders + 1);
    assert_eq!(field(&host, "title"), "same");

    turn(&runtime);
    assert_eq!(host.render_count(), renders + 1);
}

#[test]
fn content_is_projected_into_declared_slots() {
    let runtime = Runtime::new();
    let definition = card(&runtime);
    let (element, host) = create(&definition);
    host.append_child(ContentNode::element("header").inner("Top"));
    host.append_child(ContentNode::text("body"));

    attach(&element, &host);
    assert_eq!(field(&host, "header"), "<header>Top</header>");
    assert!(host.children().is_empty());
}
