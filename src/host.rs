//! The DOM-facing side of an element.
//!
//! A [`HostElement`] is whatever node the custom element lives on. The browser
//! backend implements it over `web-sys`; [`MemoryHost`] implements it in
//! memory so the bridge can run headless.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fmt::{self, Write as _},
    rc::Rc,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A custom event dispatched on the host for every output emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementEvent {
    /// Event type, the dash-cased external name of the output.
    #[serde(rename = "type")]
    pub name: String,
    /// Emitted value.
    pub detail: Value,
}

impl ElementEvent {
    /// Creates an event.
    pub fn new(name: impl Into<String>, detail: Value) -> Self {
        Self {
            name: name.into(),
            detail,
        }
    }
}

/// The node a custom element is attached to.
pub trait HostElement {
    /// Tag name, used for diagnostics.
    fn tag_name(&self) -> String;

    /// Current value of an attribute.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Whether the node is currently in a document.
    fn is_connected(&self) -> bool;

    /// Removes the host's children and distributes them over `selectors`.
    ///
    /// Returns one bucket per selector; see [`project_nodes`].
    fn project_content(&self, selectors: &[String]) -> Vec<Vec<ContentNode>>;

    /// Replaces the rendered content (shadow root if any, else children).
    fn render(&self, markup: &str);

    /// Empties the rendered content without removing the host itself.
    fn clear_content(&self);

    /// Dispatches an event on the host.
    fn dispatch_event(&self, event: ElementEvent);
}

/// Distributes `nodes` over content projection `selectors`.
///
/// An element goes to the first selector it matches, ignoring `*`; elements
/// that match nothing and every non-element node go to the `*` bucket if one
/// exists. Nodes with no bucket are dropped.
pub fn project_nodes<N>(
    nodes: impl IntoIterator<Item = N>,
    selectors: &[String],
    is_element: impl Fn(&N) -> bool,
    matches: impl Fn(&N, &str) -> bool,
) -> Vec<Vec<N>> {
    let mut buckets: Vec<Vec<N>> = selectors.iter().map(|_| Vec::new()).collect();
    let wildcard = selectors.iter().position(|selector| selector == "*");

    for node in nodes {
        let slot = if is_element(&node) {
            selectors
                .iter()
                .position(|selector| selector != "*" && matches(&node, selector))
                .or(wildcard)
        } else {
            wildcard
        };
        if let Some(slot) = slot {
            buckets[slot].push(node);
        }
    }
    buckets
}

/// A detached child node of a host, handed to the component for projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    /// An element.
    Element {
        /// Lowercase tag name.
        tag: String,
        /// Attributes in document order.
        attributes: Vec<(String, String)>,
        /// Inner markup.
        inner: String,
    },
    /// A text node.
    Text(String),
}

impl ContentNode {
    /// An empty element.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into().to_ascii_lowercase(),
            attributes: Vec::new(),
            inner: String::new(),
        }
    }

    /// A text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Adds an attribute. No effect on text nodes.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Element { attributes, .. } = &mut self {
            attributes.push((name.into(), value.into()));
        }
        self
    }

    /// Sets the inner markup. No effect on text nodes.
    #[must_use]
    pub fn inner(mut self, markup: impl Into<String>) -> Self {
        if let Self::Element { inner, .. } = &mut self {
            *inner = markup.into();
        }
        self
    }

    /// Returns `true` for element nodes.
    #[must_use]
    pub const fn is_element(&self) -> bool {
        matches!(self, Self::Element { .. })
    }

    /// Value of an attribute.
    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        match self {
            Self::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            Self::Text(_) => None,
        }
    }

    /// Matches a simple CSS selector list.
    ///
    /// Supports `*`, tag names, `.class`, `#id`, `[attr]` and `[attr=value]`,
    /// compounds of those, and comma separated lists. Combinators are not supported.
    #[must_use]
    pub fn matches(&self, selector: &str) -> bool {
        self.is_element()
            && selector
                .split(',')
                .map(str::trim)
                .any(|compound| !compound.is_empty() && self.matches_compound(compound))
    }

    fn matches_compound(&self, compound: &str) -> bool {
        let Self::Element { tag, .. } = self else {
            return false;
        };
        let mut rest = compound;

        let tag_len = rest
            .find(|c: char| matches!(c, '.' | '#' | '['))
            .unwrap_or(rest.len());
        let (tag_part, tail) = rest.split_at(tag_len);
        if !tag_part.is_empty() && tag_part != "*" && !tag_part.eq_ignore_ascii_case(tag) {
            return false;
        }
        rest = tail;

        while let Some(first) = rest.chars().next() {
            match first {
                '.' | '#' => {
                    let body = &rest[1..];
                    let end = body
                        .find(|c: char| matches!(c, '.' | '#' | '['))
                        .unwrap_or(body.len());
                    let name = &body[..end];
                    let ok = if first == '.' {
                        self.get_attribute("class")
                            .is_some_and(|classes| classes.split_whitespace().any(|c| c == name))
                    } else {
                        self.get_attribute("id") == Some(name)
                    };
                    if !ok {
                        return false;
                    }
                    rest = &body[end..];
                }
                '[' => {
                    let Some(close) = rest.find(']') else {
                        return false;
                    };
                    let body = &rest[1..close];
                    let ok = match body.split_once('=') {
                        Some((name, value)) => {
                            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                            self.get_attribute(name.trim()) == Some(value)
                        }
                        None => self.get_attribute(body.trim()).is_some(),
                    };
                    if !ok {
                        return false;
                    }
                    rest = &rest[close + 1..];
                }
                _ => return false,
            }
        }
        true
    }

    /// Serializes the node back to markup.
    ///
    /// Text and attribute values are escaped; `inner` is already markup.
    #[must_use]
    pub fn to_markup(&self) -> String {
        match self {
            Self::Element {
                tag,
                attributes,
                inner,
            } => {
                let mut markup = format!("<{tag}");
                for (name, value) in attributes {
                    let _ = write!(markup, " {name}=\"{}\"", html_escape::encode_double_quoted_attribute(value));
                }
                let _ = write!(markup, ">{inner}</{tag}>");
                markup
            }
            Self::Text(text) => html_escape::encode_text(text).into_owned(),
        }
    }
}

type EventListener = Rc<dyn Fn(&ElementEvent)>;

/// An in-memory host element.
///
/// Cloning shares the node. Tests flip [`set_connected`](Self::set_connected)
/// and then invoke the matching lifecycle callback, just as a browser would.
#[derive(Clone)]
pub struct MemoryHost(Rc<MemoryHostInner>);

struct MemoryHostInner {
    tag: String,
    attributes: RefCell<BTreeMap<String, String>>,
    connected: Cell<bool>,
    children: RefCell<Vec<ContentNode>>,
    content: RefCell<String>,
    renders: Cell<usize>,
    clears: Cell<usize>,
    events: RefCell<Vec<ElementEvent>>,
    listeners: RefCell<Vec<(String, EventListener)>>,
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost")
            .field("tag", &self.0.tag)
            .field("connected", &self.0.connected.get())
            .field("content", &self.0.content.borrow())
            .field("renders", &self.0.renders.get())
            .finish_non_exhaustive()
    }
}

impl MemoryHost {
    /// Creates a disconnected host with no attributes.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(Rc::new(MemoryHostInner {
            tag: tag.into(),
            attributes: RefCell::new(BTreeMap::new()),
            connected: Cell::new(false),
            children: RefCell::new(Vec::new()),
            content: RefCell::new(String::new()),
            renders: Cell::new(0),
            clears: Cell::new(0),
            events: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
        }))
    }

    /// Sets an attribute.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.0
            .attributes
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    /// Removes an attribute.
    pub fn remove_attribute(&self, name: &str) {
        self.0.attributes.borrow_mut().remove(name);
    }

    /// Marks the node as inside or outside a document.
    pub fn set_connected(&self, connected: bool) {
        self.0.connected.set(connected);
    }

    /// Appends a light-DOM child.
    pub fn append_child(&self, node: ContentNode) {
        self.0.children.borrow_mut().push(node);
    }

    /// Children not yet taken for projection.
    #[must_use]
    pub fn children(&self) -> Vec<ContentNode> {
        self.0.children.borrow().clone()
    }

    /// Currently rendered markup.
    #[must_use]
    pub fn content(&self) -> String {
        self.0.content.borrow().clone()
    }

    /// Number of render passes so far.
    #[must_use]
    pub fn render_count(&self) -> usize {
        self.0.renders.get()
    }

    /// Number of times the content was cleared.
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.0.clears.get()
    }

    /// Events dispatched so far.
    #[must_use]
    pub fn events(&self) -> Vec<ElementEvent> {
        self.0.events.borrow().clone()
    }

    /// Listens for events of type `name`.
    pub fn add_event_listener(&self, name: impl Into<String>, listener: impl Fn(&ElementEvent) + 'static) {
        self.0
            .listeners
            .borrow_mut()
            .push((name.into(), Rc::new(listener)));
    }

    /// Returns `true` if both handles refer to the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl HostElement for MemoryHost {
    fn tag_name(&self) -> String {
        self.0.tag.clone()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.borrow().get(name).cloned()
    }

    fn is_connected(&self) -> bool {
        self.0.connected.get()
    }

    fn project_content(&self, selectors: &[String]) -> Vec<Vec<ContentNode>> {
        let children = std::mem::take(&mut *self.0.children.borrow_mut());
        project_nodes(children, selectors, ContentNode::is_element, ContentNode::matches)
    }

    fn render(&self, markup: &str) {
        markup.clone_into(&mut self.0.content.borrow_mut());
        self.0.renders.set(self.0.renders.get() + 1);
    }

    fn clear_content(&self) {
        self.0.content.borrow_mut().clear();
        self.0.clears.set(self.0.clears.get() + 1);
    }

    fn dispatch_event(&self, event: ElementEvent) {
        let listeners: Vec<EventListener> = self
            .0
            .listeners
            .borrow()
            .iter()
            .filter(|(name, _)| *name == event.name)
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
        self.0.events.borrow_mut().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selectors(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn matches_simple_selectors() {
        let node = ContentNode::element("header")
            .attr("class", "title main")
            .attr("id", "top")
            .attr("slot", "start");

        assert!(node.matches("header"));
        assert!(node.matches("*"));
        assert!(node.matches(".main"));
        assert!(node.matches("header.title#top"));
        assert!(node.matches("[slot=start]"));
        assert!(node.matches("[slot='start']"));
        assert!(node.matches("footer, [slot]"));
        assert!(!node.matches("footer"));
        assert!(!node.matches(".missing"));
        assert!(!ContentNode::text("hello").matches("*"));
    }

    #[test]
    fn projects_into_first_match_and_wildcard() {
        let nodes = vec![
            ContentNode::element("header"),
            ContentNode::text("loose"),
            ContentNode::element("p").attr("class", "body"),
            ContentNode::element("footer"),
        ];
        let buckets = project_nodes(
            nodes,
            &selectors(&["header", "*", ".body"]),
            ContentNode::is_element,
            ContentNode::matches,
        );

        assert_eq!(buckets[0], vec![ContentNode::element("header")]);
        assert_eq!(
            buckets[1],
            vec![ContentNode::text("loose"), ContentNode::element("footer")]
        );
        assert_eq!(
            buckets[2],
            vec![ContentNode::element("p").attr("class", "body")]
        );
    }

    #[test]
    fn unmatched_nodes_are_dropped_without_wildcard() {
        let buckets = project_nodes(
            vec![ContentNode::text("x"), ContentNode::element("div")],
            &selectors(&["span"]),
            ContentNode::is_element,
            ContentNode::matches,
        );
        assert_eq!(buckets, vec![Vec::<ContentNode>::new()]);
    }

    #[test]
    fn memory_host_records_renders_and_events() {
        let host = MemoryHost::new("test-element");
        let heard = Rc::new(Cell::new(0));
        {
            let heard = Rc::clone(&heard);
            host.add_event_listener("changed", move |_| heard.set(heard.get() + 1));
        }

        host.render("<p>1</p>");
        host.dispatch_event(ElementEvent::new("changed", json!(1)));
        host.dispatch_event(ElementEvent::new("other", json!(2)));
        host.clear_content();

        assert_eq!(host.render_count(), 1);
        assert_eq!(host.clear_count(), 1);
        assert!(host.content().is_empty());
        assert_eq!(heard.get(), 1);
        assert_eq!(host.events().len(), 2);
    }

    #[test]
    fn events_serialize_with_type_field() {
        let event = ElementEvent::new("open-some-page", json!(123));
        assert_eq!(
            serde_json::to_value(&event).expect("serializable"),
            json!({ "type": "open-some-page", "detail": 123 })
        );
    }

    #[test]
    fn serializes_nodes_back_to_markup() {
        let node = ContentNode::element("b").attr("class", "x").inner("hi");
        assert_eq!(node.to_markup(), "<b class=\"x\">hi</b>");
    }

    #[test]
    fn projected_text_and_attributes_are_escaped() {
        let text = ContentNode::text("a < b & <img src=x onerror=alert(1)>").to_markup();
        assert!(!text.contains("<img"));
        assert_eq!(text, "a &lt; b &amp; &lt;img src=x onerror=alert(1)&gt;");

        let quoted = ContentNode::element("span")
            .attr("title", "say \"hi\" <now>")
            .to_markup();
        assert!(quoted.starts_with("<span title=\"say &quot;hi&quot; "));
        assert!(!quoted.contains("<now>"));
        assert!(quoted.ends_with("\"></span>"));
    }
}
