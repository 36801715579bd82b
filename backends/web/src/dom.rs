use elementum::host::{ContentNode, ElementEvent, HostElement, project_nodes};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CustomEvent, CustomEventInit, Element, HtmlElement, Node, ShadowRoot, ShadowRootInit, ShadowRootMode};

use crate::error::WebError;

/// A custom element instance in the document.
///
/// Rendered markup goes into an open shadow root. A shadow root that already
/// exists on the node (e.g. from declarative shadow DOM) is reused instead of
/// attaching a second one.
#[derive(Debug, Clone)]
pub struct WebHost {
    element: HtmlElement,
}

impl WebHost {
    /// Wraps a DOM node.
    #[must_use]
    pub const fn new(element: HtmlElement) -> Self {
        Self { element }
    }

    /// The wrapped node.
    #[must_use]
    pub const fn element(&self) -> &HtmlElement {
        &self.element
    }

    fn shadow_root(&self) -> Result<ShadowRoot, WebError> {
        if let Some(root) = self.element.shadow_root() {
            return Ok(root);
        }
        Ok(self
            .element
            .attach_shadow(&ShadowRootInit::new(ShadowRootMode::Open))?)
    }

    fn take_children(&self) -> Result<Vec<Node>, WebError> {
        let list = self.element.child_nodes();
        let nodes: Vec<Node> = (0..list.length()).filter_map(|index| list.get(index)).collect();
        for node in &nodes {
            self.element.remove_child(node)?;
        }
        Ok(nodes)
    }
}

impl HostElement for WebHost {
    fn tag_name(&self) -> String {
        self.element.tag_name().to_ascii_lowercase()
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.element.get_attribute(name)
    }

    fn is_connected(&self) -> bool {
        self.element.is_connected()
    }

    fn project_content(&self, selectors: &[String]) -> Vec<Vec<ContentNode>> {
        let nodes = match self.take_children() {
            Ok(nodes) => nodes,
            Err(error) => {
                tracing::warn!(tag = %self.tag_name(), %error, "failed to detach host children");
                return selectors.iter().map(|_| Vec::new()).collect();
            }
        };

        project_nodes(
            nodes,
            selectors,
            |node| node.node_type() == Node::ELEMENT_NODE,
            |node, selector| {
                node.dyn_ref::<Element>()
                    .is_some_and(|element| element.matches(selector).unwrap_or(false))
            },
        )
        .into_iter()
        .map(|bucket| bucket.iter().filter_map(content_node).collect())
        .collect()
    }

    fn render(&self, markup: &str) {
        match self.shadow_root() {
            Ok(root) => root.set_inner_html(markup),
            Err(error) => tracing::warn!(tag = %self.tag_name(), %error, "no shadow root to render into"),
        }
    }

    fn clear_content(&self) {
        if let Some(root) = self.element.shadow_root() {
            root.set_inner_html("");
        }
    }

    fn dispatch_event(&self, event: ElementEvent) {
        if let Err(error) = dispatch(&self.element, &event) {
            tracing::warn!(event = %event.name, %error, "failed to dispatch output event");
        }
    }
}

fn dispatch(target: &HtmlElement, event: &ElementEvent) -> Result<(), WebError> {
    let detail = crate::convert::to_js(&event.detail)?;
    let init = CustomEventInit::new();
    init.set_detail(&detail);
    let custom = CustomEvent::new_with_event_init_dict(&event.name, &init)?;
    target.dispatch_event(&custom)?;
    Ok(())
}

fn content_node(node: &Node) -> Option<ContentNode> {
    if let Some(element) = node.dyn_ref::<Element>() {
        let attributes = element.attributes();
        let mut content = ContentNode::element(element.local_name()).inner(element.inner_html());
        for index in 0..attributes.length() {
            if let Some(attr) = attributes.item(index) {
                content = content.attr(attr.name(), attr.value());
            }
        }
        return Some(content);
    }
    if node.node_type() == Node::TEXT_NODE {
        return node.text_content().map(ContentNode::text);
    }
    None
}

impl From<HtmlElement> for WebHost {
    fn from(element: HtmlElement) -> Self {
        Self::new(element)
    }
}

impl From<WebHost> for JsValue {
    fn from(host: WebHost) -> Self {
        host.element.into()
    }
}
