//! Owned model of the host page's visual tree.
//!
//! The host owns the tree and mutates it freely; this crate only reads it,
//! except for attaching and repainting its two overlay layers. Node handles
//! carry a generation so a handle to a removed node never resolves to a
//! node that later reuses the slot.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OverlayError;
use crate::selector::Selector;

/// Host tree shared between the host driver and the overlay runtime on one thread.
pub type SharedDocument = Rc<RefCell<Document>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    globals: Map<String, Value>,
    generation: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document whose root is a bare `body` element.
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            globals: Map::new(),
            generation: 0,
        };
        doc.root = doc.alloc(NodeData::Element(Element {
            tag: "body".into(),
            ..Element::default()
        }));
        doc
    }

    pub fn from_snapshot(snapshot: DocumentSnapshot) -> Self {
        let mut doc = Self::new();
        doc.globals = snapshot.globals;
        doc.replace_body(&snapshot.body);
        doc
    }

    pub fn into_shared(self) -> SharedDocument {
        Rc::new(RefCell::new(self))
    }

    /// Replace the whole tree below (and including the data of) the root.
    pub fn replace_body(&mut self, body: &ElementSpec) {
        let root = self.root;
        self.remove_children(root);
        if let Some(node) = self.node_mut(root) {
            node.data = NodeData::Element(body.to_element());
        }
        for child in &body.children {
            let id = self.build(child);
            self.attach(root, id, None);
        }
        self.generation += 1;
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Bumped on every structural (child list) change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn globals(&self) -> &Map<String, Value> {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.globals
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.node(id).map(|n| &n.data)
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id) {
            Some(NodeData::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match self.node_mut(id).map(|n| &mut n.data) {
            Some(NodeData::Element(e)) => Some(e),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id)
            .is_some_and(|e| e.classes.iter().any(|c| c == class))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)
            .and_then(|e| e.attrs.get(name))
            .map(String::as_str)
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(e) = self.element_mut(id) {
            e.attrs.insert(name.to_string(), value.into());
        }
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        if let Some(e) = self.element_mut(id) {
            if !e.classes.iter().any(|c| c == class) {
                e.classes.push(class.to_string());
            }
        }
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element(Element {
            tag: tag.to_string(),
            ..Element::default()
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    /// Create a detached element tree from `spec`.
    pub fn create_subtree(&mut self, spec: &ElementSpec) -> NodeId {
        let id = self.alloc(NodeData::Element(spec.to_element()));
        for child in &spec.children {
            let child_id = self.build(child);
            self.attach(id, child_id, None);
        }
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), OverlayError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` under `parent` before `reference`, or last when
    /// `reference` is `None` or not a child of `parent`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), OverlayError> {
        if self.element(parent).is_none() {
            return Err(OverlayError::StaleNode(parent));
        }
        if !self.contains(child) {
            return Err(OverlayError::StaleNode(child));
        }
        self.detach(child);
        self.attach(parent, child, reference);
        self.generation += 1;
        Ok(())
    }

    /// Detach `id` from its parent and drop its whole subtree.
    pub fn remove(&mut self, id: NodeId) {
        if !self.contains(id) || id == self.root {
            return;
        }
        self.detach(id);
        self.free_subtree(id);
        self.generation += 1;
    }

    pub fn remove_children(&mut self, id: NodeId) {
        let children = match self.node_mut(id) {
            Some(node) if !node.children.is_empty() => std::mem::take(&mut node.children),
            _ => return,
        };
        for child in children {
            self.free_subtree(child);
        }
        self.generation += 1;
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, None, &mut out);
        out
    }

    /// Like [`text_content`](Self::text_content) but skipping descendant
    /// subtrees rooted at elements with tag `excluded`.
    pub fn text_content_excluding(&self, id: NodeId, excluded: &str) -> String {
        let mut out = String::new();
        self.collect_text(id, Some(excluded), &mut out);
        out
    }

    /// Descendants of `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|&id| selector.matches(self, id))
    }

    pub fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|&id| selector.matches(self, id))
            .collect()
    }

    /// Serialise a subtree as markup (used for logging rendered layers).
    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    // ---- internals ----

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let node = Node {
            data,
            parent: None,
            children: Vec::new(),
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|&c| c != id);
        }
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.node_mut(parent) {
            let position = reference
                .and_then(|r| p.children.iter().position(|&c| c == r))
                .unwrap_or(p.children.len());
            p.children.insert(position, child);
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let index = next.index as usize;
            let Some(slot) = self.slots.get_mut(index) else {
                continue;
            };
            if slot.generation != next.generation {
                continue;
            }
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(next.index);
            }
        }
    }

    fn build(&mut self, spec: &NodeSpec) -> NodeId {
        match spec {
            NodeSpec::Text(text) => self.create_text(text),
            NodeSpec::Element(element) => self.create_subtree(element),
        }
    }

    fn collect_text(&self, id: NodeId, excluded: Option<&str>, out: &mut String) {
        for &child in self.children(id) {
            match self.data(child) {
                Some(NodeData::Text(text)) => out.push_str(text),
                Some(NodeData::Element(e)) if excluded.is_some_and(|t| e.tag.eq_ignore_ascii_case(t)) => {}
                Some(NodeData::Element(_)) => self.collect_text(child, excluded, out),
                None => {}
            }
        }
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.data(id) {
            Some(NodeData::Text(text)) => out.push_str(&escape(text)),
            Some(NodeData::Element(e)) => {
                out.push('<');
                out.push_str(&e.tag);
                if let Some(element_id) = &e.id {
                    let _ = write!(out, " id=\"{}\"", escape(element_id));
                }
                if !e.classes.is_empty() {
                    let _ = write!(out, " class=\"{}\"", escape(&e.classes.join(" ")));
                }
                for (name, value) in &e.attrs {
                    let _ = write!(out, " {}=\"{}\"", name, escape(value));
                }
                out.push('>');
                for &child in self.children(id) {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{}>", e.tag);
            }
            None => {}
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ---- Snapshot form ----

/// Serialisable picture of a host page: its global scope and its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub globals: Map<String, Value>,
    pub body: ElementSpec,
}

impl DocumentSnapshot {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, OverlayError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
    Text(String),
    Element(ElementSpec),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSpec>,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Add one or more whitespace-separated classes.
    pub fn class(mut self, classes: &str) -> Self {
        self.classes
            .extend(classes.split_whitespace().map(str::to_string));
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(NodeSpec::Element(child));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.children.push(NodeSpec::Text(text.to_string()));
        self
    }

    fn to_element(&self) -> Element {
        Element {
            tag: self.tag.clone(),
            id: self.id.clone(),
            classes: self.classes.clone(),
            attrs: self.attrs.clone(),
        }
    }
}
