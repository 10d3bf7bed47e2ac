//! In-memory Graphviz DOT description.
//!
//! Graphs are assembled from typed nodes, clusters and edges and only turned
//! into DOT text by [`DotGraph::to_dot`], so structure can be inspected and
//! tested without parsing strings.

use std::fmt::{self, Write};

/// Value of a DOT attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Bare identifier such as `filled` or `coral1`; quoted if it is not a valid DOT ID
    Id(String),
    /// Double-quoted string
    Quoted(String),
    /// HTML-like label, emitted between `<` and `>`
    Html(String),
}

impl AttrValue {
    pub fn id(value: impl Into<String>) -> Self {
        Self::Id(value.into())
    }

    pub fn quoted(value: impl Into<String>) -> Self {
        Self::Quoted(value.into())
    }

    pub fn html(value: impl Into<String>) -> Self {
        Self::Html(value.into())
    }

    /// The raw value, without quoting.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Id(v) | Self::Quoted(v) | Self::Html(v) => v,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(v) if is_plain_id(v) => f.write_str(v),
            Self::Id(v) | Self::Quoted(v) => write!(f, "\"{}\"", escape_quoted(v)),
            Self::Html(v) => write!(f, "<{}>", v),
        }
    }
}

/// Ordered attribute list; setting an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, AttrValue)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `[a=b,c="d"]`, or nothing when empty.
    fn write_list(&self, out: &mut String) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        out.push_str(" [");
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write!(out, "{}={}", key, value)?;
        }
        out.push(']');
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotNode {
    pub id: String,
    pub attrs: Attributes,
}

impl DotNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attrs: Attributes::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.set(key, value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotEdge {
    pub from: String,
    pub to: String,
    pub attrs: Attributes,
}

impl DotEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            attrs: Attributes::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.set(key, value);
        self
    }
}

/// A subgraph; ids starting with `cluster` are drawn as boxes by Graphviz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgraph {
    pub id: String,
    pub attrs: Attributes,
    pub node_defaults: Attributes,
    pub nodes: Vec<DotNode>,
}

impl Subgraph {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attrs: Attributes::new(),
            node_defaults: Attributes::new(),
            nodes: Vec::new(),
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.set(key, value);
        self
    }

    pub fn node_default(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.node_defaults.set(key, value);
        self
    }

    pub fn add_node(&mut self, node: DotNode) {
        self.nodes.push(node);
    }
}

/// A directed graph description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotGraph {
    pub name: String,
    pub attrs: Attributes,
    pub subgraphs: Vec<Subgraph>,
    pub nodes: Vec<DotNode>,
    pub edges: Vec<DotEdge>,
}

impl DotGraph {
    pub fn digraph(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attributes::new(),
            subgraphs: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_subgraph(&mut self, subgraph: Subgraph) {
        self.subgraphs.push(subgraph);
    }

    pub fn add_node(&mut self, node: DotNode) {
        self.nodes.push(node);
    }

    pub fn add_edge(&mut self, edge: DotEdge) {
        self.edges.push(edge);
    }

    /// Every node, top-level and inside subgraphs.
    pub fn all_nodes(&self) -> impl Iterator<Item = &DotNode> {
        self.subgraphs
            .iter()
            .flat_map(|s| s.nodes.iter())
            .chain(self.nodes.iter())
    }

    pub fn node(&self, id: &str) -> Option<&DotNode> {
        self.all_nodes().find(|n| n.id == id)
    }

    pub fn node_count(&self) -> usize {
        self.all_nodes().count()
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges.iter().any(|e| e.from == from && e.to == to)
    }

    /// Serialize to DOT text.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write_dot(&mut out);
        out
    }

    fn write_dot(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "digraph {} {{", AttrValue::id(self.name.as_str()))?;

        for (key, value) in self.attrs.iter() {
            writeln!(out, "  {}={};", key, value)?;
        }

        for subgraph in &self.subgraphs {
            writeln!(out, "  subgraph {} {{", AttrValue::id(subgraph.id.as_str()))?;
            for (key, value) in subgraph.attrs.iter() {
                writeln!(out, "    {}={};", key, value)?;
            }
            if !subgraph.node_defaults.is_empty() {
                out.push_str("    node");
                subgraph.node_defaults.write_list(out)?;
                out.push_str(";\n");
            }
            for node in &subgraph.nodes {
                write_node(out, "    ", node)?;
            }
            out.push_str("  }\n");
        }

        for node in &self.nodes {
            write_node(out, "  ", node)?;
        }

        for edge in &self.edges {
            write!(
                out,
                "  {} -> {}",
                AttrValue::quoted(edge.from.as_str()),
                AttrValue::quoted(edge.to.as_str())
            )?;
            edge.attrs.write_list(out)?;
            out.push_str(";\n");
        }

        out.push_str("}\n");
        Ok(())
    }
}

impl fmt::Display for DotGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dot())
    }
}

fn write_node(out: &mut String, indent: &str, node: &DotNode) -> fmt::Result {
    write!(out, "{}{}", indent, AttrValue::quoted(node.id.as_str()))?;
    node.attrs.write_list(out)?;
    out.push_str(";\n");
    Ok(())
}

/// DOT ID: `[A-Za-z_][A-Za-z0-9_]*`, not a keyword.
fn is_plain_id(s: &str) -> bool {
    const KEYWORDS: &[&str] = &["node", "edge", "graph", "digraph", "subgraph", "strict"];
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !KEYWORDS.contains(&s.to_ascii_lowercase().as_str())
}

fn escape_quoted(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escape text placed inside an HTML-like label.
pub fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
