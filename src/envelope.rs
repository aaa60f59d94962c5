//! Request envelope construction and serialization.
//!
//! Requests are built as a small owned element tree and written with
//! quick-xml. Namespace aliases are declared as `xmlns:prefix` attributes on
//! the element that owns them.

use crate::error::{Result, SoapError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

/// A child of a request element, borrowed in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node<'a> {
    Element(&'a Element),
    Text(&'a str),
}

/// Position of a child in document order. The n-th `Slot::Element` is
/// `elements[n]`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Element,
    Text(String),
}

/// A request element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    aliases: Vec<(String, String)>,
    attributes: Vec<(String, String)>,
    elements: Vec<Element>,
    content: Vec<Slot>,
}

impl Element {
    /// Create an element with a qualified name (`prefix:local` or `local`).
    ///
    /// Names are checked when the tree is serialized.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            attributes: Vec::new(),
            elements: Vec::new(),
            content: Vec::new(),
        }
    }

    /// Qualified name as written.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.rsplit_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Declare `xmlns:prefix="uri"` on this element, replacing an earlier
    /// declaration of the same prefix.
    pub fn alias(&mut self, prefix: impl Into<String>, uri: impl Into<String>) -> &mut Self {
        upsert(&mut self.aliases, prefix.into(), uri.into());
        self
    }

    /// Namespace aliases declared on this element, in declaration order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        upsert(&mut self.attributes, name.into(), value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Append a child element and return it.
    ///
    /// A `*:` prefix is replaced by this element's own prefix, so
    /// `env:Envelope` + `*:Body` yields `env:Body`.
    pub fn add(&mut self, name: &str) -> &mut Element {
        let name = match name.strip_prefix("*:") {
            Some(local) => match self.prefix() {
                Some(prefix) => format!("{}:{}", prefix, local),
                None => local.to_string(),
            },
            None => name.to_string(),
        };
        let index = self.elements.len();
        self.elements.push(Element::new(name));
        self.content.push(Slot::Element);
        &mut self.elements[index]
    }

    /// Append a child element and populate it with `fill`.
    pub fn add_with(&mut self, name: &str, fill: impl FnOnce(&mut Element)) -> &mut Self {
        fill(self.add(name));
        self
    }

    /// Append a child element holding only `text`.
    pub fn add_value(&mut self, name: &str, text: impl Into<String>) -> &mut Self {
        self.add(name).set_value(text);
        self
    }

    /// Replace all children with a single text node.
    pub fn set_value(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.clear();
        self.content.clear();
        self.content.push(Slot::Text(text.into()));
        self
    }

    pub fn add_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.content.push(Slot::Text(text.into()));
        self
    }

    /// Children in document order.
    pub fn children(&self) -> impl Iterator<Item = Node<'_>> {
        let mut elements = self.elements.iter();
        self.content.iter().filter_map(move |slot| match slot {
            Slot::Element => elements.next().map(Node::Element),
            Slot::Text(t) => Some(Node::Text(t.as_str())),
        })
    }

    pub fn has_children(&self) -> bool {
        !self.content.is_empty()
    }

    /// Child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.elements.iter_mut()
    }

    /// First direct child whose local name matches the local part of `name`.
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        let wanted = local_part(name);
        self.elements.iter_mut().find(|e| e.local_name() == wanted)
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|slot| match slot {
                Slot::Text(t) => Some(t.as_str()),
                Slot::Element => None,
            })
            .collect()
    }

    /// First element (this one included) whose local name matches the local
    /// part of `name`, in document order.
    pub fn find(&self, name: &str) -> Option<&Element> {
        let wanted = local_part(name);
        let mut stack = vec![self];
        while let Some(element) = stack.pop() {
            if element.local_name() == wanted {
                return Some(element);
            }
            stack.extend(element.elements.iter().rev());
        }
        None
    }

    /// Mutable variant of [`Element::find`].
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        let path = self.path_to(local_part(name))?;
        let mut current = self;
        for index in path {
            current = current.elements.get_mut(index)?;
        }
        Some(current)
    }

    /// Child element indices leading to the first element with `local` as
    /// local name.
    fn path_to(&self, local: &str) -> Option<Vec<usize>> {
        let mut stack: Vec<(&Element, Vec<usize>)> = vec![(self, Vec::new())];
        while let Some((element, path)) = stack.pop() {
            if element.local_name() == local {
                return Some(path);
            }
            for (index, child) in element.elements.iter().enumerate().rev() {
                let mut child_path = path.clone();
                child_path.push(index);
                stack.push((child, child_path));
            }
        }
        None
    }

    /// Serialize this element (no XML declaration).
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        write_element(&mut writer, self)?;
        into_string(writer)
    }

    fn start_tag(&self) -> Result<BytesStart<'_>> {
        check_qname(&self.name)?;
        let mut start = BytesStart::new(self.name.as_str());
        for (prefix, uri) in &self.aliases {
            check_ncname(prefix)?;
            check_chars(uri)?;
            let key = format!("xmlns:{}", prefix);
            start.push_attribute((key.as_str(), uri.as_str()));
        }
        for (name, value) in &self.attributes {
            check_qname(name)?;
            check_chars(value)?;
            start.push_attribute((name.as_str(), value.as_str()));
        }
        Ok(start)
    }
}

/// A SOAP request envelope: `env:Envelope` with `Header` and `Body`.
///
/// Header and Body always exist; extra root children (rare) follow Body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    root: Element,
    header: Element,
    body: Element,
}

impl Envelope {
    /// Create an empty envelope with `env` bound to `namespace`.
    pub fn new(namespace: &str) -> Self {
        let mut root = Element::new("env:Envelope");
        root.alias("env", namespace);
        Self {
            header: Element::new("env:Header"),
            body: Element::new("env:Body"),
            root,
        }
    }

    /// Create an envelope and let `fill` populate its Body.
    pub fn build(namespace: &str, fill: impl FnOnce(&mut Element)) -> Self {
        let mut envelope = Self::new(namespace);
        fill(&mut envelope.body);
        envelope
    }

    /// Namespace bound to the `env` prefix.
    pub fn namespace(&self) -> Option<&str> {
        self.root
            .aliases()
            .find(|(prefix, _)| *prefix == "env")
            .map(|(_, uri)| uri)
    }

    /// Declare a namespace alias on the root element.
    pub fn alias(&mut self, prefix: impl Into<String>, uri: impl Into<String>) -> &mut Self {
        self.root.alias(prefix, uri);
        self
    }

    /// The root element (aliases, attributes and any trailing children).
    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn header(&self) -> &Element {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Element {
        &mut self.header
    }

    pub fn body(&self) -> &Element {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Element {
        &mut self.body
    }

    /// First element, in document order, whose local name matches.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.root.local_name() == local_part(name) {
            return Some(&self.root);
        }
        self.header
            .find(name)
            .or_else(|| self.body.find(name))
            .or_else(|| self.root.elements().find_map(|e| e.find(name)))
    }

    /// Mutable variant of [`Envelope::find`].
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        let wanted = local_part(name);
        if self.root.local_name() == wanted {
            return Some(&mut self.root);
        }
        if self.header.path_to(wanted).is_some() {
            return self.header.find_mut(name);
        }
        if self.body.path_to(wanted).is_some() {
            return self.body.find_mut(name);
        }
        self.root.elements_mut().find_map(|e| e.find_mut(name))
    }

    /// Serialize with an XML declaration.
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;
        let root_start = self.root.start_tag()?;
        writer
            .write_event(Event::Start(root_start))
            .map_err(write_error)?;
        write_element(&mut writer, &self.header)?;
        write_element(&mut writer, &self.body)?;
        for node in self.root.children() {
            match node {
                Node::Element(e) => write_element(&mut writer, e)?,
                Node::Text(t) => write_text(&mut writer, t)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.root.name.as_str())))
            .map_err(write_error)?;
        into_string(writer)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_xml().map(String::into_bytes)
    }
}

enum Step<'a> {
    Open(&'a Element),
    Text(&'a str),
    Close(&'a Element),
}

/// Write an element subtree without recursion.
fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut stack = vec![Step::Open(element)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Open(e) if !e.has_children() => {
                writer
                    .write_event(Event::Empty(e.start_tag()?))
                    .map_err(write_error)?;
            }
            Step::Open(e) => {
                writer
                    .write_event(Event::Start(e.start_tag()?))
                    .map_err(write_error)?;
                stack.push(Step::Close(e));
                let children: Vec<Node<'_>> = e.children().collect();
                for node in children.into_iter().rev() {
                    stack.push(match node {
                        Node::Element(child) => Step::Open(child),
                        Node::Text(text) => Step::Text(text),
                    });
                }
            }
            Step::Text(text) => write_text(writer, text)?,
            Step::Close(e) => {
                writer
                    .write_event(Event::End(BytesEnd::new(e.name.as_str())))
                    .map_err(write_error)?;
            }
        }
    }
    Ok(())
}

fn write_text(writer: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
    check_chars(text)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(write_error)?;
    Ok(())
}

fn check_qname(name: &str) -> Result<()> {
    let valid = match name.split_once(':') {
        Some((prefix, local)) => is_ncname(prefix) && is_ncname(local),
        None => is_ncname(name),
    };
    if valid {
        Ok(())
    } else {
        Err(SoapError::Xml(format!("Invalid XML name '{}'", name)))
    }
}

fn check_ncname(name: &str) -> Result<()> {
    if is_ncname(name) {
        Ok(())
    } else {
        Err(SoapError::Xml(format!("Invalid namespace prefix '{}'", name)))
    }
}

fn check_chars(text: &str) -> Result<()> {
    match text.chars().find(|c| !is_xml_char(*c)) {
        Some(c) => Err(SoapError::Xml(format!(
            "Character U+{:04X} is not allowed in XML",
            c as u32
        ))),
        None => Ok(()),
    }
}

/// Name without a colon, per XML 1.0 (fifth edition) name productions.
fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char)
}

fn is_name_start_char(c: char) -> bool {
    matches!(c,
        'A'..='Z'
        | '_'
        | 'a'..='z'
        | '\u{C0}'..='\u{D6}'
        | '\u{D8}'..='\u{F6}'
        | '\u{F8}'..='\u{2FF}'
        | '\u{370}'..='\u{37D}'
        | '\u{37F}'..='\u{1FFF}'
        | '\u{200C}'..='\u{200D}'
        | '\u{2070}'..='\u{218F}'
        | '\u{2C00}'..='\u{2FEF}'
        | '\u{3001}'..='\u{D7FF}'
        | '\u{F900}'..='\u{FDCF}'
        | '\u{FDF0}'..='\u{FFFD}'
        | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String> {
    String::from_utf8(writer.into_inner()).map_err(|e| SoapError::Xml(e.to_string()))
}

fn write_error(e: impl std::fmt::Display) -> SoapError {
    SoapError::Xml(e.to_string())
}

fn upsert(list: &mut Vec<(String, String)>, key: String, value: String) {
    match list.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => list.push((key, value)),
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}
