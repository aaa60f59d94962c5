//! Location-path evaluation over parsed response documents.
//!
//! Supports the subset of XPath 1.0 needed to inspect SOAP responses:
//! absolute and relative paths, `//`, the `child`, `self`, `descendant` and
//! `descendant-or-self` axes, name tests with prefixes bound by the caller,
//! `*`, `text()`, `node()` and a single positional predicate per step.
//! An unprefixed name test only matches elements without a namespace.

use crate::error::{Result, SoapError};
use xmltree::{Element, XMLNode};

/// A node selected by a path: an element or a text node.
#[derive(Debug, Clone, Copy)]
pub enum XmlNode<'a> {
    Element(&'a Element),
    Text(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    SelfAxis,
    Descendant,
    DescendantOrSelf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    /// `local == None` is a wildcard
    Name {
        prefix: Option<String>,
        local: Option<String>,
    },
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    position: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Path {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Clone, Copy)]
enum Ctx<'a> {
    Document(&'a Element),
    Element(&'a Element),
    Text(&'a str),
}

impl<'a> Ctx<'a> {
    fn same(&self, other: &Ctx<'a>) -> bool {
        match (self, other) {
            (Ctx::Document(_), Ctx::Document(_)) => true,
            (Ctx::Element(a), Ctx::Element(b)) => std::ptr::eq(*a, *b),
            (Ctx::Text(a), Ctx::Text(b)) => a.as_ptr() == b.as_ptr() && a.len() == b.len(),
            _ => false,
        }
    }

    fn children(&self) -> Vec<Ctx<'a>> {
        match *self {
            Ctx::Document(root) => vec![Ctx::Element(root)],
            Ctx::Element(e) => e
                .children
                .iter()
                .filter_map(|node| match node {
                    XMLNode::Element(child) => Some(Ctx::Element(child)),
                    XMLNode::Text(t) | XMLNode::CData(t) => Some(Ctx::Text(t.as_str())),
                    _ => None,
                })
                .collect(),
            Ctx::Text(_) => Vec::new(),
        }
    }

    /// Descendants in document order, excluding `self`.
    fn descendants(&self) -> Vec<Ctx<'a>> {
        let mut out = Vec::new();
        let mut stack: Vec<Ctx<'a>> = self.children().into_iter().rev().collect();
        while let Some(ctx) = stack.pop() {
            out.push(ctx);
            stack.extend(ctx.children().into_iter().rev());
        }
        out
    }
}

/// Evaluate `expr` against a document whose root element is `root`, with
/// relative paths starting at `context`.
pub(crate) fn select<'a>(
    root: &'a Element,
    context: &'a Element,
    expr: &str,
    namespaces: &[(&str, &str)],
) -> Result<Vec<XmlNode<'a>>> {
    let path = parse(expr)?;

    let mut current = if path.absolute {
        vec![Ctx::Document(root)]
    } else {
        vec![Ctx::Element(context)]
    };

    for step in &path.steps {
        let namespace = match &step.test {
            NodeTest::Name {
                prefix: Some(prefix),
                ..
            } => Some(
                namespaces
                    .iter()
                    .find(|(p, _)| *p == prefix.as_str())
                    .map(|(_, uri)| *uri)
                    .ok_or_else(|| {
                        SoapError::XPath(format!("Unbound namespace prefix '{}' in '{}'", prefix, expr))
                    })?,
            ),
            _ => None,
        };

        let mut next: Vec<Ctx<'a>> = Vec::new();
        for ctx in &current {
            let candidates = match step.axis {
                Axis::Child => ctx.children(),
                Axis::SelfAxis => vec![*ctx],
                Axis::Descendant => ctx.descendants(),
                Axis::DescendantOrSelf => {
                    let mut all = vec![*ctx];
                    all.extend(ctx.descendants());
                    all
                }
            };
            let matched = candidates
                .into_iter()
                .filter(|candidate| matches(candidate, &step.test, namespace));
            let selected: Vec<Ctx<'a>> = match step.position {
                Some(n) => matched.skip(n - 1).take(1).collect(),
                None => matched.collect(),
            };
            for candidate in selected {
                if !next.iter().any(|seen| seen.same(&candidate)) {
                    next.push(candidate);
                }
            }
        }
        current = next;
    }

    Ok(current
        .into_iter()
        .filter_map(|ctx| match ctx {
            Ctx::Element(e) => Some(XmlNode::Element(e)),
            Ctx::Text(t) => Some(XmlNode::Text(t)),
            Ctx::Document(_) => None,
        })
        .collect())
}

fn matches(ctx: &Ctx<'_>, test: &NodeTest, namespace: Option<&str>) -> bool {
    match (test, ctx) {
        (NodeTest::Node, _) => true,
        (NodeTest::Text, Ctx::Text(_)) => true,
        (NodeTest::Name { prefix, local }, Ctx::Element(e)) => {
            let element_ns = e.namespace.as_deref().filter(|ns| !ns.is_empty());
            let ns_ok = match (prefix, local) {
                (Some(_), _) => element_ns == namespace,
                (None, None) => true,
                (None, Some(_)) => element_ns.is_none(),
            };
            ns_ok && local.as_deref().map_or(true, |l| e.name == l)
        }
        _ => false,
    }
}

fn parse(expr: &str) -> Result<Path> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(SoapError::XPath("Empty expression".to_string()));
    }

    let (absolute, rest) = match expr.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, expr),
    };
    if rest.is_empty() {
        return Ok(Path {
            absolute,
            steps: Vec::new(),
        });
    }

    let segments: Vec<&str> = rest.split('/').collect();
    let mut steps = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            if index + 1 == segments.len() {
                return Err(SoapError::XPath(format!("Trailing '/' in '{}'", expr)));
            }
            steps.push(Step {
                axis: Axis::DescendantOrSelf,
                test: NodeTest::Node,
                position: None,
            });
        } else {
            steps.push(parse_step(segment, expr)?);
        }
    }

    Ok(Path { absolute, steps })
}

fn parse_step(segment: &str, expr: &str) -> Result<Step> {
    let unsupported = || SoapError::XPath(format!("Unsupported step '{}' in '{}'", segment, expr));

    let (body, position) = match segment.split_once('[') {
        Some((body, predicate)) => {
            let n: usize = predicate
                .strip_suffix(']')
                .and_then(|n| n.trim().parse().ok())
                .filter(|n| *n >= 1)
                .ok_or_else(unsupported)?;
            (body, Some(n))
        }
        None => (segment, None),
    };

    if body == "." {
        return Ok(Step {
            axis: Axis::SelfAxis,
            test: NodeTest::Node,
            position,
        });
    }

    let (axis, test) = match body.split_once("::") {
        Some(("child", test)) => (Axis::Child, test),
        Some(("self", test)) => (Axis::SelfAxis, test),
        Some(("descendant", test)) => (Axis::Descendant, test),
        Some(("descendant-or-self", test)) => (Axis::DescendantOrSelf, test),
        Some(_) => return Err(unsupported()),
        None => (Axis::Child, body),
    };

    let test = match test {
        "text()" => NodeTest::Text,
        "node()" => NodeTest::Node,
        "*" => NodeTest::Name {
            prefix: None,
            local: None,
        },
        name if is_qname(name) => match name.split_once(':') {
            Some((prefix, "*")) => NodeTest::Name {
                prefix: Some(prefix.to_string()),
                local: None,
            },
            Some((prefix, local)) => NodeTest::Name {
                prefix: Some(prefix.to_string()),
                local: Some(local.to_string()),
            },
            None => NodeTest::Name {
                prefix: None,
                local: Some(name.to_string()),
            },
        },
        _ => return Err(unsupported()),
    };

    Ok(Step {
        axis,
        test,
        position,
    })
}

fn is_qname(name: &str) -> bool {
    let valid_part = |part: &str| {
        part.starts_with(|c: char| c.is_alphabetic() || c == '_')
            && part
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
    };
    match name.split_once(':') {
        Some((prefix, "*")) => valid_part(prefix),
        Some((prefix, local)) => valid_part(prefix) && valid_part(local),
        None => valid_part(name),
    }
}
