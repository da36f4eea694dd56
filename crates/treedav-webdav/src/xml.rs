//! PROPFIND request parsing and multistatus rendering.

use crate::error::{DavError, DavResult};
use hyper::StatusCode;
use treedav_core::PropertySet;
use xmltree::{Element, EmitterConfig, Namespace, XMLNode};

pub(crate) const DAV_NS: &str = "DAV:";
const DAV_PREFIX: &str = "D";

/// Which properties a PROPFIND asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PropSelection {
    /// `<allprop/>`, `<propname/>` or no body at all.
    All,
    /// Names listed under `<prop>`, in request order.
    Named(Vec<String>),
}

impl PropSelection {
    pub fn select(&self, props: &treedav_core::ResourceProps) -> PropertySet {
        match self {
            PropSelection::All => props.propfind::<&str>(&[]),
            PropSelection::Named(names) if names.is_empty() => PropertySet::default(),
            PropSelection::Named(names) => props.propfind(names),
        }
    }
}

/// Parse a PROPFIND request body.
pub(crate) fn parse_propfind(body: &[u8]) -> DavResult<PropSelection> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PropSelection::All);
    }

    let root = Element::parse(body)?;
    if root.name != "propfind" || root.namespace.as_deref() != Some(DAV_NS) {
        return Err(DavError::BadRequest(format!(
            "expected DAV:propfind, got {}",
            root.name
        )));
    }

    match root.get_child(("prop", DAV_NS)) {
        Some(prop) => Ok(PropSelection::Named(
            prop.children
                .iter()
                .filter_map(XMLNode::as_element)
                .filter(|e| e.namespace.as_deref() == Some(DAV_NS))
                .map(|e| e.name.clone())
                .collect(),
        )),
        // allprop, propname, or an empty propfind
        None => Ok(PropSelection::All),
    }
}

/// One `<D:response>` block.
#[derive(Debug)]
pub(crate) struct PropResponse {
    pub href: String,
    pub status: StatusCode,
    pub props: PropertySet,
    pub is_collection: bool,
}

impl PropResponse {
    /// A 404 block for a target that does not exist.
    pub fn missing(href: String) -> Self {
        Self {
            href,
            status: StatusCode::NOT_FOUND,
            props: PropertySet::default(),
            is_collection: false,
        }
    }
}

fn dav_element(name: &str) -> Element {
    let mut element = Element::new(name);
    element.prefix = Some(DAV_PREFIX.to_string());
    element.namespace = Some(DAV_NS.to_string());
    element
}

fn text_element(name: &str, text: &str) -> Element {
    let mut element = dav_element(name);
    if !text.is_empty() {
        element.children.push(XMLNode::Text(text.to_string()));
    }
    element
}

fn status_line(status: StatusCode) -> String {
    format!(
        "HTTP/1.1 {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    )
}

fn response_element(response: &PropResponse) -> Element {
    let mut prop = dav_element("prop");
    if response.status == StatusCode::OK {
        for (name, value) in response.props.iter() {
            prop.children.push(XMLNode::Element(text_element(name, value)));
        }
        let mut resourcetype = dav_element("resourcetype");
        if response.is_collection {
            resourcetype
                .children
                .push(XMLNode::Element(dav_element("collection")));
        }
        prop.children.push(XMLNode::Element(resourcetype));
    }

    let mut propstat = dav_element("propstat");
    propstat.children.push(XMLNode::Element(prop));
    propstat.children.push(XMLNode::Element(text_element(
        "status",
        &status_line(response.status),
    )));

    let mut element = dav_element("response");
    element
        .children
        .push(XMLNode::Element(text_element("href", &response.href)));
    element.children.push(XMLNode::Element(propstat));
    element
}

/// Render a `<D:multistatus>` document.
pub(crate) fn multistatus(responses: &[PropResponse]) -> DavResult<Vec<u8>> {
    let mut root = dav_element("multistatus");
    let mut namespaces = Namespace::empty();
    namespaces.put(DAV_PREFIX, DAV_NS);
    root.namespaces = Some(namespaces);
    root.children = responses
        .iter()
        .map(|r| XMLNode::Element(response_element(r)))
        .collect();

    let mut out = Vec::new();
    root.write_with_config(
        &mut out,
        EmitterConfig::new()
            .perform_indent(false)
            .write_document_declaration(true),
    )?;
    Ok(out)
}
