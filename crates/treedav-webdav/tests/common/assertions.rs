//! Custom assertions for WebDAV integration tests.

use crate::common::TestServer;
use percent_encoding::percent_decode_str;
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use xmltree::{Element, XMLNode};

const DAV_NS: &str = "DAV:";

/// One `<D:response>` block of a multistatus body.
#[derive(Debug, Clone)]
pub struct PropEntry {
    /// Raw href as sent by the server.
    pub href: String,
    /// Status line of the propstat.
    pub status: String,
    /// Property name to text value, in document order.
    pub props: Vec<(String, String)>,
    /// Whether `<D:resourcetype>` contains `<D:collection/>`.
    pub is_collection: bool,
}

impl PropEntry {
    /// Value of a property, if reported.
    pub fn prop(&self, name: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Last href segment, percent-decoded.
    pub fn name(&self) -> String {
        let last = self.href.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        percent_decode_str(last).decode_utf8_lossy().into_owned()
    }
}

/// Parse a multistatus body into its response blocks.
pub fn parse_multistatus(xml: &str) -> Vec<PropEntry> {
    let doc = Element::parse(xml.as_bytes()).expect("multistatus is not well-formed XML");
    assert_eq!(doc.name, "multistatus", "unexpected root element: {xml}");

    doc.children
        .iter()
        .filter_map(XMLNode::as_element)
        .map(|response| {
            let href = response
                .get_child(("href", DAV_NS))
                .and_then(|h| h.get_text())
                .expect("response without href")
                .into_owned();
            let propstat = response
                .get_child(("propstat", DAV_NS))
                .expect("response without propstat");
            let status = propstat
                .get_child(("status", DAV_NS))
                .and_then(|s| s.get_text())
                .expect("propstat without status")
                .into_owned();

            let mut props = Vec::new();
            let mut is_collection = false;
            if let Some(prop) = propstat.get_child(("prop", DAV_NS)) {
                for element in prop.children.iter().filter_map(XMLNode::as_element) {
                    if element.name == "resourcetype" {
                        is_collection = element.get_child(("collection", DAV_NS)).is_some();
                    }
                    let value = element.get_text().map(|t| t.into_owned()).unwrap_or_default();
                    props.push((element.name.clone(), value));
                }
            }

            PropEntry {
                href,
                status,
                props,
                is_collection,
            }
        })
        .collect()
}

/// Assert that a file exists and has the expected content.
pub async fn assert_file_content(server: &TestServer, path: &str, expected: &[u8]) {
    let result = server.get_bytes(path).await;
    match result {
        Ok(actual) => {
            assert_eq!(
                actual.as_ref(),
                expected,
                "File content mismatch at {}: expected {} bytes, got {} bytes",
                path,
                expected.len(),
                actual.len()
            );
        }
        Err((status, body)) => {
            panic!("Failed to read file {path}: status={status}, body={body}");
        }
    }
}

/// Assert that a file exists and its SHA-256 hash matches.
///
/// More readable than comparing full content for large files.
pub async fn assert_file_hash(server: &TestServer, path: &str, expected_hash: &[u8; 32]) {
    let result = server.get_bytes(path).await;
    match result {
        Ok(actual) => {
            let actual_hash = sha256(&actual);
            assert_eq!(
                &actual_hash, expected_hash,
                "File hash mismatch at {path}: expected {expected_hash:x?}, got {actual_hash:x?}"
            );
        }
        Err((status, body)) => {
            panic!("Failed to read file {path}: status={status}, body={body}");
        }
    }
}

/// Assert that a path returns 404 Not Found.
pub async fn assert_not_found(server: &TestServer, path: &str) {
    let resp = server.get(path).await;
    assert_eq!(
        resp.status(),
        StatusCode::NOT_FOUND,
        "Expected 404 for {}, got {}",
        path,
        resp.status()
    );
}

/// Assert that a response has a specific status code.
pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(
        actual, expected,
        "{context}: expected status {expected}, got {actual}"
    );
}

/// Assert that a collection lists exactly `expected`, in listing order.
///
/// Uses a Depth 1 PROPFIND and drops the collection's own entry.
pub async fn assert_dir_entries(server: &TestServer, path: &str, expected: &[&str]) {
    let (status, body) = server.propfind_body(path, "1").await;
    assert_eq!(
        status,
        StatusCode::MULTI_STATUS,
        "PROPFIND {path} failed: {body}"
    );

    let entries = parse_multistatus(&body);
    assert!(!entries.is_empty(), "PROPFIND {path} returned no entries");
    let actual: Vec<String> = entries[1..].iter().map(PropEntry::name).collect();
    assert_eq!(actual, expected, "Directory {path} entries mismatch");
}

/// Assert that a collection exists (Depth 0 PROPFIND reports it as one).
pub async fn assert_dir_exists(server: &TestServer, path: &str) {
    let (status, body) = server.propfind_body(path, "0").await;
    assert_eq!(status, StatusCode::MULTI_STATUS, "PROPFIND {path}: {body}");
    let entries = parse_multistatus(&body);
    assert_eq!(entries.len(), 1);
    assert!(
        entries[0].is_collection,
        "Expected {path} to be a collection: {body}"
    );
}

/// Property maps of every response, keyed by decoded name.
pub fn props_by_name(entries: &[PropEntry]) -> BTreeMap<String, PropEntry> {
    entries.iter().map(|e| (e.name(), e.clone())).collect()
}

/// Calculate SHA-256 hash of data.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let hash = sha256(b"hello world");
        // Known hash for "hello world"
        let expected: [u8; 32] = [
            0xb9, 0x4d, 0x27, 0xb9, 0x93, 0x4d, 0x3e, 0x08, 0xa5, 0x2e, 0x52, 0xd7, 0xda, 0x7d,
            0xab, 0xfa, 0xc4, 0x84, 0xef, 0xe3, 0x7a, 0x53, 0x80, 0xee, 0x90, 0x88, 0xf7, 0xac,
            0xe2, 0xef, 0xcd, 0xe9,
        ];
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_parse_multistatus() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <D:multistatus xmlns:D="DAV:">
              <D:response><D:href>/webdav/dir</D:href><D:propstat>
                <D:prop><D:displayname>dir</D:displayname><D:resourcetype><D:collection/></D:resourcetype></D:prop>
                <D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>
              <D:response><D:href>/webdav/dir/a%20b.txt</D:href><D:propstat>
                <D:prop><D:getcontentlength>3</D:getcontentlength><D:resourcetype/></D:prop>
                <D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>
            </D:multistatus>"#;
        let entries = parse_multistatus(xml);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_collection);
        assert_eq!(entries[1].name(), "a b.txt");
        assert_eq!(entries[1].prop("getcontentlength"), Some("3"));
        assert!(!entries[1].is_collection);
    }
}
