//! The abstract inbound-request boundary consumed by the parsing core.
//!
//! The web layer buffers each webhook request into an `InboundRequest` so
//! the parsers only ever see already-read data: posted fields, uploaded
//! files, headers, and the externally visible URL.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// An uploaded file posted with an inbound webhook request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// The multipart form-field name the file was posted under.
    pub field_name: String,
    /// The client-supplied filename.
    pub file_name: String,
    /// Declared size in bytes. Checked against the attachment ceiling before
    /// the contents are read.
    pub size: u64,
    pub content_type: String,
    content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            size: content.len() as u64,
            content_type: content_type.into(),
            content,
        }
    }

    /// Full contents of the upload, already buffered by the HTTP layer.
    pub fn read(&self) -> &[u8] {
        &self.content
    }
}

/// A buffered inbound webhook request.
///
/// Field values are kept as raw bytes because some providers post fields in
/// a charset other than UTF-8 and declare it out-of-band.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    url: String,
    fields: BTreeMap<String, Vec<u8>>,
    files: Vec<UploadedFile>,
    headers: HashMap<String, String>,
}

impl InboundRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// The externally visible URL the webhook was delivered to.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn insert_field(&mut self, name: impl Into<String>, value: impl AsRef<[u8]>) {
        self.fields.insert(name.into(), value.as_ref().to_vec());
    }

    pub fn insert_file(&mut self, file: UploadedFile) {
        self.files.push(file);
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Raw bytes of a posted field.
    pub fn field_raw(&self, name: &str) -> Option<&[u8]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// A posted field decoded as UTF-8 (lossily). Providers that declare
    /// other charsets go through `field_raw` instead.
    pub fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.field_raw(name).map(String::from_utf8_lossy)
    }

    /// All posted fields in ascending name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Cow<'_, str>)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value)))
    }

    /// Uploaded files in order of appearance.
    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup() {
        let mut request = InboundRequest::new("http://testserver/inbound/");
        request.insert_field("subject", "Hello");

        assert_eq!(request.field("subject").as_deref(), Some("Hello"));
        assert_eq!(request.field("missing"), None);
    }

    #[test]
    fn test_fields_iterate_in_name_order() {
        let mut request = InboundRequest::new("http://testserver/inbound/");
        request.insert_field("zulu", "z");
        request.insert_field("alpha", "a");
        request.insert_field("mike", "m");

        let names: Vec<&str> = request.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["alpha", "mike", "zulu"]);
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut request = InboundRequest::new("http://testserver/inbound/");
        request.insert_header("X-Mandrill-Signature", "abc123");

        assert_eq!(request.header("x-mandrill-signature"), Some("abc123"));
        assert_eq!(request.header("X-MANDRILL-SIGNATURE"), Some("abc123"));
    }

    #[test]
    fn test_uploaded_file_declares_size() {
        let file = UploadedFile::new("attachment1", "notes.txt", "text/plain", b"hello".to_vec());
        assert_eq!(file.size, 5);
        assert_eq!(file.read(), b"hello");
    }

    #[test]
    fn test_non_utf8_field_is_preserved_raw() {
        let mut request = InboundRequest::new("http://testserver/inbound/");
        // "café" in windows-1252
        request.insert_field("text", [0x63, 0x61, 0x66, 0xe9]);

        assert_eq!(request.field_raw("text"), Some(&[0x63, 0x61, 0x66, 0xe9][..]));
        // lossy view replaces the invalid byte
        assert_eq!(request.field("text").as_deref(), Some("caf\u{fffd}"));
    }
}
