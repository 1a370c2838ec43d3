//! `multipart/form-data` bodies for file uploads.
//!
//! The framing is produced by the `multipart` crate's lazy client writer;
//! this module only collects the prepared stream into a request body and
//! pairs it with a `Content-Type` header naming the boundary.

use std::io::{self, Cursor, Read};

use multipart::client::lazy::Multipart;

/// An encoded form, ready to become a request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncodedForm {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Encode a form with one file field sent as `application/octet-stream`.
pub(crate) fn file_form(field: &'static str, filename: String, data: Vec<u8>) -> io::Result<EncodedForm> {
    let mut form = Multipart::new();
    form.add_stream(
        field,
        Cursor::new(data),
        Some(filename),
        Some(mime::APPLICATION_OCTET_STREAM),
    );
    let mut prepared = form.prepare().map_err(|err| err.error)?;
    let content_type = format!("multipart/form-data; boundary={}", prepared.boundary());
    let mut body = Vec::new();
    prepared.read_to_end(&mut body)?;
    Ok(EncodedForm { content_type, body })
}
