//! SIP message types and the engine's view of them

use crate::domain::routing::SipHeaders;
use bytes::Bytes;
use rsip::{Header, Headers, Request, Response, Uri};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

/// Split a rendered header line into name and value
fn split_header(header: &Header) -> Option<(String, String)> {
    let line = header.to_string();
    let (name, value) = line.split_once(':')?;
    Some((name.trim().to_string(), value.trim().to_string()))
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    /// Uppercase method token, e.g. `INVITE`
    pub fn method(&self) -> String {
        self.inner.method.to_string().to_ascii_uppercase()
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn call_id(&self) -> Option<String> {
        self.sip_headers().get("Call-ID").map(str::to_string)
    }

    /// Headers as an ordered, case-insensitive multimap
    pub fn sip_headers(&self) -> SipHeaders {
        self.inner.headers.iter().filter_map(split_header).collect()
    }

    /// Copy of this request addressed to `target`
    pub fn retarget(&self, target: &str) -> Result<SipRequest, SipError> {
        let has_scheme = ["sip:", "sips:"].iter().any(|scheme| {
            target
                .get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        });
        if !has_scheme {
            return Err(SipError::InvalidMessage(format!(
                "fork target {:?} is not a SIP URI",
                target
            )));
        }
        let mut request = self.clone();
        request.inner.uri = Uri::try_from(target)?;
        Ok(request)
    }

    /// Replace every header named in `rewrites` with the rewritten value
    pub fn apply_header_rewrites(&mut self, rewrites: &SipHeaders) {
        if rewrites.is_empty() {
            return;
        }

        let mut headers: Vec<Header> = self
            .inner
            .headers
            .iter()
            .filter(|header| match split_header(header) {
                Some((name, _)) => !rewrites.contains(&name),
                None => true,
            })
            .cloned()
            .collect();

        for (name, value) in rewrites.iter() {
            headers.push(Header::Other(name.to_string(), value.into()));
        }

        self.inner.headers = Headers::from(headers);
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}
