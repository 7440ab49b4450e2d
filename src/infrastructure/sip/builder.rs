//! SIP response builder

use super::message::{SipError, SipRequest, SipResponse};
use rsip::{Header, Headers, Response, StatusCode, Version};

/// Build a final SIP response for a request
pub struct ResponseBuilder {
    status_code: u16,
    reason: Option<String>,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            reason: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Reason text, carried in an RFC 3326 `Reason` header
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn build_for_request(mut self, request: &SipRequest) -> Result<SipResponse, SipError> {
        if !(100..=699).contains(&self.status_code) {
            return Err(SipError::InvalidMessage(format!(
                "status code {} out of range",
                self.status_code
            )));
        }

        // Copy essential headers from request
        for header in request.headers().iter() {
            match header {
                Header::Via(_) | Header::From(_) | Header::To(_) | Header::CallId(_) | Header::CSeq(_) => {
                    self.headers.push(header.clone());
                }
                _ => {}
            }
        }

        if let Some(reason) = &self.reason {
            let text = reason.replace('"', "'");
            let value = format!("SIP ;cause={} ;text=\"{}\"", self.status_code, text);
            self.headers.push(Header::Other("Reason".to_string(), value.as_str().into()));
        }

        self.headers.push(Header::ContentLength(
            if self.body.is_empty() {
                "0".into()
            } else {
                self.body.len().to_string().into()
            },
        ));

        let response = Response {
            status_code: StatusCode::from(self.status_code),
            headers: Headers::from(self.headers),
            body: self.body,
            version: Version::V2,
        };

        Ok(SipResponse::new(response))
    }
}
