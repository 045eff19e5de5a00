//! Inbound request contract.
//!
//! Scope extractors and applicability predicates only need a method, the client
//! address and submitted form fields. Implement [`RequestMeta`] for your framework's
//! request type, or use [`FormRequest`].

use std::collections::HashMap;

/// The parts of a request the limiter can inspect.
pub trait RequestMeta {
    /// HTTP method, e.g. `"POST"`.
    fn method(&self) -> &str;

    /// Originating network address, if known.
    fn remote_addr(&self) -> Option<&str>;

    /// Value of a submitted form-encoded field.
    fn form_value(&self, name: &str) -> Option<&str>;
}

impl<T: RequestMeta + ?Sized> RequestMeta for &T {
    fn method(&self) -> &str {
        (**self).method()
    }

    fn remote_addr(&self) -> Option<&str> {
        (**self).remote_addr()
    }

    fn form_value(&self, name: &str) -> Option<&str> {
        (**self).form_value(name)
    }
}

/// Minimal owned request: method, client address and form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormRequest {
    method: String,
    remote_addr: Option<String>,
    form: HashMap<String, String>,
}

impl FormRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self { method: method.into(), ..Default::default() }
    }

    /// A GET from `addr`.
    pub fn get(addr: impl Into<String>) -> Self {
        Self::new("GET").from_addr(addr)
    }

    /// A POST from `addr`.
    pub fn post(addr: impl Into<String>) -> Self {
        Self::new("POST").from_addr(addr)
    }

    /// Set the client address.
    pub fn from_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Add a submitted form field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }
}

impl RequestMeta for FormRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    fn form_value(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_fill_parts() {
        let req = FormRequest::post("10.1.1.1").field("username", "alice");
        assert_eq!(req.method(), "POST");
        assert_eq!(req.remote_addr(), Some("10.1.1.1"));
        assert_eq!(req.form_value("username"), Some("alice"));
        assert_eq!(req.form_value("password"), None);

        let anon = FormRequest::new("PUT");
        assert_eq!(anon.remote_addr(), None);
    }
}
