//! Which requests are limited, and what they are counted against.
//!
//! A [`Policy`] pairs an applicability predicate with a scope extractor. Both are plain
//! closures so any combination can be injected without subclassing.
//!
//! Built-in strategies:
//! - [`Policy::per_address`]: every request, scoped by client address.
//! - [`Policy::post_only`]: only POSTs, scoped by client address.
//! - [`Policy::post_field`]: only POSTs, scoped by client address plus the SHA-1 of a
//!   submitted field (e.g. a login username), to catch distributed guessing against one
//!   account.

use crate::keys::sha1_hex;
use crate::request::RequestMeta;
use std::sync::Arc;

/// Extracts the scope a request is counted against.
pub type ScopeFn<Req> = Arc<dyn Fn(&Req) -> String + Send + Sync>;
/// Decides whether a request is subject to limiting.
pub type PredicateFn<Req> = Arc<dyn Fn(&Req) -> bool + Send + Sync>;

/// Client address, or an empty string when unknown.
pub fn client_address<R: RequestMeta>(req: &R) -> String {
    req.remote_addr().unwrap_or_default().to_string()
}

/// Client address joined with the SHA-1 hex of form field `field` (empty value when
/// the field is absent).
pub fn address_and_field<R: RequestMeta>(req: &R, field: &str) -> String {
    let value = req.form_value(field).unwrap_or_default();
    format!("{}-{}", client_address(req), sha1_hex(value))
}

/// True for POST requests, ignoring ASCII case.
pub fn is_post<R: RequestMeta>(req: &R) -> bool {
    req.method().eq_ignore_ascii_case("POST")
}

/// Applicability predicate plus scope extractor.
pub struct Policy<Req> {
    applies: PredicateFn<Req>,
    scope: ScopeFn<Req>,
}

impl<Req> Clone for Policy<Req> {
    fn clone(&self) -> Self {
        Self { applies: self.applies.clone(), scope: self.scope.clone() }
    }
}

impl<Req> std::fmt::Debug for Policy<Req> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("applies", &"<predicate>")
            .field("scope", &"<extractor>")
            .finish()
    }
}

impl<Req> Policy<Req> {
    /// Build a policy from custom strategies.
    pub fn new<P, S>(applies: P, scope: S) -> Self
    where
        P: Fn(&Req) -> bool + Send + Sync + 'static,
        S: Fn(&Req) -> String + Send + Sync + 'static,
    {
        Self { applies: Arc::new(applies), scope: Arc::new(scope) }
    }

    /// Replace the applicability predicate.
    pub fn when<P>(mut self, applies: P) -> Self
    where
        P: Fn(&Req) -> bool + Send + Sync + 'static,
    {
        self.applies = Arc::new(applies);
        self
    }

    /// Replace the scope extractor.
    pub fn scoped_by<S>(mut self, scope: S) -> Self
    where
        S: Fn(&Req) -> String + Send + Sync + 'static,
    {
        self.scope = Arc::new(scope);
        self
    }

    pub fn applies(&self, req: &Req) -> bool {
        (self.applies)(req)
    }

    pub fn scope(&self, req: &Req) -> String {
        (self.scope)(req)
    }
}

impl<Req> Policy<Req>
where
    Req: RequestMeta + 'static,
{
    /// Limit every request per client address.
    pub fn per_address() -> Self {
        Self::new(|_| true, client_address::<Req>)
    }

    /// Limit only POSTs, per client address.
    pub fn post_only() -> Self {
        Self::new(is_post::<Req>, client_address::<Req>)
    }

    /// Limit only POSTs, per client address and submitted `field`.
    pub fn post_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(is_post::<Req>, move |req: &Req| address_and_field(req, &field))
    }
}

impl<Req> Default for Policy<Req>
where
    Req: RequestMeta + 'static,
{
    fn default() -> Self {
        Self::per_address()
    }
}
