//! Caller context carried with every invocation request.

use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::ids::{CallerId, InvocationId};

/// Whether a request originates from the trusted server side or from a caller-controlled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Server-originated request; only privileged handlers run.
    Trusted,
    /// Client-originated request; an unprivileged handler is preferred when one exists.
    Untrusted,
}

impl TrustLevel {
    /// Returns `true` when the request came from a caller-controlled context.
    #[must_use]
    pub const fn is_untrusted(self) -> bool {
        matches!(self, Self::Untrusted)
    }
}

/// Per-request identity and trust information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    caller: CallerId,
    trust: TrustLevel,
    invocation_id: InvocationId,
}

impl CallerContext {
    /// Creates a context for the supplied caller, assigning a fresh invocation id.
    #[must_use]
    pub fn new(caller: CallerId, trust: TrustLevel) -> Self {
        Self {
            caller,
            trust,
            invocation_id: InvocationId::random(),
        }
    }

    /// Convenience constructor for trusted, server-side requests.
    #[must_use]
    pub fn trusted(caller: CallerId) -> Self {
        Self::new(caller, TrustLevel::Trusted)
    }

    /// Convenience constructor for untrusted, client-side requests.
    #[must_use]
    pub fn untrusted(caller: CallerId) -> Self {
        Self::new(caller, TrustLevel::Untrusted)
    }

    /// Derives the caller identity from request headers.
    ///
    /// The first `x-forwarded-for` hop wins, then `x-real-ip`; requests carrying
    /// neither share the anonymous identity.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, trust: TrustLevel) -> Self {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next());
        let real_ip = headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok());

        let caller = forwarded
            .into_iter()
            .chain(real_ip)
            .find_map(|candidate| CallerId::new(candidate).ok())
            .unwrap_or_else(CallerId::anonymous);

        Self::new(caller, trust)
    }

    /// Overrides the invocation identifier.
    #[must_use]
    pub fn with_invocation_id(mut self, invocation_id: InvocationId) -> Self {
        self.invocation_id = invocation_id;
        self
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Returns the trust classification.
    #[must_use]
    pub const fn trust(&self) -> TrustLevel {
        self.trust
    }

    /// Returns the invocation identifier.
    #[must_use]
    pub const fn invocation_id(&self) -> InvocationId {
        self.invocation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.2"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));

        let ctx = CallerContext::from_headers(&headers, TrustLevel::Untrusted);
        assert_eq!(ctx.caller().as_str(), "203.0.113.7");
        assert!(ctx.trust().is_untrusted());
    }

    #[test]
    fn falls_back_to_real_ip_then_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.9"));
        let ctx = CallerContext::from_headers(&headers, TrustLevel::Trusted);
        assert_eq!(ctx.caller().as_str(), "10.0.0.9");

        let ctx = CallerContext::from_headers(&HeaderMap::new(), TrustLevel::Trusted);
        assert!(ctx.caller().is_anonymous());
    }

    #[test]
    fn each_context_gets_a_distinct_invocation_id() {
        let a = CallerContext::trusted(CallerId::anonymous());
        let b = CallerContext::trusted(CallerId::anonymous());
        assert_ne!(a.invocation_id(), b.invocation_id());
    }
}
