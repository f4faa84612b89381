//! Exact-match domain blocking.
//!
//! Names are compared exactly as received on the wire: case-sensitive and
//! trailing-dot-sensitive. There are no wildcards, so `ads.example.com.` does
//! not block `sub.ads.example.com.`.

use std::collections::HashSet;

use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::Name;

use super::reply_to;

/// An immutable set of blocked fully-qualified names.
#[derive(Debug, Clone, Default)]
pub struct Blocker {
    domains: HashSet<String>,
}

impl Blocker {
    /// Create a blocker from fully-qualified domain names such as `ads.test.`.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether a queried name is blocked.
    #[inline]
    pub fn is_blocked(&self, name: &Name) -> bool {
        self.is_blocked_domain(&name.to_ascii())
    }

    /// Check a name already rendered as text.
    #[inline]
    pub fn is_blocked_domain(&self, domain: &str) -> bool {
        self.domains.contains(domain)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Reply to a blocked query: the query echoed back with NXDOMAIN and no
    /// answers.
    pub fn blocked_response(query: &Message) -> Message {
        let mut response = reply_to(query);
        response.set_response_code(ResponseCode::NXDomain);
        response
    }
}
