//! Trust-flag bridge for backends that keep their own login state.
//!
//! The backend only needs a yes/no; it remembers the answer itself (the
//! notebook server sets its own login cookie once trusted).

use super::{record_outcome, SessionBridge};
use crate::auth::verifier::VerificationResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct TrustFlagBridge;

impl SessionBridge for TrustFlagBridge {
    type Credential = bool;

    fn backend(&self) -> &'static str {
        "trust_flag"
    }

    fn bridge(&self, result: VerificationResult) -> bool {
        record_outcome(self.backend(), &result);
        result.is_ok()
    }
}

/// Where to send a trusted user after login.
///
/// `next` is only honoured when it is a local path under `base`; anything
/// else, including protocol-relative and absolute URLs, yields `base`.
pub fn safe_redirect<'a>(next: Option<&'a str>, base: &'a str) -> &'a str {
    let Some(next) = next.filter(|n| !n.is_empty()) else {
        return base;
    };

    let local = next.starts_with('/')
        && !next.starts_with("//")
        && !next.contains('\\')
        && !next.chars().any(char::is_control);
    if !local {
        return base;
    }

    let prefix = base.trim_end_matches('/');
    let under_base = prefix.is_empty()
        || next == prefix
        || next
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'));

    if under_base {
        next
    } else {
        base
    }
}
