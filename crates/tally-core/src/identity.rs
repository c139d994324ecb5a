//! Student identity normalization.
//!
//! Sources submit the same student with different capitalisation, Gmail
//! `+alias` suffixes and phone separators. Normalization maps all of those to
//! one [`IdentityKey`]. Email wins over phone when both are present.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Domains whose mail servers ignore the `+alias` part of the local part.
const GMAIL_DOMAINS: &[&str] = &["gmail.com", "googlemail.com"];

/// Canonical identity of a student, tagged with the signal it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum IdentityKey {
    Email(String),
    Phone(String),
}

impl IdentityKey {
    /// The normalized value without its kind.
    pub fn as_str(&self) -> &str {
        match self {
            IdentityKey::Email(v) | IdentityKey::Phone(v) => v,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Email(v) => write!(f, "email:{v}"),
            IdentityKey::Phone(v) => write!(f, "phone:{v}"),
        }
    }
}

/// Derive the identity key from raw contact fields.
///
/// Returns `None` when neither field carries a usable signal.
pub fn normalize(raw_email: Option<&str>, raw_phone: Option<&str>) -> Option<IdentityKey> {
    if let Some(email) = raw_email.and_then(normalize_email) {
        return Some(IdentityKey::Email(email));
    }
    raw_phone.and_then(normalize_phone).map(IdentityKey::Phone)
}

/// Lowercase an email and drop Gmail `+alias` suffixes. Dots are kept.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return None;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Some(email);
    };

    if GMAIL_DOMAINS.contains(&domain) {
        if let Some((base, _alias)) = local.split_once('+') {
            return Some(format!("{base}@{domain}"));
        }
    }
    Some(email)
}

/// Keep only the decimal digits of a phone number.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gmail_alias_is_removed() {
        assert_eq!(
            normalize(Some("a.b+class1@gmail.com"), None),
            normalize(Some("a.b@gmail.com"), None)
        );
        assert_eq!(
            normalize_email("A.B+Class1@Gmail.com").as_deref(),
            Some("a.b@gmail.com")
        );
    }

    #[test]
    fn dots_are_not_stripped() {
        assert_ne!(
            normalize(Some("ab@gmail.com"), None),
            normalize(Some("a.b@gmail.com"), None)
        );
    }

    #[test]
    fn alias_kept_for_other_domains() {
        assert_eq!(
            normalize_email("john+tag@example.com").as_deref(),
            Some("john+tag@example.com")
        );
    }

    #[test]
    fn googlemail_is_gmail_family() {
        assert_eq!(
            normalize_email("jo+x@googlemail.com").as_deref(),
            Some("jo@googlemail.com")
        );
    }

    #[test]
    fn email_normalization_is_idempotent() {
        for raw in [
            "John.Doe+test@GMAIL.com",
            "  mixed@Example.ORG ",
            "no-at-sign",
            "x+y+z@gmail.com",
        ] {
            let once = normalize_email(raw).unwrap();
            let twice = normalize_email(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn phone_separators_are_ignored() {
        let a = normalize(None, Some("91-7654-321098")).unwrap();
        let b = normalize(None, Some("91 7654 321098")).unwrap();
        let c = normalize(None, Some("+91 (765) 432-1098")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "917654321098");
        assert_eq!(c.as_str(), "917654321098");
    }

    #[test]
    fn email_takes_priority_over_phone() {
        let key = normalize(Some("s@x.com"), Some("12345")).unwrap();
        assert_eq!(key, IdentityKey::Email("s@x.com".into()));
    }

    #[test]
    fn blank_email_falls_back_to_phone() {
        let key = normalize(Some("   "), Some("555-0100")).unwrap();
        assert_eq!(key, IdentityKey::Phone("5550100".into()));
    }

    #[test]
    fn no_signal_yields_none() {
        assert_eq!(normalize(None, None), None);
        assert_eq!(normalize(Some(""), Some("n/a")), None);
    }

    #[test]
    fn email_and_phone_keys_never_collide() {
        assert_ne!(
            IdentityKey::Email("123".into()),
            IdentityKey::Phone("123".into())
        );
    }
}
