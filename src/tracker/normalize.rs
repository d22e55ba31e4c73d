//! Company guessing from sender addresses.

/// Guess a company from a sender address: the lowercase first label of the
/// domain (`hr@airbnb.com` → `airbnb`).
///
/// Returns `None` for a missing address, one without `@`, or an empty first
/// domain label.
pub fn company_from_sender(address: Option<&str>) -> Option<String> {
    // Text between the first and second `@`.
    let domain = address?.split('@').nth(1)?;
    let label = domain.split('.').next().unwrap_or_default();
    if label.is_empty() {
        return None;
    }
    Some(label.to_lowercase())
}

/// Case-folded company name used to compare companies. Full Unicode
/// lowercasing, so `Électricité` and `ÉLECTRICITÉ` share a key.
pub fn company_key(company: &str) -> String {
    company.trim().to_lowercase()
}

/// Trimmed value, or `None` if absent or blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_domain_label_lowercased() {
        assert_eq!(company_from_sender(Some("user@airbnb.com")).as_deref(), Some("airbnb"));
        assert_eq!(
            company_from_sender(Some("Recruiting@Careers.Stripe.COM")).as_deref(),
            Some("careers")
        );
        assert_eq!(company_from_sender(Some("a@localhost")).as_deref(), Some("localhost"));
    }

    #[test]
    fn company_key_folds_unicode_case() {
        assert_eq!(company_key("Électricité"), company_key("ÉLECTRICITÉ"));
        assert_eq!(company_key(" AirBnB "), "airbnb");
        assert_ne!(company_key("acme"), company_key("acme corp"));
    }

    #[test]
    fn missing_or_malformed_address() {
        assert_eq!(company_from_sender(None), None);
        assert_eq!(company_from_sender(Some("")), None);
        assert_eq!(company_from_sender(Some("no-at-sign.com")), None);
        assert_eq!(company_from_sender(Some("user@")), None);
        assert_eq!(company_from_sender(Some("user@.com")), None);
        assert_eq!(company_from_sender(Some("odd@acme@corp.com")).as_deref(), Some("acme"));
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(Some("  Acme ")), Some("Acme"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
