/// Registration is restricted to institutional addresses: the domain part
/// of the email must end with the configured suffix (".edu" by default).
///
/// This is a gate, not a full RFC 5322 validator — the address still has to
/// survive an actual delivery if the deployment verifies emails.
pub fn is_institutional_email(email: &str, suffix: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    // "student@edu" should not pass a ".edu" suffix check
    domain.len() > suffix.len() && domain.ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_campus_addresses() {
        assert!(is_institutional_email("student@campus.edu", ".edu"));
        assert!(is_institutional_email("a.b@cs.state.edu", ".edu"));
    }

    #[test]
    fn rejects_non_institutional_addresses() {
        assert!(!is_institutional_email("student@gmail.com", ".edu"));
        assert!(!is_institutional_email("student@edu.org", ".edu"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_institutional_email("no-at-sign.edu", ".edu"));
        assert!(!is_institutional_email("@campus.edu", ".edu"));
        assert!(!is_institutional_email("student@", ".edu"));
        assert!(!is_institutional_email("student@edu", ".edu"));
    }

    #[test]
    fn honors_configured_suffix() {
        assert!(is_institutional_email("staff@uni.ac.uk", ".ac.uk"));
        assert!(!is_institutional_email("staff@uni.ac.uk", ".edu"));
    }
}
