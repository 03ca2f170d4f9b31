//! Distinguished name derivation.
//!
//! Group DNs nest under their parent's persisted DN; user DNs live flat under
//! the user base DN. Naming values are escaped per RFC 4514 so a display
//! name such as `R&D, Shanghai` cannot change where the entry lands.

/// Escape a DN attribute value per RFC 4514.
///
/// - `, + " \ < > ; =` are backslash-prefixed
/// - NUL becomes `\00`
/// - a leading or trailing space becomes `\20`
/// - a leading `#` becomes `\23`
#[must_use]
pub fn escape_dn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if i == 0 || i == last => result.push_str("\\20"),
            '#' if i == 0 => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }

    result
}

/// `cn=<name>,<parent_dn>`
#[must_use]
pub fn group_dn(group_name: &str, parent_dn: &str) -> String {
    format!("cn={},{}", escape_dn_value(group_name), parent_dn)
}

/// `uid=<username>,<user_base_dn>`
#[must_use]
pub fn user_dn(username: &str, user_base_dn: &str) -> String {
    format!("uid={},{}", escape_dn_value(username), user_base_dn)
}

/// Case-folded form used for DN comparisons.
///
/// Attribute types and most directory matching rules are case-insensitive,
/// and whitespace after RDN separators is not significant.
#[must_use]
pub fn normalize_dn(dn: &str) -> String {
    let mut out = String::with_capacity(dn.len());
    let mut escaped = false;
    let mut after_separator = false;
    for ch in dn.trim().chars() {
        if after_separator && ch == ' ' {
            continue;
        }
        after_separator = !escaped && ch == ',';
        escaped = !escaped && ch == '\\';
        out.extend(ch.to_lowercase());
    }
    out
}

/// Parent DN, i.e. everything after the first unescaped comma.
#[must_use]
pub fn parent_dn(dn: &str) -> Option<&str> {
    let mut escaped = false;
    for (i, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => return Some(dn[i + 1..].trim_start()),
            _ => escaped = false,
        }
    }
    None
}

/// True if `dn` equals `base` or sits somewhere below it.
#[must_use]
pub fn is_descendant_or_self(dn: &str, base: &str) -> bool {
    let dn = normalize_dn(dn);
    let base = normalize_dn(base);
    dn == base || dn.ends_with(&format!(",{base}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_simple() {
        assert_eq!(escape_dn_value("Engineering"), "Engineering");
    }

    #[test]
    fn test_escape_special_chars() {
        assert_eq!(escape_dn_value("R&D, Shanghai"), "R&D\\, Shanghai");
        assert_eq!(escape_dn_value("a+b=c"), "a\\+b\\=c");
        assert_eq!(escape_dn_value("x\0y"), "x\\00y");
    }

    #[test]
    fn test_escape_leading_trailing() {
        assert_eq!(escape_dn_value(" team "), "\\20team\\20");
        assert_eq!(escape_dn_value("#ops"), "\\23ops");
        assert_eq!(escape_dn_value("ops#"), "ops#");
    }

    #[test]
    fn test_escape_multibyte_trailing_space() {
        assert_eq!(escape_dn_value("研发 "), "研发\\20");
    }

    #[test]
    fn test_escape_injection_attempt() {
        let escaped = escape_dn_value("x,dc=evil,dc=com");
        assert_eq!(escaped, "x\\,dc\\=evil\\,dc\\=com");
        assert_eq!(parent_dn(&group_dn("x,dc=evil", "dc=example")), Some("dc=example"));
    }

    #[test]
    fn test_group_and_user_dn() {
        assert_eq!(
            group_dn("Platform", "cn=Engineering,dc=example,dc=com"),
            "cn=Platform,cn=Engineering,dc=example,dc=com"
        );
        assert_eq!(
            user_dn("alice", "ou=people,dc=example,dc=com"),
            "uid=alice,ou=people,dc=example,dc=com"
        );
    }

    #[test]
    fn test_normalize_dn() {
        assert_eq!(
            normalize_dn("CN=Ops, DC=Example,  DC=com"),
            "cn=ops,dc=example,dc=com"
        );
        assert_eq!(normalize_dn("cn=a\\, b,dc=x"), "cn=a\\, b,dc=x");
    }

    #[test]
    fn test_parent_dn() {
        assert_eq!(parent_dn("cn=a,dc=example,dc=com"), Some("dc=example,dc=com"));
        assert_eq!(parent_dn("cn=a\\,b,dc=com"), Some("dc=com"));
        assert_eq!(parent_dn("dc=com"), None);
    }

    #[test]
    fn test_is_descendant_or_self() {
        assert!(is_descendant_or_self("uid=a,ou=people,dc=x", "ou=People,dc=x"));
        assert!(is_descendant_or_self("dc=x", "dc=x"));
        assert!(!is_descendant_or_self("uid=a,ou=peoplex,dc=x", "ou=people,dc=x"));
    }
}
