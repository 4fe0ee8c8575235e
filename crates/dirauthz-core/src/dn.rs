//! Distinguished name parsing and structural comparison.
//!
//! Role DNs coming back from the directory are deduplicated by structural
//! equality, not string equality: `CN=Admins, DC=example` and
//! `cn=admins,dc=example` refer to the same entry. A [`Dn`] keeps the
//! original string for display and a normalized form for comparison and
//! hashing.
//!
//! The parser covers the RFC 4514 subset the engine relies on: comma
//! separated RDNs, `+` separated multi-valued RDNs, backslash escapes
//! (single character and two-digit hex). Escaped leading/trailing spaces
//! in values are not round-tripped; comparison is whitespace-insensitive
//! between RDNs either way.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{Error, Result};

/// One relative distinguished name: a set of attribute type/value pairs
/// (almost always exactly one).
#[derive(Debug, Clone)]
pub struct Rdn {
    components: Vec<(String, String)>,
}

impl Rdn {
    /// Attribute value for `attr_type`, compared case-insensitively.
    pub fn value_of(&self, attr_type: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(attr_type))
            .map(|(_, v)| v.as_str())
    }
}

/// A parsed, canonicalized distinguished name.
///
/// Equality, ordering and hashing operate on the normalized form
/// (lowercased types and values, canonical separators); `Display` returns
/// the string the DN was parsed from.
#[derive(Debug, Clone)]
pub struct Dn {
    raw: String,
    rdns: Vec<Rdn>,
    canonical: String,
}

impl Dn {
    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(Error::InvalidDn("empty string".to_string()));
        }

        let mut rdns = Vec::new();
        let mut components = Vec::new();
        let mut attr_type = String::new();
        let mut value = String::new();
        // escaped bytes accumulate here so multi-byte hex escape runs
        // decode as one UTF-8 sequence
        let mut pending: Vec<u8> = Vec::new();
        let mut in_value = false;
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if !in_value {
                        // escapes are only meaningful in values
                        return Err(Error::InvalidDn(raw.to_string()));
                    }
                    pending.push(decode_escape(raw, &mut chars)?);
                }
                '=' if !in_value => {
                    in_value = true;
                }
                ',' | '+' => {
                    flush_pending(&mut value, &mut pending);
                    components.push(finish_component(raw, &mut attr_type, &mut value, in_value)?);
                    in_value = false;
                    if c == ',' {
                        rdns.push(Rdn {
                            components: std::mem::take(&mut components),
                        });
                    }
                }
                c => {
                    if in_value {
                        flush_pending(&mut value, &mut pending);
                        value.push(c);
                    } else {
                        attr_type.push(c);
                    }
                }
            }
        }
        flush_pending(&mut value, &mut pending);
        components.push(finish_component(raw, &mut attr_type, &mut value, in_value)?);
        rdns.push(Rdn { components });

        let canonical = canonicalize(&rdns);
        Ok(Self {
            raw: raw.to_string(),
            rdns,
            canonical,
        })
    }

    /// Whether `input` parses as a distinguished name. Bare usernames
    /// (no `=`) do not.
    pub fn is_valid(input: &str) -> bool {
        Self::parse(input).is_ok()
    }

    /// RDNs in left-to-right (most specific first) order.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Value of the rightmost RDN component whose type matches `attr_type`
    /// (case-insensitive). Directory name APIs enumerate RDNs from the
    /// root end, so when a type repeats the root-most value wins.
    pub fn rdn_value(&self, attr_type: &str) -> Option<&str> {
        self.rdns.iter().rev().find_map(|rdn| rdn.value_of(attr_type))
    }

    /// Derives the displayable role name for this DN.
    ///
    /// `role_name_attr` of `"dn"` (any case) selects the literal DN string;
    /// anything else selects the matching RDN value. Empty values count as
    /// absent.
    pub fn role_name(&self, role_name_attr: &str) -> Option<String> {
        if role_name_attr.eq_ignore_ascii_case("dn") {
            return Some(self.raw.clone());
        }
        match self.rdn_value(role_name_attr) {
            Some(v) if !v.is_empty() => Some(v.to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Dn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

fn decode_escape(raw: &str, chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<u8> {
    let Some(first) = chars.next() else {
        return Err(Error::InvalidDn(raw.to_string()));
    };
    if first.is_ascii_hexdigit() {
        if let Some(&second) = chars.peek() {
            if second.is_ascii_hexdigit() {
                chars.next();
                return u8::from_str_radix(&format!("{first}{second}"), 16)
                    .map_err(|_| Error::InvalidDn(raw.to_string()));
            }
        }
        return Err(Error::InvalidDn(raw.to_string()));
    }
    match first {
        ' ' | '"' | '#' | '+' | ',' | ';' | '<' | '=' | '>' | '\\' => Ok(first as u8),
        _ => Err(Error::InvalidDn(raw.to_string())),
    }
}

fn flush_pending(value: &mut String, pending: &mut Vec<u8>) {
    if !pending.is_empty() {
        value.push_str(&String::from_utf8_lossy(pending));
        pending.clear();
    }
}

fn finish_component(
    raw: &str,
    attr_type: &mut String,
    value: &mut String,
    in_value: bool,
) -> Result<(String, String)> {
    if !in_value {
        return Err(Error::InvalidDn(raw.to_string()));
    }
    let t = std::mem::take(attr_type).trim().to_string();
    let v = std::mem::take(value).trim().to_string();
    let valid_type = !t.is_empty()
        && t.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && t.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid_type {
        return Err(Error::InvalidDn(raw.to_string()));
    }
    Ok((t, v))
}

fn canonicalize(rdns: &[Rdn]) -> String {
    let mut out = String::new();
    for (i, rdn) in rdns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let mut components: Vec<String> = rdn
            .components
            .iter()
            .map(|(t, v)| format!("{}={}", t.to_lowercase(), escape_value(&v.to_lowercase())))
            .collect();
        components.sort();
        out.push_str(&components.join("+"));
    }
    out
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '+' | '=' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
