//! Canonical type spellings and per-side alias tables.
//!
//! Every engine has its own open vocabulary of type names, so a canonical type
//! is simply a normalized spelling rather than a member of a fixed enum:
//!
//! ```text
//!   raw spelling         spelling            alias (one hop)
//!   "Double  Precision" → "double precision" → "double precision"
//!   "INT4"              → "int4"             → "integer"
//!   "NVARCHAR ( MAX )"  → "nvarchar(max)"    → "text"
//!   "numeric(10, 2)"    → "numeric(10,2)"    → "numeric"          (parameters stripped)
//! ```
//!
//! Alias resolution is a single lookup. Alias tables are validated at load
//! time so that no alias target is itself aliased elsewhere, which keeps
//! [`AliasTable::resolve`] idempotent.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeMapError};

/// A normalized type name within one engine's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalType(String);

impl CanonicalType {
    /// Wrap an already-normalized spelling.
    pub(crate) fn from_normalized(spelling: String) -> Self {
        Self(spelling)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Which end of a replication pair a type spelling belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Source,
    Sink,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Sink => write!(f, "sink"),
        }
    }
}

/// Lower-case a type spelling and collapse its whitespace.
///
/// Whitespace next to `(`, `)` and `,` is removed so that parameterized
/// spellings compare equal regardless of formatting.
pub fn normalize_spelling(raw: &str) -> String {
    let collapsed = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut out = String::with_capacity(collapsed.len());
    let chars: Vec<char> = collapsed.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' {
            let prev = out.chars().last();
            let next = chars.get(i + 1).copied();
            if matches!(prev, Some('(') | Some(','))
                || matches!(next, Some('(') | Some(')') | Some(','))
            {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Remove every parenthesized parameter group from a normalized spelling.
///
/// `"numeric(10,2)"` → `"numeric"`, `"timestamp(3) with time zone"` →
/// `"timestamp with time zone"`. Unbalanced input is returned unchanged.
pub fn strip_parameters(spelling: &str) -> String {
    if !spelling.contains('(') {
        return spelling.to_string();
    }

    let mut out = String::with_capacity(spelling.len());
    let mut depth = 0usize;
    for c in spelling.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return spelling.to_string();
                }
                depth -= 1;
            }
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    if depth != 0 {
        return spelling.to_string();
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a spelling to its canonical form without alias lookup.
pub fn canonical_spelling(raw: &str, strip_params: bool) -> String {
    let spelling = normalize_spelling(raw);
    if strip_params {
        strip_parameters(&spelling)
    } else {
        spelling
    }
}

/// One size parameter of a type spelling: a number or `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeParam {
    Max,
    Size(u64),
}

/// Size parameters of the first parenthesized group of a spelling.
///
/// `"varchar(MAX)"` → `[Max]`, `"numeric(18, 4)"` → `[Size(18), Size(4)]`.
/// Spellings without parameters, or with non-numeric ones, yield `None`.
pub fn size_parameters(raw: &str) -> Option<Vec<SizeParam>> {
    let spelling = normalize_spelling(raw);
    let open = spelling.find('(')?;
    let close = open + spelling[open..].find(')')?;
    spelling[open + 1..close]
        .split(',')
        .map(|p| match p {
            "max" => Some(SizeParam::Max),
            n => n.parse().ok().map(SizeParam::Size),
        })
        .collect()
}

/// Whether the source spelling's length, precision or scale exceeds what the
/// sink spelling declares. A side without size parameters never narrows.
pub fn narrows_parameters(source: &str, sink: &str) -> bool {
    let (Some(source), Some(sink)) = (size_parameters(source), size_parameters(sink)) else {
        return false;
    };
    match (source.as_slice(), sink.as_slice()) {
        ([s], [k]) => exceeds(*s, *k),
        (source, sink) => match (precision_scale(source), precision_scale(sink)) {
            (Some((sp, ss)), Some((kp, ks))) => {
                ss > ks || sp.saturating_sub(ss) > kp.saturating_sub(ks)
            }
            _ => false,
        },
    }
}

fn exceeds(source: SizeParam, sink: SizeParam) -> bool {
    match (source, sink) {
        (_, SizeParam::Max) => false,
        (SizeParam::Max, SizeParam::Size(_)) => true,
        (SizeParam::Size(s), SizeParam::Size(k)) => s > k,
    }
}

/// `(precision, scale)`; a lone precision has scale 0.
fn precision_scale(params: &[SizeParam]) -> Option<(u64, u64)> {
    match params {
        [SizeParam::Size(p)] => Some((*p, 0)),
        [SizeParam::Size(p), SizeParam::Size(s)] => Some((*p, *s)),
        _ => None,
    }
}

/// Single-hop mapping from raw spelling to canonical spelling for one side
/// of one compatibility map.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, CanonicalType>,
    strip_params: bool,
}

impl AliasTable {
    /// Build an alias table from an artifact's `aliases.<side>` section.
    ///
    /// Keys are spelling-normalized with parameters kept, so `nvarchar(max)`
    /// can alias differently from `nvarchar`. Values are fully canonicalized.
    /// Fails on conflicting duplicate keys and on alias chains.
    pub fn from_entries(
        raw: &BTreeMap<String, String>,
        strip_params: bool,
        side: Side,
        artifact: &str,
    ) -> Result<Self> {
        let mut entries: HashMap<String, CanonicalType> = HashMap::with_capacity(raw.len());

        for (key, value) in raw {
            let k = normalize_spelling(key);
            let v = canonical_spelling(value, strip_params);
            if k.is_empty() || v.is_empty() {
                return Err(TypeMapError::artifact(
                    format!("aliases.{} contains an empty type name", side),
                    artifact,
                ));
            }
            if let Some(existing) = entries.get(&k) {
                if existing.as_str() != v {
                    return Err(TypeMapError::artifact(
                        format!(
                            "aliases.{}: '{}' is aliased to both '{}' and '{}'",
                            side, k, existing, v
                        ),
                        artifact,
                    ));
                }
            }
            entries.insert(k, CanonicalType::from_normalized(v));
        }

        for (key, target) in &entries {
            if let Some(next) = entries.get(target.as_str()) {
                if next != target {
                    return Err(TypeMapError::artifact(
                        format!(
                            "aliases.{}: chained alias '{}' → '{}' → '{}' (aliases must resolve in one hop)",
                            side, key, target, next
                        ),
                        artifact,
                    ));
                }
            }
        }

        Ok(Self {
            entries,
            strip_params,
        })
    }

    /// Resolve a raw spelling to its canonical type.
    ///
    /// Tries the full normalized spelling, then (when parameter stripping is
    /// on) the unparameterized spelling. Unknown spellings are returned
    /// normalized; canonical types need not appear in the table.
    pub fn resolve(&self, raw: &str) -> CanonicalType {
        let spelling = normalize_spelling(raw);
        if let Some(target) = self.entries.get(&spelling) {
            return target.clone();
        }
        if !self.strip_params {
            return CanonicalType::from_normalized(spelling);
        }

        let base = strip_parameters(&spelling);
        match self.entries.get(&base) {
            Some(target) => target.clone(),
            None => CanonicalType::from_normalized(base),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Get the canonical engine name.
///
/// Normalizes common aliases; any other engine name is lower-cased and kept
/// since the engine vocabulary is open:
/// - "mssql", "sqlserver", "sql_server" → "mssql"
/// - "postgres", "postgresql", "pg" → "postgres"
/// - "mysql", "mariadb" → "mysql"
pub fn normalize_engine(engine: &str) -> String {
    let lower = engine.trim().to_lowercase();
    match lower.as_str() {
        "mssql" | "sqlserver" | "sql_server" => "mssql".to_string(),
        "postgres" | "postgresql" | "pg" => "postgres".to_string(),
        "mysql" | "mariadb" => "mysql".to_string(),
        _ => lower,
    }
}
