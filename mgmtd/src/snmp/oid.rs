//! Object identifiers.

use std::fmt;
use std::str::FromStr;

/// An SNMP object identifier. Ordering is the lexicographic order of its
/// arcs, which is the MIB walk order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn new(arcs: Vec<u32>) -> Self {
        Self(arcs)
    }

    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// This OID extended by `arcs`.
    pub fn child(&self, arcs: &[u32]) -> Oid {
        let mut v = self.0.clone();
        v.extend_from_slice(arcs);
        Oid(v)
    }

    /// Arcs following `prefix`, if this OID lies under it.
    pub fn suffix(&self, prefix: &Oid) -> Option<&[u32]> {
        self.0.strip_prefix(prefix.0.as_slice())
    }

    pub fn parent(&self) -> Option<Oid> {
        let (_, rest) = self.0.split_last()?;
        Some(Oid(rest.to_vec()))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{}", arc)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix('.').unwrap_or(s);
        let arcs = s
            .split('.')
            .map(|arc| arc.parse::<u32>().map_err(|_| format!("invalid OID '{}'", s)))
            .collect::<Result<Vec<_>, _>>()?;
        if arcs.len() < 2 {
            return Err(format!("OID '{}' needs at least two arcs", s));
        }
        Ok(Oid(arcs))
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Oid(arcs.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let oid: Oid = ".1.3.6.1.2.1.1.5.0".parse().unwrap();
        assert_eq!(oid.to_string(), "1.3.6.1.2.1.1.5.0");
        assert!("1".parse::<Oid>().is_err());
        assert!("1.3.x".parse::<Oid>().is_err());
    }

    #[test]
    fn test_walk_order() {
        let a: Oid = "1.3.6.1.2".parse().unwrap();
        let b: Oid = "1.3.6.1.2.1".parse().unwrap();
        let c: Oid = "1.3.6.1.10".parse().unwrap();
        assert!(a < b);
        assert!(b < c);
        assert_eq!(b.suffix(&a), Some(&[1][..]));
        assert_eq!(b.parent(), Some(a));
    }
}
