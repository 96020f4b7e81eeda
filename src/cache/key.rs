//! Cache identity of a request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::routing::Params;

/// Binding name + captured values + canonical query.
///
/// Two requests with equal keys are interchangeable for a cacheable
/// binding, so the key must not depend on how the path was spelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    binding: String,
    params: Vec<(String, String)>,
    query: Option<String>,
}

impl CacheKey {
    pub fn new(binding: &str, params: &Params, query: Option<&str>) -> Self {
        Self {
            binding: binding.to_string(),
            params: params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            query: query.and_then(canonical_query),
        }
    }

    pub fn binding(&self) -> &str {
        &self.binding
    }
}

/// Sort `a=1&b=2` pairs so parameter order does not split entries.
fn canonical_query(query: &str) -> Option<String> {
    let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_unstable();
    Some(pairs.join("&"))
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.binding)?;
        for (name, value) in &self.params {
            write!(f, " {name}={value}")?;
        }
        if let Some(query) = &self.query {
            write!(f, " ?{query}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        let mut params = Params::new();
        for (name, value) in pairs {
            params.push(name, value);
        }
        params
    }

    #[test]
    fn query_order_does_not_matter() {
        let p = params(&[("id", "7")]);
        assert_eq!(
            CacheKey::new("item", &p, Some("b=2&a=1")),
            CacheKey::new("item", &p, Some("a=1&b=2"))
        );
        assert_eq!(CacheKey::new("item", &p, Some("")), CacheKey::new("item", &p, None));
    }

    #[test]
    fn distinguishes_bindings_and_values() {
        let p = params(&[("id", "7")]);
        assert_ne!(CacheKey::new("item", &p, None), CacheKey::new("other", &p, None));
        assert_ne!(
            CacheKey::new("item", &p, None),
            CacheKey::new("item", &params(&[("id", "8")]), None)
        );
        assert_eq!(CacheKey::new("item", &p, Some("x=1")).to_string(), "item id=7 ?x=1");
    }
}
