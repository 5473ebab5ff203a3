use crate::model::Address;
use crate::resolve::NodeIdentityResolver;

/// Directed hop `(from, to)` between canonical addresses.
pub type Segment = (Address, Address);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decomposition {
    pub segments: Vec<Segment>,
    /// Segments dropped because one of their endpoints did not resolve.
    pub unresolved: usize,
}

pub struct PathDecomposer<'a> {
    resolver: &'a NodeIdentityResolver,
}

impl<'a> PathDecomposer<'a> {
    pub fn new(resolver: &'a NodeIdentityResolver) -> Self {
        Self { resolver }
    }

    /// Splits a raw path into consecutive directed segments.
    ///
    /// Returns `None` for paths shorter than two hops; such flows cannot be
    /// assigned to any link.
    pub fn decompose<S: AsRef<str>>(&self, path: &[S]) -> Option<Decomposition> {
        if path.len() < 2 {
            return None;
        }

        let hops: Vec<Option<Address>> = path
            .iter()
            .map(|raw| match self.resolver.resolve_raw(raw.as_ref()) {
                Ok(resolved) => Some(resolved.address),
                Err(err) => {
                    tracing::debug!(raw = raw.as_ref(), %err, "skipping unresolvable hop");
                    None
                }
            })
            .collect();

        let mut out = Decomposition {
            segments: Vec::with_capacity(path.len() - 1),
            unresolved: 0,
        };
        for pair in hops.windows(2) {
            match (&pair[0], &pair[1]) {
                (Some(a), Some(b)) => out.segments.push((a.clone(), b.clone())),
                _ => out.unresolved += 1,
            }
        }
        Some(out)
    }
}
