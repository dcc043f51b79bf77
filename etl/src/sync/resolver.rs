use tracing::debug;

use crate::error::EtlResult;
use crate::source::Source;
use crate::types::{EntityKind, IdSet};

/// Maps changed ids of any kind to the ids of the films whose documents they appear in.
#[derive(Debug, Clone)]
pub struct RootResolver<Src> {
    source: Src,
    page_size: usize,
}

impl<Src> RootResolver<Src>
where
    Src: Source,
{
    pub fn new(source: Src, page_size: usize) -> Self {
        Self { source, page_size }
    }

    /// Returns the ids of every film referencing any of `ids`.
    ///
    /// Films are their own roots and are returned unchanged. For persons and genres the
    /// referencing films are read page by page until a page comes back empty.
    pub async fn resolve(&self, kind: EntityKind, ids: &IdSet) -> EtlResult<IdSet> {
        if kind.is_root() || ids.is_empty() {
            return Ok(ids.clone());
        }

        let mut roots = IdSet::new();
        loop {
            let page = self
                .source
                .referencing_film_ids(kind, ids.as_slice(), roots.as_slice(), self.page_size)
                .await?;

            let before = roots.len();
            roots.extend(page);
            if roots.len() == before {
                break;
            }
        }

        debug!(%kind, changed = ids.len(), roots = roots.len(), "resolved root films");

        Ok(roots)
    }
}
