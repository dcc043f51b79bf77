use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::EtlResult;
use crate::source::Source;
use crate::types::{EntityKind, IdSet};

/// One page of changed ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPage {
    pub ids: IdSet,
    /// `true` when no changed row remains outside the excepted ids.
    pub exhausted: bool,
}

/// Lower bound of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStart {
    /// Every row, including rows that were never modified.
    Beginning,
    /// Rows modified strictly after the instant.
    After(DateTime<Utc>),
}

/// Finds rows modified after a watermark, one page at a time.
///
/// Pages are ordered by modification instant. Rows sharing an instant come back in whatever
/// order the source returns them, so the split of ties across pages is not deterministic.
/// This is harmless because pages are chained through the excepted ids rather than through
/// offsets.
#[derive(Debug, Clone)]
pub struct ChangeDetector<Src> {
    source: Src,
    page_size: usize,
}

impl<Src> ChangeDetector<Src>
where
    Src: Source,
{
    pub fn new(source: Src, page_size: usize) -> Self {
        Self { source, page_size }
    }

    /// Returns the next page of ids of `kind` past `start` and not in `excepted`.
    pub async fn detect(
        &self,
        kind: EntityKind,
        start: SweepStart,
        excepted: &IdSet,
    ) -> EtlResult<DetectedPage> {
        let page = match start {
            SweepStart::Beginning => {
                self.source
                    .all_ids(kind, excepted.as_slice(), self.page_size)
                    .await?
            }
            SweepStart::After(watermark) => {
                self.source
                    .modified_ids(kind, watermark, excepted.as_slice(), self.page_size)
                    .await?
            }
        };
        let ids: IdSet = page
            .into_iter()
            .filter(|id| !excepted.contains(id))
            .collect();

        debug!(
            %kind,
            ?start,
            excepted = excepted.len(),
            detected = ids.len(),
            "detected changed rows"
        );

        let exhausted = ids.is_empty();

        Ok(DetectedPage { ids, exhausted })
    }
}
