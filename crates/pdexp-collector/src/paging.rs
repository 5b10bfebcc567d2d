use std::future::Future;

use pdexp_common::error::Result;

/// Hard upper bound on records walked by one paginated loop.
pub const CEILING: u64 = 10_000;

/// Pagination fields echoed by a list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PagingState {
    pub offset: u64,
    pub limit: u64,
    pub more: bool,
}

/// One page of a list response.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub state: PagingState,
}

/// Stop predicate for paginated fetch loops.
///
/// `more` alone is never trusted: a loop also stops once the next page would
/// cross the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingGuard {
    ceiling: u64,
}

impl PagingGuard {
    pub fn new() -> Self {
        Self { ceiling: CEILING }
    }

    /// Guard with a tighter bound, capped at [`CEILING`].
    pub fn with_ceiling(ceiling: u64) -> Self {
        Self {
            ceiling: ceiling.min(CEILING),
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn should_stop(&self, state: &PagingState) -> bool {
        !state.more || state.offset.saturating_add(state.limit) > self.ceiling
    }
}

impl Default for PagingGuard {
    fn default() -> Self {
        Self::new()
    }
}

pub fn should_stop(state: &PagingState) -> bool {
    PagingGuard::new().should_stop(state)
}

/// Walks a list endpoint page by page until the guard says stop.
///
/// `fetch` receives `(offset, limit)`. The offset advances by the echoed
/// limit, or by `page_size` when the endpoint echoes 0.
pub async fn fetch_all<T, F, Fut>(guard: PagingGuard, page_size: u64, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut offset = 0_u64;

    loop {
        let page = fetch(offset, page_size).await?;
        items.extend(page.items);

        let limit = if page.state.limit == 0 {
            page_size
        } else {
            page.state.limit
        };
        let state = PagingState {
            offset,
            limit,
            more: page.state.more,
        };
        if guard.should_stop(&state) {
            break;
        }
        offset += limit;
    }

    Ok(items)
}
