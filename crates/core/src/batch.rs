//! Bounded concurrent execution of independent work items
//!
//! Every item runs to completion; one failure does not cancel the others.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Outcome of one work item, tagged with the item it came from
#[derive(Debug)]
pub struct ItemOutcome<I, T, E> {
    pub item: I,
    pub result: Result<T, E>,
}

/// Collected outcomes of a batch, in completion order
#[derive(Debug)]
pub struct BatchReport<I, T, E> {
    pub outcomes: Vec<ItemOutcome<I, T, E>>,
}

/// Run `work` for every item with at most `limit` items in flight
pub async fn run_bounded<I, T, E, F, Fut>(
    items: impl IntoIterator<Item = I>,
    limit: usize,
    work: F,
) -> BatchReport<I, T, E>
where
    I: Clone,
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let outcomes = stream::iter(items)
        .map(|item| {
            let fut = work(item.clone());
            async move {
                ItemOutcome {
                    item,
                    result: fut.await,
                }
            }
        })
        .buffer_unordered(limit.max(1))
        .collect::<Vec<_>>()
        .await;

    BatchReport { outcomes }
}
