//! Cursor-driven pagination.
//!
//! [`pages`] turns a `fetch(cursor)` function into a lazy stream of page results; each call
//! to [`pages`] starts over from the first page. [`collect_pages`] drains it with the
//! partial-success policy: a failing first page fails the whole listing, a later failure keeps
//! every item already received and reports the error alongside them.

use std::collections::HashSet;
use std::future::Future;

use futures::stream::{self, Stream, StreamExt};

use crate::contract::Page;
use crate::error::ApiError;

/// Items of a listing plus the error that cut it short, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<T> {
    pub items: Vec<T>,
    pub interrupted: Option<ApiError>,
}

impl<T> Collected<T> {
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }
}

enum Cursor {
    Fetch(Option<String>),
    Fail(ApiError),
    Done,
}

/// Stream of page item batches in API order. Ends after the last page or the first error.
pub fn pages<T, F, Fut>(fetch: F) -> impl Stream<Item = Result<Vec<T>, ApiError>>
where
    F: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    stream::unfold(
        (Cursor::Fetch(None), HashSet::new(), fetch),
        |(cursor, mut seen, fetch)| async move {
            match cursor {
                Cursor::Done => None,
                Cursor::Fail(err) => Some((Err(err), (Cursor::Done, seen, fetch))),
                Cursor::Fetch(current) => match fetch(current).await {
                    Err(err) => Some((Err(err), (Cursor::Done, seen, fetch))),
                    Ok(page) => {
                        let next = match page.next_cursor {
                            None => Cursor::Done,
                            Some(c) if seen.insert(c.clone()) => Cursor::Fetch(Some(c)),
                            Some(c) => Cursor::Fail(ApiError::parse(format!(
                                "pagination cursor `{c}` repeated"
                            ))),
                        };
                        Some((Ok(page.items), (next, seen, fetch)))
                    }
                },
            }
        },
    )
}

pub async fn collect_pages<T, F, Fut>(fetch: F) -> Result<Collected<T>, ApiError>
where
    F: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    let stream = pages(fetch);
    futures::pin_mut!(stream);

    let mut items = Vec::new();
    let mut first = true;
    while let Some(batch) = stream.next().await {
        match batch {
            Ok(batch) => items.extend(batch),
            Err(err) if first => return Err(err),
            Err(err) => {
                return Ok(Collected {
                    items,
                    interrupted: Some(err),
                })
            }
        }
        first = false;
    }

    Ok(Collected {
        items,
        interrupted: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serves scripted pages keyed by call order and records the cursors it was given.
    struct Scripted {
        pages: Vec<Result<Page<u32>, ApiError>>,
        cursors: Mutex<Vec<Option<String>>>,
    }

    impl Scripted {
        fn new(pages: Vec<Result<Page<u32>, ApiError>>) -> Self {
            Self {
                pages,
                cursors: Mutex::new(Vec::new()),
            }
        }

        async fn fetch(&self, cursor: Option<String>) -> Result<Page<u32>, ApiError> {
            let mut seen = self.cursors.lock().unwrap();
            let idx = seen.len();
            seen.push(cursor);
            self.pages[idx].clone()
        }
    }

    fn page(items: &[u32], next: Option<&str>) -> Result<Page<u32>, ApiError> {
        Ok(Page {
            items: items.to_vec(),
            next_cursor: next.map(str::to_string),
        })
    }

    fn transient() -> ApiError {
        ApiError::Transient {
            attempts: 3,
            message: "503".into(),
        }
    }

    #[tokio::test]
    async fn follows_cursors_to_exhaustion() {
        let src = Scripted::new(vec![
            page(&[1, 2], Some("a")),
            page(&[3], Some("b")),
            page(&[4, 5], None),
        ]);
        let out = collect_pages(|c| src.fetch(c)).await.unwrap();
        assert_eq!(out.items, vec![1, 2, 3, 4, 5]);
        assert!(out.is_complete());
        assert_eq!(
            *src.cursors.lock().unwrap(),
            vec![None, Some("a".into()), Some("b".into())]
        );
    }

    #[tokio::test]
    async fn first_page_failure_fails_listing() {
        let src = Scripted::new(vec![Err(transient())]);
        let err = collect_pages(|c| src.fetch(c)).await.unwrap_err();
        assert_eq!(err, transient());
    }

    #[tokio::test]
    async fn later_failure_keeps_earlier_items() {
        let src = Scripted::new(vec![page(&[1, 2], Some("a")), Err(transient())]);
        let out = collect_pages(|c| src.fetch(c)).await.unwrap();
        assert_eq!(out.items, vec![1, 2]);
        assert_eq!(out.interrupted, Some(transient()));
    }

    #[tokio::test]
    async fn repeated_cursor_stops_instead_of_looping() {
        let src = Scripted::new(vec![page(&[1], Some("a")), page(&[2], Some("a"))]);
        let out = collect_pages(|c| src.fetch(c)).await.unwrap();
        assert_eq!(out.items, vec![1, 2]);
        assert!(matches!(out.interrupted, Some(ApiError::Parse { .. })));
        assert_eq!(src.cursors.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stream_is_lazy_and_restartable() {
        let src = Scripted::new(vec![
            page(&[1], Some("a")),
            page(&[2], None),
            page(&[1], Some("a")),
            page(&[2], None),
        ]);
        {
            let s = pages(|c| src.fetch(c));
            futures::pin_mut!(s);
            assert_eq!(s.next().await, Some(Ok(vec![1])));
        }
        assert_eq!(src.cursors.lock().unwrap().len(), 1);

        let again = collect_pages(|c| src.fetch(c)).await;
        // Restart begins from the first page (cursor None), not where the dropped stream stopped.
        assert_eq!(src.cursors.lock().unwrap()[1], None);
        assert!(again.is_ok());
    }
}
