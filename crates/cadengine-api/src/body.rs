//! Response body that owns a conversion's temp files.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use axum::body::Body;
use futures::Stream;
use pin_project_lite::pin_project;
use tokio_util::io::ReaderStream;

use cadengine_converter::TempScope;

type Release = Pin<Box<dyn Future<Output = ()> + Send>>;

pin_project! {
    /// Wraps a byte stream and releases a [`TempScope`] once the stream is
    /// exhausted. The end of the stream is reported only after the async
    /// release finished. If the body is dropped early (client disconnect),
    /// the scope is released by its own drop.
    pub struct ScopedStream<S> {
        #[pin]
        inner: S,
        scope: Option<TempScope>,
        releasing: Option<Release>,
    }
}

impl<S> ScopedStream<S> {
    /// Tie `scope` to the lifetime of `inner`.
    pub fn new(inner: S, scope: TempScope) -> Self {
        Self {
            inner,
            scope: Some(scope),
            releasing: None,
        }
    }
}

impl<S: Stream> Stream for ScopedStream<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        if this.releasing.is_none() {
            if let Some(item) = ready!(this.inner.poll_next(cx)) {
                return Poll::Ready(Some(item));
            }
            match this.scope.take() {
                Some(scope) => *this.releasing = Some(Box::pin(scope.release())),
                None => return Poll::Ready(None),
            }
        }

        if let Some(release) = this.releasing.as_mut() {
            ready!(release.as_mut().poll(cx));
            *this.releasing = None;
            tracing::debug!("Response body sent, temp files released");
        }
        Poll::Ready(None)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Stream `file` as a response body, releasing `scope` when done.
pub fn scoped_file_body(file: tokio::fs::File, scope: TempScope) -> Body {
    Body::from_stream(ScopedStream::new(ReaderStream::new(file), scope))
}
