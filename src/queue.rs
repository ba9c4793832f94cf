use std::collections::VecDeque;

use crate::errors::Error;
use crate::request::Request;

/// FIFO holding area for requests deferred while a refresh is in flight.
///
/// Unbounded: `enqueue` never blocks and never drops. The queue has no lock of
/// its own; the refresh coordinator owns it inside the same critical section as
/// the refresh flag, which is what keeps a drain from racing an enqueue.
#[derive(Debug, Default)]
pub struct PendingQueue {
    requests: VecDeque<Request>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: Request) {
        self.requests.push_back(request);
    }

    /// Detaches the whole backlog in the order it was enqueued, leaving the queue empty.
    pub fn drain_all(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests).into()
    }

    /// Discards the backlog. Each discarded request resolves to [`Error::RefreshFailed`].
    pub fn clear(&mut self) -> usize {
        let discarded = self.drain_all();
        let count = discarded.len();
        for request in discarded {
            request.fail(Error::RefreshFailed);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, Url};

    use super::*;
    use crate::request::Completion;

    fn request(path: &str) -> (Request, Completion) {
        let url = Url::parse("https://api.example.com").unwrap().join(path).unwrap();
        Request::new(Method::GET, url)
    }

    #[test]
    fn drain_preserves_enqueue_order_and_empties() {
        let mut queue = PendingQueue::new();
        for path in ["/r1", "/r2", "/r3"] {
            queue.enqueue(request(path).0);
        }
        let drained: Vec<String> = queue
            .drain_all()
            .iter()
            .map(|r| r.url().path().to_string())
            .collect();
        assert_eq!(drained, ["/r1", "/r2", "/r3"]);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn clear_fails_every_discarded_request() {
        let mut queue = PendingQueue::new();
        let (first, first_done) = request("/a");
        let (second, second_done) = request("/b");
        queue.enqueue(first);
        queue.enqueue(second);

        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.len(), 0);
        assert!(matches!(first_done.wait().await, Err(Error::RefreshFailed)));
        assert!(matches!(second_done.wait().await, Err(Error::RefreshFailed)));
    }
}
