use super::{PeerId, Request};

/// Outstanding requests in priority order, at most one per peer.
#[derive(Clone, Debug, Default)]
pub struct PendingQueue {
    requests: Vec<Request>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, request: Request) {
        assert!(
            !self.contains_peer(request.peer),
            "Expect at most one outstanding request per peer, but peer {} already queued {:?}",
            request.peer,
            self.requests
        );
        self.requests.push(request);
        self.requests.sort_unstable();
    }

    // No-op if absent
    pub fn remove_by_peer(&mut self, peer: PeerId) -> Option<Request> {
        let i = self.requests.iter().position(|r| r.peer == peer)?;
        Some(self.requests.remove(i))
    }

    pub fn clear(&mut self) {
        self.requests.clear()
    }

    pub fn head(&self) -> Option<&Request> {
        self.requests.first()
    }

    pub fn entries_excluding_first(&self) -> &[Request] {
        self.requests.get(1..).unwrap_or_default()
    }

    pub fn contains_peer(&self, peer: PeerId) -> bool {
        self.requests.iter().any(|r| r.peer == peer)
    }

    pub fn as_slice(&self) -> &[Request] {
        &self.requests
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
    use crate::order::{LamportClock, PendingQueue, Request};
    use rand::seq::SliceRandom;
    use rand::Rng;

    fn req(t: i32, peer: usize) -> Request {
        Request::new(LamportClock(t), peer)
    }

    #[test]
    fn sorted_after_every_insert() {
        let mut rng = rand::thread_rng();
        let mut peers: Vec<usize> = (0..64).collect();
        peers.shuffle(&mut rng);

        let mut q = PendingQueue::new();
        for (n, peer) in peers.into_iter().enumerate() {
            q.insert(req(rng.gen_range(0..8), peer));
            assert_eq!(q.len(), n + 1);
            let s = q.as_slice();
            assert!(s.iter().zip(&s[1..]).all(|(a, b)| a < b));
        }
    }

    #[test]
    fn tie_break_by_peer() {
        let mut q = PendingQueue::new();
        q.insert(req(5, 2));
        q.insert(req(5, 0));
        q.insert(req(5, 1));
        assert_eq!(q.as_slice(), &[req(5, 0), req(5, 1), req(5, 2)]);
        assert_eq!(q.head(), Some(&req(5, 0)));
        assert_eq!(q.entries_excluding_first(), &[req(5, 1), req(5, 2)]);
    }

    #[test]
    #[should_panic(expected = "at most one outstanding request per peer")]
    fn duplicate_peer_panics() {
        let mut q = PendingQueue::new();
        q.insert(req(1, 3));
        q.insert(req(9, 3));
    }

    #[test]
    fn remove_by_peer() {
        let mut q = PendingQueue::new();
        q.insert(req(2, 1));
        q.insert(req(1, 0));
        q.insert(req(3, 2));

        assert_eq!(q.remove_by_peer(1), Some(req(2, 1)));
        assert!(!q.contains_peer(1));
        assert_eq!(q.as_slice(), &[req(1, 0), req(3, 2)]);

        // absent peer is a no-op
        assert_eq!(q.remove_by_peer(1), None);
        assert_eq!(q.remove_by_peer(7), None);
        assert_eq!(q.len(), 2);

        // peer may queue again once removed
        q.insert(req(0, 1));
        assert_eq!(q.head(), Some(&req(0, 1)));
    }

    #[test]
    fn clear_and_empty_views() {
        let mut q = PendingQueue::new();
        assert!(q.entries_excluding_first().is_empty());
        assert_eq!(q.head(), None);
        q.insert(req(4, 0));
        assert!(q.entries_excluding_first().is_empty());
        q.insert(req(4, 1));
        q.clear();
        assert!(q.is_empty());
        assert!(q.entries_excluding_first().is_empty());
    }
}
