//! Port allocation for worker processes.
//!
//! Not synchronized: only the coordinator task touches it.

/// Default first port handed out to a worker.
pub const PORT_START: u16 = 9000;

#[derive(Debug)]
pub struct PortAllocator {
    start: u16,
    next: Option<u16>,
}

impl PortAllocator {
    pub fn new(start: u16) -> Self {
        Self {
            start,
            next: Some(start),
        }
    }

    /// Hand out the next fresh port. `None` once the `u16` range is used up.
    pub fn allocate(&mut self) -> Option<u16> {
        let port = self.next?;
        self.next = port.checked_add(1);
        Some(port)
    }

    /// Hand back a port that a successfully terminated worker was bound to.
    pub fn reuse(&self, port: u16) -> u16 {
        port
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    /// The port the next `allocate` would return.
    pub fn peek(&self) -> Option<u16> {
        self.next
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(PORT_START)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_increasing_ports_from_start() {
        let mut ports = PortAllocator::default();
        assert_eq!(ports.allocate(), Some(9000));
        assert_eq!(ports.allocate(), Some(9001));
        assert_eq!(ports.allocate(), Some(9002));
        assert_eq!(ports.start(), 9000);
    }

    #[test]
    fn reuse_does_not_advance_counter() {
        let mut ports = PortAllocator::new(7000);
        let first = ports.allocate().unwrap();
        assert_eq!(ports.reuse(first), first);
        assert_eq!(ports.peek(), Some(7001));
        assert_eq!(ports.allocate(), Some(7001));
    }

    #[test]
    fn exhausts_at_top_of_range() {
        let mut ports = PortAllocator::new(u16::MAX - 1);
        assert_eq!(ports.allocate(), Some(u16::MAX - 1));
        assert_eq!(ports.allocate(), Some(u16::MAX));
        assert_eq!(ports.allocate(), None);
        assert_eq!(ports.allocate(), None);
    }
}
