/// Work items for a committee's action loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionEvent {
    /// Fetch the next candidate and hand it to the transport
    Fetch,
    /// Re-announce the block pending at `height`
    Broadcast { height: u64 },
    /// Stop the loop
    Finish,
}
