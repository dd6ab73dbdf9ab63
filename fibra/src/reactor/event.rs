/// Direction of a file-descriptor wait.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Direction {
    Read,
    Write,
}

/// A readiness event reported by the poller.
///
/// Error and hang-up conditions are folded into readiness: the woken
/// routine retries its non-blocking call, which surfaces the real
/// error.
pub(crate) struct Event {
    /// Token identifying the fd entry inside the reactor's table.
    pub(crate) token: usize,

    pub(crate) readable: bool,
    pub(crate) writable: bool,
}
