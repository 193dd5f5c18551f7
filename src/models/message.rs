/// Wake-up messages for the scheduler thread. Queueing and task
/// completion push a nudge instead of the scheduler polling on a
/// timer.
#[derive(Debug)]
pub(crate) enum PoolMessage {
    TaskQueued,
    TaskFinished(u64),
    Stop,
}
