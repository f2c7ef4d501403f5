/// One client call, already attributed to a [`ClientId`](crate::ClientId) by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    ScheduleRelative { slot: u32, ns: u64 },
    ScheduleAbsolute { slot: u32, deadline_ns: u64 },
    SchedulePeriodic { slot: u32, period_ns: u64 },
    Stop { slot: u32 },
    PollCompleted,
    CurrentTime,
    CounterFrequency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerReply {
    Done,
    Completed(u32),
    Time(u64),
    Frequency(u64),
}
